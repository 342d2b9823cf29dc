use std::fmt::Display;
use std::io::IsTerminal;

use indicatif::{ProgressBar, ProgressStyle};
use nu_ansi_term::{Color, Style};

use crate::evolve::{EvolveReporter, FixPlan, FixRecord};
use crate::obsolete::TroubleKind;

/// Color scheme for text output.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Theme {
    /// Colors when stdout is a terminal.
    Auto,
    /// Never color.
    Plain,
}

/// Terminal printer shared by the commands.
pub struct Ui {
    palette: Palette,
    quiet: bool,
}

impl Ui {
    /// Printer for `theme`; `quiet` drops decorations.
    pub fn new(theme: Theme, quiet: bool) -> Self {
        let paint = match theme {
            Theme::Plain => false,
            Theme::Auto => std::io::stdout().is_terminal(),
        } && !quiet;
        let palette = if paint {
            Palette::dark()
        } else {
            Palette::plain()
        };
        Self { palette, quiet }
    }

    /// Titled block of aligned `key: value` rows.
    pub fn section<'a, I, V>(&self, title: &str, rows: I)
    where
        I: IntoIterator<Item = (&'a str, V)>,
        V: Display,
    {
        let rows: Vec<(String, String)> = rows
            .into_iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        if rows.is_empty() {
            return;
        }
        self.heading(title);
        let key_width = rows.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
        for (key, value) in rows {
            println!(
                "  {} {}",
                self.palette.key.paint(format!("{key:>key_width$}:")),
                self.palette.value.paint(value)
            );
        }
    }

    /// Titled bullet list; nothing is printed for an empty list.
    pub fn list<I>(&self, title: &str, entries: I)
    where
        I: IntoIterator<Item = String>,
    {
        let entries: Vec<String> = entries.into_iter().collect();
        if entries.is_empty() {
            return;
        }
        self.heading(title);
        for entry in entries {
            println!("  {} {entry}", self.palette.bullet.paint("-"));
        }
    }

    /// Plain line on stdout.
    pub fn line(&self, message: &str) {
        println!("{message}");
    }

    /// Success line on stdout.
    pub fn success(&self, message: &str) {
        if self.quiet {
            println!("{message}");
        } else {
            println!("{} {message}", self.palette.success.paint(SUCCESS_ICON));
        }
    }

    /// Warning line on stderr.
    pub fn warn(&self, message: &str) {
        if self.quiet {
            eprintln!("{message}");
        } else {
            eprintln!("{} {message}", self.palette.warn.paint(WARNING_ICON));
        }
    }

    /// Error line on stderr, followed by the hint when there is one.
    pub fn error(&self, message: &str, hint: Option<&str>) {
        eprintln!("{} {message}", self.palette.error.paint("abort:"));
        if let Some(hint) = hint {
            eprintln!("{} {hint}", self.palette.info.paint("(hint)"));
        }
    }

    /// Colors a trouble keyword.
    pub fn trouble(&self, kind: TroubleKind) -> String {
        let style = match kind {
            TroubleKind::Unstable => self.palette.warn,
            TroubleKind::Bumped => self.palette.error,
            TroubleKind::Divergent => self.palette.heading,
        };
        style.paint(kind.as_str()).to_string()
    }

    fn heading(&self, title: &str) {
        if self.quiet {
            println!("{title}");
        } else {
            println!("{}", self.palette.heading.paint(format!("{HEADING_ICON} {title}")));
        }
    }
}

/// Progress bar over an `evolve --all` run.
pub struct EvolveProgress {
    bar: Option<ProgressBar>,
    total: u64,
}

impl EvolveProgress {
    /// Bar sized for `total` troubled changesets; hidden when `quiet`.
    pub fn new(total: usize, quiet: bool) -> Self {
        let total = total as u64;
        let bar = (!quiet && total > 0).then(|| {
            let bar = ProgressBar::new(total);
            let style = ProgressStyle::with_template("{prefix} [{bar:30}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> ");
            bar.set_style(style);
            bar.set_prefix("evolving");
            bar
        });
        Self { bar, total }
    }

    /// Clears the bar.
    pub fn finish(self) {
        if let Some(bar) = self.bar {
            bar.finish_and_clear();
        }
    }
}

impl EvolveReporter for EvolveProgress {
    fn planned(&mut self, plan: &FixPlan) {
        if let Some(bar) = &self.bar {
            bar.set_message(plan.to_string());
        }
    }

    fn fixed(&mut self, record: &FixRecord) {
        if let Some(bar) = &self.bar {
            bar.println(format!("{} {}", record.kind, record.node));
        }
    }

    fn progress(&mut self, done: usize, remaining: usize) {
        if let Some(bar) = &self.bar {
            let len = (done + remaining) as u64;
            if len > self.total {
                self.total = len;
                bar.set_length(len);
            }
            bar.set_position(done as u64);
        }
    }
}

struct Palette {
    heading: Style,
    key: Style,
    value: Style,
    bullet: Style,
    info: Style,
    success: Style,
    warn: Style,
    error: Style,
}

impl Palette {
    fn dark() -> Self {
        Self {
            heading: Style::new().fg(Color::Purple).bold(),
            key: Style::new().fg(Color::LightBlue).bold(),
            value: Style::new().fg(Color::White),
            bullet: Style::new().fg(Color::LightBlue),
            info: Style::new().fg(Color::LightCyan),
            success: Style::new().fg(Color::LightGreen).bold(),
            warn: Style::new().fg(Color::Yellow).bold(),
            error: Style::new().fg(Color::Red).bold(),
        }
    }

    fn plain() -> Self {
        Self {
            heading: Style::new(),
            key: Style::new(),
            value: Style::new(),
            bullet: Style::new(),
            info: Style::new(),
            success: Style::new(),
            warn: Style::new(),
            error: Style::new(),
        }
    }
}

const HEADING_ICON: &str = "▸";
const SUCCESS_ICON: &str = "✔";
const WARNING_ICON: &str = "⚠";
