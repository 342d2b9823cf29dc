//! Binary entry point for the `evolve` history-stabilization CLI.
#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use evolve::admin::{stats, verify, StatsReport, VerifyReport, VerifySeverity};
use evolve::cli::{describe, emit, log_entries, EvolveProgress, OutputFormat, Theme, Ui};
use evolve::evolve::{
    amend, evolve as run_evolve, fold, next, previous, prune, touch, EvolveMode, EvolveOptions,
    EvolveReport, ExitStatus, Navigation, NoopReporter, PruneOptions,
    PublishPush, Push, PushHint, TroubleDelta, TroubleSummary,
};
use evolve::rewrite::CommitOptions;
use evolve::storage::{FileEntry, Resolution};
use evolve::{
    CommitRequest, MarkerFlags, NodeId, Phase, Repo, RepoOptions, Result, Timestamp, TroubleKind,
};

const ABORT_CODE: i32 = 255;

#[derive(Parser, Debug)]
#[command(
    name = "evolve",
    version,
    about = "Obsolescence markers and history stabilization",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        env = "EVOLVE_REPO",
        default_value = ".",
        help = "Repository root"
    )]
    repo: PathBuf,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for structured responses"
    )]
    format: OutputFormat,

    #[arg(long, global = true, help = "Disable colors and decorations")]
    plain: bool,

    #[arg(short, long, global = true, help = "Print only essential output")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a repository.
    Init {
        #[arg(value_name = "PATH", help = "Root of the new repository (defaults to --repo)")]
        path: Option<PathBuf>,
    },
    /// Commit file changes on top of the working copy.
    Commit(CommitCmd),
    /// Fold file changes into the working parent.
    Amend(AmendCmd),
    /// Show history, newest first.
    Log {
        #[arg(long, help = "Include extinct changesets")]
        hidden: bool,
    },
    /// Move the working copy.
    Update {
        #[arg(value_name = "REV")]
        rev: String,
    },
    /// Show or change phases.
    Phase(PhaseCmd),
    /// List, create or delete bookmarks.
    Bookmark(BookmarkCmd),
    /// Stabilize troubled changesets.
    Evolve(EvolveCmd),
    /// Mark changesets obsolete.
    Prune(PruneCmd),
    /// Recreate changesets with a new identity.
    Touch {
        #[arg(value_name = "REV", required = true)]
        revs: Vec<String>,
        #[arg(long, help = "Do not mark the originals obsolete")]
        duplicate: bool,
    },
    /// Combine a linear range of changesets into one.
    Fold {
        #[arg(value_name = "REV", required = true)]
        revs: Vec<String>,
    },
    /// Settle conflicts of an interrupted evolution.
    Resolve(ResolveCmd),
    /// Move the working copy to its parent.
    Previous,
    /// Move the working copy to its non-obsolete child.
    Next,
    /// Show the precursors of a changeset.
    Precursors {
        #[arg(value_name = "REV", default_value = ".")]
        rev: String,
        #[arg(long, help = "Follow markers transitively")]
        all: bool,
    },
    /// Show the successors of a changeset.
    Successors {
        #[arg(value_name = "REV", default_value = ".")]
        rev: String,
        #[arg(long, help = "Follow markers transitively", conflicts_with = "sets")]
        all: bool,
        #[arg(long, help = "Show the final successor sets")]
        sets: bool,
    },
    /// List troubled changesets.
    Troubles {
        #[arg(long, value_enum, help = "Only this kind of trouble")]
        kind: Option<TroubleArg>,
    },
    /// Summarize troubles and the working copy state.
    Summary,
    /// Check markers against the changeset graph.
    Verify,
    /// Show repository statistics.
    Stats,
    /// Publish changesets and their ancestors.
    Push {
        #[arg(value_name = "REV")]
        revs: Vec<String>,
        #[arg(short, long, help = "Push obsolete or troubled changesets anyway")]
        force: bool,
    },
}

#[derive(Args, Debug)]
struct FileArgs {
    #[arg(
        long = "write",
        value_name = "PATH=CONTENT",
        value_parser = parse_write,
        action = ArgAction::Append,
        help = "Write a file"
    )]
    writes: Vec<(String, String)>,

    #[arg(
        long = "remove",
        value_name = "PATH",
        action = ArgAction::Append,
        help = "Remove a file"
    )]
    removes: Vec<String>,
}

impl FileArgs {
    fn files(&self) -> BTreeMap<String, Option<FileEntry>> {
        let mut files = BTreeMap::new();
        for (path, content) in &self.writes {
            files.insert(path.clone(), Some(FileEntry::new(content.as_bytes())));
        }
        for path in &self.removes {
            files.insert(path.clone(), None);
        }
        files
    }
}

#[derive(Args, Debug)]
struct CommitCmd {
    #[arg(short, long, help = "Commit message")]
    message: String,

    #[arg(short, long, help = "Record this author")]
    user: Option<String>,

    #[arg(
        short,
        long,
        value_name = "DATE",
        help = "Record this date (\"<secs> <offset>\" or RFC 3339)"
    )]
    date: Option<String>,

    #[command(flatten)]
    files: FileArgs,

    #[arg(
        long,
        value_name = "REV",
        action = ArgAction::Append,
        help = "Mark REV as replaced by the new changeset"
    )]
    obsolete: Vec<String>,

    #[arg(long, help = "Commit in the secret phase")]
    secret: bool,
}

#[derive(Args, Debug)]
struct AmendCmd {
    #[arg(short, long, help = "New commit message")]
    message: Option<String>,

    #[arg(short, long, value_name = "FILE", help = "Read the new message from FILE")]
    logfile: Option<PathBuf>,

    #[arg(short, long, help = "Record this author")]
    user: Option<String>,

    #[arg(
        short,
        long,
        value_name = "DATE",
        help = "Record this date (\"<secs> <offset>\" or RFC 3339)"
    )]
    date: Option<String>,

    #[command(flatten)]
    files: FileArgs,
}

#[derive(Args, Debug)]
struct PhaseCmd {
    #[arg(value_name = "REV", default_value = ".")]
    revs: Vec<String>,

    #[arg(long, group = "target", help = "Move to the public phase")]
    public: bool,

    #[arg(long, group = "target", help = "Move to the draft phase")]
    draft: bool,

    #[arg(long, group = "target", help = "Move to the secret phase")]
    secret: bool,

    #[arg(short, long, help = "Allow moving back to a less public phase")]
    force: bool,
}

impl PhaseCmd {
    fn target(&self) -> Option<Phase> {
        if self.public {
            Some(Phase::Public)
        } else if self.draft {
            Some(Phase::Draft)
        } else if self.secret {
            Some(Phase::Secret)
        } else {
            None
        }
    }
}

#[derive(Args, Debug)]
struct BookmarkCmd {
    #[arg(value_name = "NAME")]
    name: Option<String>,

    #[arg(short, long, value_name = "REV", help = "Target changeset")]
    rev: Option<String>,

    #[arg(short, long, requires = "name", help = "Delete the bookmark")]
    delete: bool,
}

#[derive(Args, Debug)]
struct EvolveCmd {
    #[arg(long, conflicts_with = "all", help = "Fix troubles anywhere in the repository")]
    any: bool,

    #[arg(long, short = 'a', help = "Fix every troubled changeset")]
    all: bool,

    #[arg(short = 'n', long, help = "Show the next fix without applying it")]
    dry_run: bool,

    #[arg(long = "continue", help = "Finish an interrupted evolution")]
    continue_: bool,
}

#[derive(Args, Debug)]
struct PruneCmd {
    #[arg(value_name = "REV")]
    revs: Vec<String>,

    #[arg(
        short = 's',
        long = "succ",
        value_name = "REV",
        action = ArgAction::Append,
        help = "Successor changeset"
    )]
    successors: Vec<String>,

    #[arg(long, help = "Pair precursors and successors one to one")]
    biject: bool,

    #[arg(short = 'B', long, help = "Prune what only this bookmark reaches and delete it")]
    bookmark: Option<String>,
}

#[derive(Args, Debug)]
struct ResolveCmd {
    #[arg(value_name = "PATH", required_unless_present = "list")]
    path: Option<String>,

    #[arg(long, group = "pick", help = "Keep the destination's version")]
    local: bool,

    #[arg(long, group = "pick", help = "Keep the evolved changeset's version")]
    other: bool,

    #[arg(long = "delete", group = "pick", help = "Remove the path")]
    delete: bool,

    #[arg(long, group = "pick", value_name = "CONTENT", help = "Use this content")]
    content: Option<String>,

    #[arg(short, long, help = "List conflicted paths")]
    list: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum TroubleArg {
    Unstable,
    Bumped,
    Divergent,
}

impl From<TroubleArg> for TroubleKind {
    fn from(arg: TroubleArg) -> Self {
        match arg {
            TroubleArg::Unstable => TroubleKind::Unstable,
            TroubleArg::Bumped => TroubleKind::Bumped,
            TroubleArg::Divergent => TroubleKind::Divergent,
        }
    }
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let theme = if cli.plain { Theme::Plain } else { Theme::Auto };
    let ui = Ui::new(theme, cli.quiet);
    let code = match run(&cli, &ui) {
        Ok(code) => code,
        Err(err) => {
            ui.error(&err.to_string(), err.hint().as_deref());
            ABORT_CODE
        }
    };
    process::exit(code);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("EVOLVE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn run(cli: &Cli, ui: &Ui) -> Result<i32> {
    let format = cli.format;
    if let Command::Init { path } = &cli.command {
        let root = path.clone().unwrap_or_else(|| cli.repo.clone());
        Repo::init(&root, RepoOptions::load(None)?)?;
        let report = InitReport {
            root: root.display().to_string(),
        };
        emit(format, &report, || {
            ui.success(&format!("initialized empty repository in {}", report.root))
        })?;
        return Ok(0);
    }

    let mut repo = Repo::open(&cli.repo)?;
    match &cli.command {
        Command::Init { .. } => Ok(0),
        Command::Commit(cmd) => {
            let mut request = CommitRequest::new(cmd.message.clone());
            request.files = cmd.files.files();
            request.user = cmd.user.clone();
            request.date = cmd.date.as_deref().map(Timestamp::parse).transpose()?;
            if cmd.secret {
                request.phase = Some(Phase::Secret);
            }
            request.obsoletes = repo.resolve_revs(&cmd.obsolete)?;
            let node = with_warnings(&mut repo, ui, |repo| repo.commit(request))?;
            emit_node(format, ui, &repo, "committed", node)?;
            Ok(0)
        }
        Command::Amend(cmd) => {
            let opts = CommitOptions {
                message: cmd.message.clone(),
                logfile: cmd.logfile.clone(),
                user: cmd.user.clone(),
                date: cmd.date.as_deref().map(Timestamp::parse).transpose()?,
                ..CommitOptions::default()
            };
            let files = cmd.files.files();
            let node = with_warnings(&mut repo, ui, |repo| amend(repo, files, &opts))?;
            emit_node(format, ui, &repo, "amended as", node)?;
            Ok(0)
        }
        Command::Log { hidden } => {
            let entries = log_entries(&repo, *hidden)?;
            emit(format, &entries, || {
                for entry in &entries {
                    let mut line = entry.label();
                    for kind in &entry.troubles {
                        line.push_str(&format!(" {}", ui.trouble(*kind)));
                    }
                    ui.line(&line);
                    ui.line(&format!("    {}", entry.summary));
                }
            })?;
            Ok(0)
        }
        Command::Update { rev } => {
            let node = repo.resolve_rev(rev)?;
            let bookmark = (repo.bookmarks().get(rev) == Some(node)).then_some(rev.as_str());
            repo.transaction("update", |repo| repo.update(node, bookmark))?;
            emit_node(format, ui, &repo, "working copy now at", node)?;
            Ok(0)
        }
        Command::Phase(cmd) => run_phase(&mut repo, cmd, format, ui),
        Command::Bookmark(cmd) => run_bookmark(&mut repo, cmd, format, ui),
        Command::Evolve(cmd) => run_evolve_cmd(&mut repo, cmd, cli, ui),
        Command::Prune(cmd) => {
            let nodes = repo.resolve_revs(&cmd.revs)?;
            let opts = PruneOptions {
                successors: repo.resolve_revs(&cmd.successors)?,
                bijective: cmd.biject,
                bookmark: cmd.bookmark.clone(),
            };
            let report = with_warnings(&mut repo, ui, |repo| prune(repo, &nodes, &opts))?;
            emit(format, &report, || {
                ui.success(&format!("{} changesets pruned", report.count()));
                if let Some(mark) = &report.deleted_bookmark {
                    ui.line(&format!("bookmark '{mark}' deleted"));
                }
                if let Some(node) = report.moved_to {
                    ui.line(&format!("working copy now at {}", describe(&repo, node)));
                }
            })?;
            Ok(0)
        }
        Command::Touch { revs, duplicate } => {
            let nodes = repo.resolve_revs(revs)?;
            let created = with_warnings(&mut repo, ui, |repo| touch(repo, &nodes, *duplicate))?;
            emit(format, &created, || {
                for node in &created {
                    ui.line(&format!("touched as {}", describe(&repo, *node)));
                }
            })?;
            Ok(0)
        }
        Command::Fold { revs } => {
            let nodes = repo.resolve_revs(revs)?;
            let node = with_warnings(&mut repo, ui, |repo| fold(repo, &nodes))?;
            emit_node(format, ui, &repo, &format!("{} changesets folded into", nodes.len()), node)?;
            Ok(0)
        }
        Command::Resolve(cmd) => run_resolve(&mut repo, cmd, format, ui),
        Command::Previous => {
            let nav = previous(&mut repo)?;
            emit_navigation(format, ui, &repo, &nav)
        }
        Command::Next => {
            let nav = next(&mut repo)?;
            emit_navigation(format, ui, &repo, &nav)
        }
        Command::Precursors { rev, all } => {
            let node = repo.resolve_rev(rev)?;
            let nodes = if *all {
                repo.graph()
                    .sort_by_rev(repo.traversal().transitive_precursors([node]))
            } else {
                repo.precursors(&[node])
            };
            emit_nodes(format, ui, &repo, &nodes)?;
            Ok(0)
        }
        Command::Successors { rev, all, sets } => {
            let node = repo.resolve_rev(rev)?;
            if *sets {
                let sets = repo.successor_sets(node);
                emit(format, &sets, || {
                    for set in &sets {
                        let members: Vec<String> = set.iter().map(NodeId::short).collect();
                        ui.line(&members.join(" "));
                    }
                })?;
                return Ok(0);
            }
            let nodes = if *all {
                repo.graph().sort_by_rev(
                    repo.traversal()
                        .transitive_successors([node], MarkerFlags::NONE),
                )
            } else {
                repo.successors(&[node])
            };
            emit_nodes(format, ui, &repo, &nodes)?;
            Ok(0)
        }
        Command::Troubles { kind } => {
            let troubles = repo.troubles();
            let wanted = kind.map(TroubleKind::from);
            let entries: Vec<TroubledEntry> = repo
                .troubled()
                .into_iter()
                .map(|node| TroubledEntry {
                    node,
                    kinds: troubles.classify(node).into_iter().collect(),
                })
                .filter(|entry| wanted.map_or(true, |k| entry.kinds.contains(&k)))
                .collect();
            emit(format, &entries, || {
                for entry in &entries {
                    let kinds: Vec<String> = entry.kinds.iter().map(|k| ui.trouble(*k)).collect();
                    ui.line(&format!("{} {}", describe(&repo, entry.node), kinds.join(", ")));
                }
            })?;
            Ok(0)
        }
        Command::Summary => {
            let summary = TroubleSummary::measure(&repo);
            let report = SummaryReport {
                working: repo.working_parents().to_vec(),
                obsolete_parent: repo.working_parent().is_some_and(|wdp| repo.is_obsolete(wdp)),
                interrupted: repo.evolve_state().map(|state| state.source),
                troubles: summary,
            };
            emit(format, &report, || {
                for node in &report.working {
                    ui.line(&format!("parent: {}", describe(&repo, *node)));
                }
                if report.obsolete_parent {
                    ui.warn("working copy parent is obsolete");
                }
                if let Some(node) = report.interrupted {
                    ui.warn(&format!("evolution of {node} is interrupted"));
                }
                let lines = report.troubles.lines();
                if lines.is_empty() {
                    ui.line("troubles: none");
                }
                for line in lines {
                    ui.line(&line);
                }
            })?;
            Ok(0)
        }
        Command::Verify => {
            let report = verify(&repo);
            emit(format, &report, || print_verify_text(ui, &report))?;
            Ok(if report.success { 0 } else { 2 })
        }
        Command::Stats => {
            let report = stats(&repo);
            emit(format, &report, || print_stats_text(ui, &report))?;
            Ok(0)
        }
        Command::Push { revs, force } => {
            let heads = if revs.is_empty() {
                repo.resolve_revs(&["."])?
            } else {
                repo.resolve_revs(revs)?
            };
            let pusher = PushHint::new(PublishPush);
            let report = pusher.push(&mut repo, &heads, *force)?;
            emit(format, &report, || {
                ui.success(&format!("{} changesets published", report.published))
            })?;
            Ok(0)
        }
    }
}

fn run_phase(repo: &mut Repo, cmd: &PhaseCmd, format: OutputFormat, ui: &Ui) -> Result<i32> {
    let nodes = repo.resolve_revs(&cmd.revs)?;
    let Some(target) = cmd.target() else {
        let mut phases = Vec::with_capacity(nodes.len());
        for node in &nodes {
            phases.push(PhaseEntry {
                node: *node,
                phase: repo.phase(*node)?,
            });
        }
        emit(format, &phases, || {
            for entry in &phases {
                ui.line(&format!("{}: {}", describe(repo, entry.node), entry.phase));
            }
        })?;
        return Ok(0);
    };
    let mut refused = 0usize;
    for node in &nodes {
        if repo.phase(*node)? < target && !cmd.force {
            refused += 1;
        }
    }
    let changed = repo.transaction("phase", |repo| {
        let mut changed = repo.advance_boundary(target, &nodes);
        if cmd.force {
            changed += repo.retract_boundary(target, &nodes);
        }
        Ok(changed)
    })?;
    let report = PhaseReport { changed, refused };
    emit(format, &report, || {
        if changed > 0 {
            ui.success(&format!("phase changed for {changed} changesets"));
        } else {
            ui.line("no phases changed");
        }
        if refused > 0 {
            ui.warn(&format!(
                "cannot move {refused} changesets to a higher phase, use --force"
            ));
        }
    })?;
    Ok(if refused > 0 { 1 } else { 0 })
}

fn run_bookmark(repo: &mut Repo, cmd: &BookmarkCmd, format: OutputFormat, ui: &Ui) -> Result<i32> {
    let Some(name) = cmd.name.as_deref() else {
        let active = repo.bookmarks().active().map(str::to_string);
        let marks: Vec<BookmarkEntry> = repo
            .bookmarks()
            .iter()
            .map(|(name, node)| BookmarkEntry {
                name: name.to_string(),
                node,
                active: active.as_deref() == Some(name),
            })
            .collect();
        emit(format, &marks, || {
            if marks.is_empty() {
                ui.line("no bookmarks set");
            }
            for mark in &marks {
                let star = if mark.active { "*" } else { " " };
                ui.line(&format!(" {star} {:<20} {}", mark.name, describe(repo, mark.node)));
            }
        })?;
        return Ok(0);
    };
    if cmd.delete {
        let node = repo.transaction("bookmark", |repo| repo.delete_bookmark(name))?;
        emit_node(format, ui, repo, &format!("deleted bookmark '{name}' from"), node)?;
        return Ok(0);
    }
    let node = match cmd.rev.as_deref() {
        Some(rev) => repo.resolve_rev(rev)?,
        None => repo.resolve_rev(".")?,
    };
    let activate = cmd.rev.is_none();
    repo.transaction("bookmark", |repo| {
        repo.set_bookmark(name, node)?;
        if activate {
            repo.activate_bookmark(Some(name));
        }
        Ok(())
    })?;
    emit_node(format, ui, repo, &format!("bookmark '{name}' set on"), node)?;
    Ok(0)
}

fn run_evolve_cmd(repo: &mut Repo, cmd: &EvolveCmd, cli: &Cli, ui: &Ui) -> Result<i32> {
    let mode = if cmd.all {
        EvolveMode::All
    } else if cmd.any {
        EvolveMode::Any
    } else {
        EvolveMode::Nearest
    };
    let opts = EvolveOptions {
        mode,
        dry_run: cmd.dry_run,
        continue_: cmd.continue_,
    };
    let quiet = cli.quiet || cli.format == OutputFormat::Json || cmd.dry_run;
    let report = if mode == EvolveMode::All {
        let mut progress = EvolveProgress::new(repo.troubled().len(), quiet);
        let report = with_warnings(repo, ui, |repo| run_evolve(repo, &opts, &mut progress));
        progress.finish();
        report?
    } else {
        with_warnings(repo, ui, |repo| run_evolve(repo, &opts, &mut NoopReporter))?
    };
    emit(cli.format, &report, || print_evolve_text(ui, repo, &report))?;
    Ok(report.status.code())
}

fn run_resolve(repo: &mut Repo, cmd: &ResolveCmd, format: OutputFormat, ui: &Ui) -> Result<i32> {
    if cmd.list {
        let paths: Vec<ResolveEntry> = match repo.evolve_state() {
            Some(state) => state
                .unresolved
                .keys()
                .map(|path| ResolveEntry {
                    path: path.clone(),
                    resolved: false,
                })
                .chain(state.resolved.iter().map(|path| ResolveEntry {
                    path: path.clone(),
                    resolved: true,
                }))
                .collect(),
            None => Vec::new(),
        };
        emit(format, &paths, || {
            for entry in &paths {
                let flag = if entry.resolved { "R" } else { "U" };
                ui.line(&format!("{flag} {}", entry.path));
            }
        })?;
        return Ok(0);
    }
    let Some(path) = cmd.path.as_deref() else {
        return Ok(0);
    };
    let resolution = if cmd.local {
        Resolution::Local
    } else if cmd.other {
        Resolution::Other
    } else if cmd.delete {
        Resolution::Remove
    } else if let Some(content) = &cmd.content {
        Resolution::Content(FileEntry::new(content.as_bytes()))
    } else {
        Resolution::Other
    };
    repo.resolve_path(path, resolution)?;
    let remaining = repo.evolve_state().map_or(0, |state| state.unresolved.len());
    let report = ResolveReport {
        path: path.to_string(),
        remaining,
    };
    emit(format, &report, || {
        ui.success(&format!("marked {path} as resolved"));
        if remaining == 0 {
            ui.line("no more unresolved files; continue with 'evolve evolve --continue'");
        }
    })?;
    Ok(0)
}

/// Runs a mutating command and reports troubles it introduced.
fn with_warnings<T>(
    repo: &mut Repo,
    ui: &Ui,
    f: impl FnOnce(&mut Repo) -> Result<T>,
) -> Result<T> {
    if !repo.options().warn_new_troubles {
        return f(repo);
    }
    let before = TroubleSummary::measure(repo);
    let out = f(repo)?;
    let delta = TroubleDelta::measure(before, TroubleSummary::measure(repo));
    for warning in delta.warnings() {
        ui.warn(&warning);
    }
    Ok(out)
}

fn parse_write(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((path, content)) if !path.is_empty() => Ok((path.to_string(), content.to_string())),
        _ => Err(format!("expected PATH=CONTENT, got '{raw}'")),
    }
}

fn emit_node(format: OutputFormat, ui: &Ui, repo: &Repo, action: &str, node: NodeId) -> Result<()> {
    let report = NodeReport { node };
    emit(format, &report, || {
        ui.success(&format!("{action} {}", describe(repo, node)))
    })
}

fn emit_nodes(format: OutputFormat, ui: &Ui, repo: &Repo, nodes: &[NodeId]) -> Result<()> {
    emit(format, &nodes, || {
        for node in nodes {
            ui.line(&describe(repo, *node));
        }
    })
}

fn emit_navigation(format: OutputFormat, ui: &Ui, repo: &Repo, nav: &Navigation) -> Result<i32> {
    emit(format, nav, || match nav.status {
        ExitStatus::Ok => {
            if let Some(node) = nav.moved_to {
                ui.line(&describe(repo, node));
            }
        }
        ExitStatus::NothingToDo => ui.warn("no changeset to move to"),
        ExitStatus::NeedsUserChoice => {
            ui.warn("ambiguous move, explicitly update to one of:");
            ui.list(
                "candidates",
                nav.candidates.iter().map(|node| describe(repo, *node)),
            );
        }
    })?;
    Ok(nav.status.code())
}

fn print_evolve_text(ui: &Ui, repo: &Repo, report: &EvolveReport) {
    for plan in &report.plans {
        ui.line(&format!("would {plan}"));
    }
    for fix in &report.fixes {
        match fix.result {
            Some(new) => ui.success(&format!(
                "{} {} -> {}",
                ui.trouble(fix.kind),
                fix.node.short(),
                describe(repo, new)
            )),
            None => ui.success(&format!(
                "{} {} absorbed",
                ui.trouble(fix.kind),
                fix.node.short()
            )),
        }
    }
    if let Some(node) = report.updated_to {
        ui.line(&format!("working copy now at {}", describe(repo, node)));
    }
    if let Some(message) = &report.message {
        match report.status {
            ExitStatus::NeedsUserChoice => ui.warn(message),
            _ => ui.line(message),
        }
    }
    if !report.candidates.is_empty() {
        ui.list(
            "candidates",
            report.candidates.iter().map(|node| describe(repo, *node)),
        );
    }
}

fn print_verify_text(ui: &Ui, report: &VerifyReport) {
    ui.section(
        "Markers",
        [
            ("total", report.counts.markers),
            ("unknown precursors", report.counts.unknown_precursors),
            ("unknown successors", report.counts.unknown_successors),
            ("repaired", report.counts.repaired),
            ("obsolete public", report.counts.obsolete_public),
            ("cycle members", report.counts.cycle_members),
        ],
    );
    for finding in &report.findings {
        match finding.severity {
            VerifySeverity::Info => ui.line(&format!("  info: {}", finding.message)),
            VerifySeverity::Warning | VerifySeverity::Error => ui.warn(&finding.message),
        }
    }
    if report.success {
        ui.success("verify ok");
    } else {
        ui.warn("verify found problems");
    }
}

fn print_stats_text(ui: &Ui, report: &StatsReport) {
    let cs = &report.changesets;
    ui.section(
        "Changesets",
        [
            ("total", cs.total),
            ("public", cs.public),
            ("draft", cs.draft),
            ("secret", cs.secret),
            ("heads", cs.heads),
            ("bookmarks", cs.bookmarks),
        ],
    );
    let markers = &report.markers;
    ui.section(
        "Markers",
        [
            ("total", markers.total),
            ("prunes", markers.prunes),
            ("splits", markers.splits),
            ("bumped fixes", markers.bumped_fixes),
            ("repaired", markers.repaired),
        ],
    );
    let troubles = &report.troubles;
    ui.section(
        "Troubles",
        [
            ("obsolete", troubles.obsolete),
            ("suspended", troubles.suspended),
            ("extinct", troubles.extinct),
            ("unstable", troubles.unstable),
            ("bumped", troubles.bumped),
            ("divergent", troubles.divergent),
        ],
    );
    if let Some(fs) = &report.filesystem {
        ui.section(
            "Filesystem",
            [
                ("path", fs.repo_path.clone()),
                ("obsstore bytes", fs.obsstore_size_bytes.to_string()),
                ("changesets bytes", fs.changesets_size_bytes.to_string()),
            ],
        );
    }
}

#[derive(Serialize)]
struct InitReport {
    root: String,
}

#[derive(Serialize)]
struct NodeReport {
    node: NodeId,
}

#[derive(Serialize)]
struct PhaseEntry {
    node: NodeId,
    phase: Phase,
}

#[derive(Serialize)]
struct PhaseReport {
    changed: usize,
    refused: usize,
}

#[derive(Serialize)]
struct BookmarkEntry {
    name: String,
    node: NodeId,
    active: bool,
}

#[derive(Serialize)]
struct TroubledEntry {
    node: NodeId,
    kinds: Vec<TroubleKind>,
}

#[derive(Serialize)]
struct SummaryReport {
    working: Vec<NodeId>,
    obsolete_parent: bool,
    interrupted: Option<NodeId>,
    troubles: TroubleSummary,
}

#[derive(Serialize)]
struct ResolveEntry {
    path: String,
    resolved: bool,
}

#[derive(Serialize)]
struct ResolveReport {
    path: String,
    remaining: usize,
}
