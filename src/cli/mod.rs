#![forbid(unsafe_code)]

//! Output helpers shared by the `evolve` binary.
//!
//! Every command produces a serializable report; [`emit`] prints it as
//! pretty JSON or hands it to a text printer built on [`Ui`].

mod render;
mod ui;

use clap::ValueEnum;
use serde::Serialize;

use crate::types::{EvolveError, Result};

pub use render::{describe, log_entries, LogEntry};
pub use ui::{EvolveProgress, Theme, Ui};

/// Output format for structured responses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// Pretty-printed JSON.
    Json,
}

/// Prints `value` as JSON, or runs `printer` for text output.
pub fn emit<T, F>(format: OutputFormat, value: &T, printer: F) -> Result<()>
where
    T: Serialize,
    F: FnOnce(),
{
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)
                .map_err(|err| EvolveError::Serialization(err.to_string()))?;
            println!("{json}");
        }
        OutputFormat::Text => printer(),
    }
    Ok(())
}
