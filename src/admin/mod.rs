#![forbid(unsafe_code)]

//! Repository administration utilities.
//!
//! Read-only reports over the marker store and the changeset graph, used
//! by the `verify` and `stats` commands.

mod stats;
mod verify;

/// Statistics collection and reporting.
///
/// Counts changesets per phase, markers per kind and troubled changesets.
pub use stats::{
    stats, ChangesetStatsSection, FilesystemStats, MarkerStatsSection, StatsReport,
    TroubleStatsSection,
};

/// Marker store integrity verification.
///
/// Cross-checks markers against the changeset graph and reports anything
/// suspicious.
pub use verify::{verify, VerifyCounts, VerifyFinding, VerifyReport, VerifySeverity};
