#![forbid(unsafe_code)]

//! Stabilization engine and the history-editing operations built on it.
//!
//! [`evolve`] repairs troubled changesets one at a time: unstable ones are
//! relocated onto the living successor of their parent, bumped ones are
//! recreated on top of their public precursor, divergent ones are merged
//! with their rival. The other operations here create the markers that
//! cause those troubles in the first place: [`prune`], [`touch`],
//! [`fold`] and [`amend`].

mod amend;
mod bumped;
mod divergent;
mod engine;
mod fold;
mod navigate;
mod plan;
mod prune;
mod push;
mod touch;
mod unstable;
mod warnings;

use tracing::warn;

use crate::repo::Repo;
use crate::rewrite::PendingMerge;
use crate::storage::{EvolveKind, EvolveState};
use crate::types::EvolveError;

pub use amend::amend;
pub use divergent::divergent_data;
pub use engine::{
    apply, evolve, pick_next, plan_fix, EvolveMode, EvolveOptions, EvolveReport, ExitStatus,
};
pub use fold::fold;
pub use navigate::{next, previous, Navigation};
pub use plan::{EvolveReporter, FixPlan, FixRecord, NoopReporter};
pub use prune::{prune, PruneOptions, PruneReport};
pub use push::{PublishPush, Push, PushHint, PushReport, PUSH_HINT};
pub use touch::touch;
pub use warnings::{TroubleDelta, TroubleSummary};

/// Persists an interrupted relocation and returns the error to surface.
///
/// The working copy is parked on the destination so `evolve --continue`
/// can finish the commit once every path is resolved.
pub(crate) fn store_conflict(repo: &mut Repo, kind: EvolveKind, pending: PendingMerge) -> EvolveError {
    let source = pending.source;
    let destination = pending.destination;
    let paths: Vec<String> = pending.conflicts.keys().cloned().collect();
    let state = EvolveState {
        kind,
        source,
        destination,
        merged: pending.merged,
        unresolved: pending.conflicts,
        resolved: Vec::new(),
    };
    let stored = repo.transaction("evolve-interrupt", |repo| {
        repo.set_working_parents(&[destination])?;
        repo.set_evolve_state(Some(state));
        Ok(())
    });
    if let Err(err) = stored {
        return err;
    }
    warn!(source = %source, destination = %destination, conflicts = paths.len(), "evolve.interrupted");
    EvolveError::MergeConflict {
        node: source,
        paths,
        resumable: true,
    }
}
