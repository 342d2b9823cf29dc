use std::io;

use thiserror::Error;

use super::NodeId;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EvolveError>;

fn join_nodes(nodes: &[NodeId]) -> String {
    nodes
        .iter()
        .map(NodeId::short)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Every way an obsolescence or stabilization operation can abort.
#[derive(Debug, Error)]
pub enum EvolveError {
    /// Attempt to rewrite, prune or obsolete a public changeset.
    #[error("cannot {action} immutable changeset {node}")]
    ImmutableChangeset {
        /// The public changeset.
        node: NodeId,
        /// What was attempted ("rewrite", "prune", ...).
        action: &'static str,
    },
    /// The rewrite primitive was given a merge changeset.
    #[error("cannot rewrite merge changeset {0}")]
    UnsupportedMergeRewrite(NodeId),
    /// Relocation was asked to move a merge changeset.
    #[error("no support for evolution of merge changeset {0} yet")]
    UnsupportedMergeRelocation(NodeId),
    /// A divergent changeset whose rival got split into several changesets.
    #[error("divergence of {divergent} with a split changeset is not handled")]
    UnsupportedSplitDivergence {
        /// The changeset being stabilized.
        divergent: NodeId,
        /// The members of the split rival successor set.
        others: Vec<NodeId>,
    },
    /// Successor resolution of an obsolete parent yielded several candidates.
    #[error("cannot choose a destination for {node} among [{}]", join_nodes(.candidates))]
    AmbiguousDestination {
        /// The unstable changeset.
        node: NodeId,
        /// Every candidate destination.
        candidates: Vec<NodeId>,
    },
    /// Walking up from a dead parent exhausted history.
    #[error("no living ancestor to stabilize {0} on")]
    NoLivingAncestor(NodeId),
    /// A three-way merge left unresolved paths.
    #[error("unresolved merge conflicts while evolving {node} ({} paths)", .paths.len())]
    MergeConflict {
        /// Changeset whose content was being merged.
        node: NodeId,
        /// Paths left unresolved.
        paths: Vec<String>,
        /// Whether an evolve state was written so `continue` can finish the job.
        resumable: bool,
    },
    /// The two sides of a divergence do not share a parent.
    #[error("parents of divergent {divergent} and {other} are not common")]
    UnrelatedDivergence {
        /// The changeset being stabilized.
        divergent: NodeId,
        /// Its rival successor.
        other: NodeId,
    },
    /// Divergence resolution requested from the public side.
    #[error("cannot resolve divergence from the public side ({divergent})")]
    ImmutableConflict {
        /// The public divergent changeset.
        divergent: NodeId,
        /// Its rival successor.
        other: NodeId,
    },
    /// Mutually exclusive options were combined.
    #[error("options {0} are mutually exclusive")]
    ConflictingOptions(&'static str),
    /// Relocating a changeset onto itself.
    #[error("tried to relocate {0} on top of itself")]
    SelfRelocation(NodeId),
    /// A bumped changeset without a public precursor.
    #[error("no public precursor found for bumped changeset {0}")]
    BumpedPrecursorNotFound(NodeId),
    /// A divergent changeset whose common precursor could not be found.
    #[error("base of divergent changeset {0} not found")]
    DivergentBaseNotFound(NodeId),
    /// `prune` called without anything to prune.
    #[error("nothing to prune")]
    NothingToPrune,
    /// Bijective prune with mismatched lists.
    #[error("cannot use {successors} successors for {precursors} precursors")]
    PruneArity {
        /// Number of precursors given.
        precursors: usize,
        /// Number of successors given.
        successors: usize,
    },
    /// Several successors fanned out to several precursors.
    #[error("cannot use multiple successors for multiple precursors")]
    PruneFanOut,
    /// `evolve --continue` without an interrupted evolution.
    #[error("no interrupted evolution to continue")]
    NoEvolveInProgress,
    /// Push refused because outgoing changesets are obsolete or troubled.
    #[error("push includes {reason} changeset {node}")]
    PushRejected {
        /// First offending changeset.
        node: NodeId,
        /// "obsolete", "unstable", "bumped" or "divergent".
        reason: &'static str,
        /// Recovery hint attached by a push decorator.
        hint: Option<String>,
    },
    /// Markers requested on a store built without obsolescence support.
    #[error("obsolescence markers are disabled for this repository")]
    ObsolescenceDisabled,
    /// A node id that is not part of the changeset graph.
    #[error("unknown changeset {0}")]
    UnknownNode(NodeId),
    /// A revision expression that resolved to nothing.
    #[error("unknown revision '{0}'")]
    UnknownRevision(String),
    /// Invalid input to an operation.
    #[error("{0}")]
    InvalidArgument(String),
    /// Scoped lock acquisition failed.
    #[error("lock error: {0}")]
    Lock(String),
    /// Malformed persisted data.
    #[error("corruption detected: {0}")]
    Corruption(String),
    /// Failed to (de)serialize persisted state.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl EvolveError {
    /// Suggested manual recovery, when one exists.
    pub fn hint(&self) -> Option<String> {
        match self {
            EvolveError::ImmutableChangeset { .. } => {
                Some("see 'evolve phase --help' for details on phases".into())
            }
            EvolveError::UnsupportedMergeRelocation(_) | EvolveError::UnsupportedMergeRewrite(_) => {
                Some("redo the merge and use 'evolve prune' to obsolete the old one".into())
            }
            EvolveError::UnsupportedSplitDivergence { divergent, others } => Some(format!(
                "{divergent} is divergent with a changeset that got split into [{}]; \
                 fall back to manual handling with 'evolve touch --duplicate' and 'evolve prune'",
                join_nodes(others)
            )),
            EvolveError::AmbiguousDestination { node, .. } => Some(format!(
                "relocate {node} explicitly onto the successor you want"
            )),
            EvolveError::NoLivingAncestor(node) => Some(format!(
                "prune {node} or relocate it manually"
            )),
            EvolveError::MergeConflict {
                resumable: true, ..
            } => Some("fix the conflicts with 'evolve resolve' and run 'evolve evolve --continue'".into()),
            EvolveError::MergeConflict {
                resumable: false, ..
            } => Some(
                "merge by hand into a new changeset, recommit it on the common parent with the \
                 amended message, then prune both divergent changesets with it as successor"
                    .into(),
            ),
            EvolveError::UnrelatedDivergence { divergent, other } => Some(format!(
                "{divergent} and {other} are not based on the same changeset; relocate one of \
                 them next to the other and run this command again"
            )),
            EvolveError::ImmutableConflict { divergent, other } => Some(format!(
                "{divergent} is public, try from {other}"
            )),
            EvolveError::DivergentBaseNotFound(_) => Some("this case is not yet handled".into()),
            EvolveError::PushRejected { hint, .. } => hint.clone(),
            EvolveError::NoEvolveInProgress => {
                Some("run 'evolve evolve' to start a new evolution".into())
            }
            _ => None,
        }
    }
}
