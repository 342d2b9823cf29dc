use std::fmt;

use serde::Serialize;

use crate::obsolete::TroubleKind;
use crate::types::NodeId;

/// What a fix is going to do, computed before anything is written.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum FixPlan {
    /// Move an unstable changeset onto the living successor of its parent.
    Relocate {
        /// Unstable changeset.
        node: NodeId,
        /// New parent.
        onto: NodeId,
    },
    /// Recreate a bumped changeset's content as a child of its public precursor.
    Recreate {
        /// Bumped changeset.
        node: NodeId,
        /// Public precursor the new changeset will sit on.
        precursor: NodeId,
        /// Whether the bumped changeset first has to move next to the precursor.
        rebase_first: bool,
    },
    /// Merge a competing successor into a divergent changeset.
    Merge {
        /// Divergent changeset.
        node: NodeId,
        /// Competing successor.
        other: NodeId,
        /// Common precursor used as merge ancestor.
        base: NodeId,
    },
}

impl FixPlan {
    /// Trouble this plan repairs.
    pub fn kind(&self) -> TroubleKind {
        match self {
            FixPlan::Relocate { .. } => TroubleKind::Unstable,
            FixPlan::Recreate { .. } => TroubleKind::Bumped,
            FixPlan::Merge { .. } => TroubleKind::Divergent,
        }
    }

    /// Changeset being repaired.
    pub fn node(&self) -> NodeId {
        match self {
            FixPlan::Relocate { node, .. }
            | FixPlan::Recreate { node, .. }
            | FixPlan::Merge { node, .. } => *node,
        }
    }
}

impl fmt::Display for FixPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FixPlan::Relocate { node, onto } => write!(f, "move {node} onto {onto}"),
            FixPlan::Recreate {
                node,
                precursor,
                rebase_first,
            } => {
                if *rebase_first {
                    write!(f, "rebase {node} next to {precursor}, then ")?;
                }
                write!(f, "recreate {node} on top of public {precursor}")
            }
            FixPlan::Merge { node, other, base } => {
                write!(f, "merge {other} into {node} (base {base})")
            }
        }
    }
}

/// Result of one completed fix.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FixRecord {
    /// Trouble that was repaired.
    pub kind: TroubleKind,
    /// Changeset that was repaired.
    pub node: NodeId,
    /// Resulting changeset; `None` when the change was fully absorbed.
    pub result: Option<NodeId>,
}

/// Progress sink for the stabilization loop.
pub trait EvolveReporter {
    /// A fix was selected.
    fn planned(&mut self, _plan: &FixPlan) {}
    /// A fix completed.
    fn fixed(&mut self, _record: &FixRecord) {}
    /// `done` fixes completed, `remaining` troubled changesets left.
    fn progress(&mut self, _done: usize, _remaining: usize) {}
}

/// Reporter that ignores everything.
#[derive(Default, Debug, Clone, Copy)]
pub struct NoopReporter;

impl EvolveReporter for NoopReporter {}
