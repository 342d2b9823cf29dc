use std::collections::BTreeSet;
use std::fmt;

use rustc_hash::FxHashSet;
use serde::Serialize;
use tracing::debug;

use crate::obsolete::marker::MarkerFlags;
use crate::obsolete::store::ObsStore;
use crate::obsolete::traversal::{SuccessorSetCache, Traversal};
use crate::storage::ChangesetGraph;
use crate::types::{NodeId, Phase};

/// Kind of trouble a changeset can be in.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TroubleKind {
    /// Descends from an obsolete changeset.
    Unstable,
    /// Rewrites a changeset that has since become public.
    Bumped,
    /// One of several competing successors of a precursor.
    Divergent,
}

impl TroubleKind {
    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            TroubleKind::Unstable => "unstable",
            TroubleKind::Bumped => "bumped",
            TroubleKind::Divergent => "divergent",
        }
    }
}

impl fmt::Display for TroubleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Obsolescence status shown next to a changeset in listings.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ObsoleteStatus {
    /// Not obsolete and not unstable.
    Stable,
    /// Not obsolete but descending from an obsolete changeset.
    Unstable,
    /// Obsolete with living descendants.
    Suspended,
    /// Obsolete without living descendants.
    Extinct,
}

impl ObsoleteStatus {
    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            ObsoleteStatus::Stable => "stable",
            ObsoleteStatus::Unstable => "unstable",
            ObsoleteStatus::Suspended => "suspended",
            ObsoleteStatus::Extinct => "extinct",
        }
    }
}

/// Every derived node set, computed together from one store + graph state.
#[derive(Clone, Debug, Default)]
pub struct TroubleSets {
    /// Mutable changesets obsoleted by at least one marker.
    pub obsolete: FxHashSet<NodeId>,
    /// Non-obsolete descendants of obsolete changesets.
    pub unstable: FxHashSet<NodeId>,
    /// Obsolete ancestors of unstable changesets.
    pub suspended: FxHashSet<NodeId>,
    /// Obsolete changesets that are not suspended.
    pub extinct: FxHashSet<NodeId>,
    /// Mutable, non-obsolete changesets with a public precursor.
    pub bumped: FxHashSet<NodeId>,
    /// Mutable, non-obsolete changesets competing with another successor.
    pub divergent: FxHashSet<NodeId>,
}

impl TroubleSets {
    /// Derives every set. A disabled store yields empty sets.
    pub fn compute(store: &ObsStore, graph: &ChangesetGraph) -> Self {
        if !store.is_enabled() || store.is_empty() {
            return Self::default();
        }
        let traversal = Traversal::new(store, graph);
        let obsolete = compute_obsolete(store, graph);
        let unstable: FxHashSet<NodeId> = graph
            .descendants(obsolete.iter().copied())
            .into_iter()
            .filter(|n| !obsolete.contains(n))
            .collect();
        let unstable_ancestors = graph.ancestors(unstable.iter().copied());
        let suspended: FxHashSet<NodeId> = obsolete
            .iter()
            .copied()
            .filter(|n| unstable_ancestors.contains(n))
            .collect();
        let extinct: FxHashSet<NodeId> = obsolete
            .iter()
            .copied()
            .filter(|n| !suspended.contains(n))
            .collect();
        let bumped = compute_bumped(&traversal, graph, &obsolete);
        let divergent = compute_divergent(&traversal, store, graph, &obsolete);
        debug!(
            obsolete = obsolete.len(),
            unstable = unstable.len(),
            bumped = bumped.len(),
            divergent = divergent.len(),
            "troubles.compute.completed"
        );
        Self {
            obsolete,
            unstable,
            suspended,
            extinct,
            bumped,
            divergent,
        }
    }

    /// Trouble kinds of one changeset.
    pub fn classify(&self, node: NodeId) -> BTreeSet<TroubleKind> {
        let mut kinds = BTreeSet::new();
        if self.unstable.contains(&node) {
            kinds.insert(TroubleKind::Unstable);
        }
        if self.bumped.contains(&node) {
            kinds.insert(TroubleKind::Bumped);
        }
        if self.divergent.contains(&node) {
            kinds.insert(TroubleKind::Divergent);
        }
        kinds
    }

    /// Whether `node` has any trouble.
    pub fn is_troubled(&self, node: NodeId) -> bool {
        self.unstable.contains(&node) || self.bumped.contains(&node) || self.divergent.contains(&node)
    }

    /// Union of the unstable, bumped and divergent sets.
    pub fn troubled(&self) -> FxHashSet<NodeId> {
        self.unstable
            .iter()
            .chain(&self.bumped)
            .chain(&self.divergent)
            .copied()
            .collect()
    }

    /// Obsolescence status of one changeset.
    pub fn status(&self, node: NodeId) -> ObsoleteStatus {
        if self.extinct.contains(&node) {
            ObsoleteStatus::Extinct
        } else if self.suspended.contains(&node) {
            ObsoleteStatus::Suspended
        } else if self.unstable.contains(&node) {
            ObsoleteStatus::Unstable
        } else {
            ObsoleteStatus::Stable
        }
    }
}

fn compute_obsolete(store: &ObsStore, graph: &ChangesetGraph) -> FxHashSet<NodeId> {
    store
        .precursor_nodes()
        .filter(|n| matches!(graph.phase(*n), Ok(phase) if phase.is_mutable()))
        .collect()
}

fn compute_bumped(
    traversal: &Traversal<'_>,
    graph: &ChangesetGraph,
    obsolete: &FxHashSet<NodeId>,
) -> FxHashSet<NodeId> {
    let mut bumped = FxHashSet::default();
    for cs in graph.iter() {
        if obsolete.contains(&cs.id) || !matches!(graph.phase(cs.id), Ok(p) if p.is_mutable()) {
            continue;
        }
        let has_public_precursor = traversal
            .all_precursors([cs.id], MarkerFlags::BUMPED_FIX)
            .into_iter()
            .any(|prec| matches!(graph.phase(prec), Ok(Phase::Public)));
        if has_public_precursor {
            bumped.insert(cs.id);
        }
    }
    bumped
}

fn compute_divergent(
    traversal: &Traversal<'_>,
    store: &ObsStore,
    graph: &ChangesetGraph,
    obsolete: &FxHashSet<NodeId>,
) -> FxHashSet<NodeId> {
    let mut divergent = FxHashSet::default();
    let mut cache = SuccessorSetCache::default();
    for cs in graph.iter() {
        if obsolete.contains(&cs.id) || !matches!(graph.phase(cs.id), Ok(p) if p.is_mutable()) {
            continue;
        }
        let mut seen: FxHashSet<NodeId> = FxHashSet::default();
        let mut work: Vec<NodeId> = store.precursors_of(cs.id).map(|m| m.precursor).collect();
        while let Some(prec) = work.pop() {
            if !seen.insert(prec) {
                continue;
            }
            let sets = traversal.successor_sets_cached(prec, &mut cache);
            if sets.iter().filter(|s| !s.is_empty()).count() > 1 {
                divergent.insert(cs.id);
                break;
            }
            work.extend(store.precursors_of(prec).map(|m| m.precursor));
        }
    }
    divergent
}
