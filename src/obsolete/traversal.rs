//! Queries over the obsolescence graph.
//!
//! Closures walk the raw marker graph, including nodes the changeset graph
//! does not know (stripped or never pulled), and only filter to known
//! changesets when producing results.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::obsolete::marker::{Marker, MarkerFlags};
use crate::obsolete::store::ObsStore;
use crate::storage::ChangesetGraph;
use crate::types::NodeId;

/// Memo table for [`Traversal::successor_sets_cached`].
pub type SuccessorSetCache = FxHashMap<NodeId, Vec<Vec<NodeId>>>;

/// Read-only view combining the marker store with the changeset graph.
#[derive(Clone, Copy)]
pub struct Traversal<'a> {
    store: &'a ObsStore,
    graph: &'a ChangesetGraph,
}

impl<'a> Traversal<'a> {
    /// Builds a view over a store and the graph it annotates.
    pub fn new(store: &'a ObsStore, graph: &'a ChangesetGraph) -> Self {
        Self { store, graph }
    }

    /// Known changesets that are the precursor of a marker naming one of `nodes`.
    pub fn direct_precursors<I: IntoIterator<Item = NodeId>>(&self, nodes: I) -> FxHashSet<NodeId> {
        nodes
            .into_iter()
            .flat_map(|node| self.store.precursors_of(node))
            .map(|marker| marker.precursor)
            .filter(|prec| self.graph.contains(*prec))
            .collect()
    }

    /// Known changesets listed as successors by a marker obsoleting one of `nodes`.
    pub fn direct_successors<I: IntoIterator<Item = NodeId>>(&self, nodes: I) -> FxHashSet<NodeId> {
        nodes
            .into_iter()
            .flat_map(|node| self.store.successors_of(node))
            .flat_map(|marker| marker.successors.iter().copied())
            .filter(|succ| !succ.is_null() && self.graph.contains(*succ))
            .collect()
    }

    /// `nodes` plus everything reachable backwards through markers, skipping
    /// markers whose flags intersect `ignore`. Unknown nodes are included.
    pub fn all_precursors<I: IntoIterator<Item = NodeId>>(
        &self,
        nodes: I,
        ignore: MarkerFlags,
    ) -> FxHashSet<NodeId> {
        let mut seen: FxHashSet<NodeId> = FxHashSet::default();
        let mut work: Vec<NodeId> = Vec::new();
        for node in nodes {
            if seen.insert(node) {
                work.push(node);
            }
        }
        while let Some(current) = work.pop() {
            for marker in self.store.precursors_of(current) {
                if marker.flags.intersects(ignore) {
                    continue;
                }
                if seen.insert(marker.precursor) {
                    work.push(marker.precursor);
                }
            }
        }
        seen
    }

    /// `nodes` plus everything reachable forwards through markers, not
    /// crossing markers whose flags intersect `halt`. Unknown nodes are included.
    pub fn all_successors<I: IntoIterator<Item = NodeId>>(
        &self,
        nodes: I,
        halt: MarkerFlags,
    ) -> FxHashSet<NodeId> {
        let mut seen: FxHashSet<NodeId> = FxHashSet::default();
        let mut work: Vec<NodeId> = Vec::new();
        for node in nodes {
            if seen.insert(node) {
                work.push(node);
            }
        }
        while let Some(current) = work.pop() {
            for marker in self.store.successors_of(current) {
                if marker.flags.intersects(halt) {
                    continue;
                }
                for succ in &marker.successors {
                    if !succ.is_null() && seen.insert(*succ) {
                        work.push(*succ);
                    }
                }
            }
        }
        seen
    }

    /// Known transitive precursors of `nodes`, the inputs themselves excluded.
    pub fn transitive_precursors<I>(&self, nodes: I) -> FxHashSet<NodeId>
    where
        I: IntoIterator<Item = NodeId>,
    {
        let nodes: FxHashSet<NodeId> = nodes.into_iter().collect();
        let mut all = self.all_precursors(nodes.iter().copied(), MarkerFlags::NONE);
        all.retain(|n| !nodes.contains(n) && self.graph.contains(*n));
        all
    }

    /// Known transitive successors of `nodes`, the inputs themselves excluded.
    pub fn transitive_successors<I>(&self, nodes: I, halt: MarkerFlags) -> FxHashSet<NodeId>
    where
        I: IntoIterator<Item = NodeId>,
    {
        let nodes: FxHashSet<NodeId> = nodes.into_iter().collect();
        let mut all = self.all_successors(nodes.iter().copied(), halt);
        all.retain(|n| !nodes.contains(n) && self.graph.contains(*n));
        all
    }

    /// Resolves the living successor sets of `node`.
    ///
    /// A node without markers resolves to itself (or to nothing when the
    /// graph does not know it). An obsolete node resolves, marker by
    /// marker, to the product of its successors' own resolutions; empty
    /// sets and sets contained in a larger one are dropped.
    pub fn successor_sets(&self, node: NodeId) -> Vec<Vec<NodeId>> {
        let mut cache = SuccessorSetCache::default();
        self.successor_sets_cached(node, &mut cache)
    }

    /// [`Traversal::successor_sets`] sharing a memo table across calls.
    pub fn successor_sets_cached(
        &self,
        initial: NodeId,
        cache: &mut SuccessorSetCache,
    ) -> Vec<Vec<NodeId>> {
        let mut stack: Vec<NodeId> = vec![initial];
        let mut stacked: FxHashSet<NodeId> = FxHashSet::default();
        stacked.insert(initial);

        while let Some(&current) = stack.last() {
            if cache.contains_key(&current) {
                stack.pop();
                stacked.remove(&current);
                continue;
            }
            let markers = self.sorted_markers(current);
            if markers.is_empty() {
                let resolved = if self.graph.contains(current) {
                    vec![vec![current]]
                } else {
                    Vec::new()
                };
                cache.insert(current, resolved);
                continue;
            }

            // Descend into the first successor not resolved yet.
            let mut pending = None;
            'scan: for marker in &markers {
                for succ in &marker.successors {
                    if cache.contains_key(succ) {
                        continue;
                    }
                    if stacked.contains(succ) {
                        // Marker cycle: treat the back edge as dead.
                        cache.insert(*succ, Vec::new());
                        continue;
                    }
                    pending = Some(*succ);
                    break 'scan;
                }
            }
            if let Some(next) = pending {
                stack.push(next);
                stacked.insert(next);
                continue;
            }

            let mut sets: Vec<Vec<NodeId>> = Vec::new();
            for marker in &markers {
                let mut product: Vec<Vec<NodeId>> = vec![Vec::new()];
                for succ in &marker.successors {
                    let resolved = cache.get(succ).map(Vec::as_slice).unwrap_or(&[]);
                    let mut next = Vec::with_capacity(product.len() * resolved.len());
                    for prefix in &product {
                        for suffix in resolved {
                            let mut combined = prefix.clone();
                            for part in suffix {
                                if !combined.contains(part) {
                                    combined.push(*part);
                                }
                            }
                            next.push(combined);
                        }
                    }
                    product = next;
                }
                sets.extend(product);
            }
            cache.insert(current, prune_subsets(sets));
        }

        cache.get(&initial).cloned().unwrap_or_default()
    }

    fn sorted_markers(&self, node: NodeId) -> Vec<&'a Marker> {
        let mut markers: Vec<&Marker> = self.store.successors_of(node).collect();
        markers.sort();
        markers
    }
}

/// Drops empty sets and sets included in another one. Survivors come back
/// smallest first; sets of equal size come back in reverse input order.
fn prune_subsets(sets: Vec<Vec<NodeId>>) -> Vec<Vec<NodeId>> {
    let mut candidates: Vec<Vec<NodeId>> = sets.into_iter().filter(|s| !s.is_empty()).collect();
    candidates.sort_by(|a, b| b.len().cmp(&a.len()));
    let mut seen: Vec<FxHashSet<NodeId>> = Vec::new();
    let mut kept: Vec<Vec<NodeId>> = Vec::new();
    for candidate in candidates {
        let as_set: FxHashSet<NodeId> = candidate.iter().copied().collect();
        if seen.iter().any(|s| as_set.is_subset(s)) {
            continue;
        }
        seen.push(as_set);
        kept.push(candidate);
    }
    kept.reverse();
    kept
}
