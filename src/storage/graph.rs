use std::collections::VecDeque;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::debug;

use crate::storage::changeset::{hash_changeset, Changeset, ChangesetSpec, Manifest};
use crate::types::{EvolveError, NodeId, Phase, Rev, Result};

/// Immutable changeset DAG with per-node phases.
///
/// Changesets are stored in creation order; `Rev` is their position. A
/// reverse (child) adjacency index mirrors the parent lists so both
/// directions are O(1) per edge.
#[derive(Default, Clone)]
pub struct ChangesetGraph {
    nodes: Vec<Changeset>,
    phases: Vec<Phase>,
    index: FxHashMap<NodeId, Rev>,
    children: Vec<SmallVec<[Rev; 2]>>,
}

/// Serialized form of a [`ChangesetGraph`].
#[derive(Serialize, Deserialize, Default)]
pub struct GraphSnapshot {
    /// Changesets in revision order.
    pub changesets: Vec<Changeset>,
    /// Phase of each changeset, parallel to `changesets`.
    pub phases: Vec<Phase>,
}

impl ChangesetGraph {
    /// Empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a graph, verifying ordering, parent presence and content hashes.
    pub fn from_snapshot(snapshot: GraphSnapshot) -> Result<Self> {
        if snapshot.changesets.len() != snapshot.phases.len() {
            return Err(EvolveError::Corruption(format!(
                "{} changesets but {} phases",
                snapshot.changesets.len(),
                snapshot.phases.len()
            )));
        }
        let mut graph = ChangesetGraph::new();
        for (cs, phase) in snapshot.changesets.into_iter().zip(snapshot.phases) {
            if cs.rev.index() != graph.nodes.len() {
                return Err(EvolveError::Corruption(format!(
                    "changeset {} stored at position {} claims rev {}",
                    cs.id,
                    graph.nodes.len(),
                    cs.rev
                )));
            }
            let expected = hash_changeset(
                &cs.parents,
                &cs.manifest,
                &cs.files,
                &cs.user,
                cs.date,
                &cs.message,
                &cs.extra,
            );
            if expected != cs.id {
                return Err(EvolveError::Corruption(format!(
                    "changeset {} does not match its content hash",
                    cs.id
                )));
            }
            graph.insert(cs, phase)?;
        }
        Ok(graph)
    }

    /// Serializable copy of the graph.
    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            changesets: self.nodes.clone(),
            phases: self.phases.clone(),
        }
    }

    /// Number of changesets.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph holds no changesets.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether `id` names a known changeset.
    pub fn contains(&self, id: NodeId) -> bool {
        self.index.contains_key(&id)
    }

    /// Revision of `id`, if known.
    pub fn rev(&self, id: NodeId) -> Option<Rev> {
        self.index.get(&id).copied()
    }

    /// Looks up a changeset by id.
    pub fn get(&self, id: NodeId) -> Result<&Changeset> {
        self.rev(id)
            .map(|rev| &self.nodes[rev.index()])
            .ok_or(EvolveError::UnknownNode(id))
    }

    /// Changeset at a revision.
    pub fn by_rev(&self, rev: Rev) -> Option<&Changeset> {
        self.nodes.get(rev.index())
    }

    /// All changesets in revision order.
    pub fn iter(&self) -> impl Iterator<Item = &Changeset> {
        self.nodes.iter()
    }

    /// The most recently created changeset.
    pub fn tip(&self) -> Option<&Changeset> {
        self.nodes.last()
    }

    /// Parents of `id` (null parents are never stored).
    pub fn parents(&self, id: NodeId) -> Result<&[NodeId]> {
        Ok(&self.get(id)?.parents)
    }

    /// Children of `id` in revision order.
    pub fn children(&self, id: NodeId) -> Result<Vec<NodeId>> {
        let rev = self.rev(id).ok_or(EvolveError::UnknownNode(id))?;
        Ok(self.children[rev.index()]
            .iter()
            .map(|child| self.nodes[child.index()].id)
            .collect())
    }

    /// Phase of `id`.
    pub fn phase(&self, id: NodeId) -> Result<Phase> {
        let rev = self.rev(id).ok_or(EvolveError::UnknownNode(id))?;
        Ok(self.phases[rev.index()])
    }

    /// Sorts and deduplicates nodes by revision, dropping unknown ids.
    pub fn sort_by_rev<I: IntoIterator<Item = NodeId>>(&self, nodes: I) -> Vec<NodeId> {
        let mut revs: Vec<Rev> = nodes.into_iter().filter_map(|n| self.rev(n)).collect();
        revs.sort_unstable();
        revs.dedup();
        revs.into_iter().map(|r| self.nodes[r.index()].id).collect()
    }

    /// `nodes` and all their ancestors.
    pub fn ancestors<I: IntoIterator<Item = NodeId>>(&self, nodes: I) -> FxHashSet<NodeId> {
        self.walk(nodes, |graph, rev| {
            graph.nodes[rev.index()]
                .parents
                .iter()
                .filter_map(|p| graph.rev(*p))
                .collect()
        })
    }

    /// `nodes` and all their descendants.
    pub fn descendants<I: IntoIterator<Item = NodeId>>(&self, nodes: I) -> FxHashSet<NodeId> {
        self.walk(nodes, |graph, rev| graph.children[rev.index()].to_vec())
    }

    fn walk<I, F>(&self, nodes: I, next: F) -> FxHashSet<NodeId>
    where
        I: IntoIterator<Item = NodeId>,
        F: Fn(&Self, Rev) -> Vec<Rev>,
    {
        let mut seen: FxHashSet<Rev> = FxHashSet::default();
        let mut queue: VecDeque<Rev> = nodes.into_iter().filter_map(|n| self.rev(n)).collect();
        while let Some(rev) = queue.pop_front() {
            if !seen.insert(rev) {
                continue;
            }
            queue.extend(next(self, rev));
        }
        seen.into_iter().map(|r| self.nodes[r.index()].id).collect()
    }

    /// Whether `ancestor` is `node` or one of its ancestors.
    pub fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        match (self.rev(ancestor), self.rev(node)) {
            (Some(a), Some(n)) if a <= n => self.ancestors([node]).contains(&ancestor),
            _ => false,
        }
    }

    /// Changesets without children, in revision order.
    pub fn heads(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|cs| self.children[cs.rev.index()].is_empty())
            .map(|cs| cs.id)
            .collect()
    }

    /// Makes `nodes` and their descendants no more public than `phase`.
    ///
    /// Returns how many changesets changed phase.
    pub fn retract_boundary(&mut self, phase: Phase, nodes: &[NodeId]) -> usize {
        let mut changed = 0;
        for id in self.descendants(nodes.iter().copied()) {
            if let Some(rev) = self.rev(id) {
                if self.phases[rev.index()] < phase {
                    self.phases[rev.index()] = phase;
                    changed += 1;
                }
            }
        }
        changed
    }

    /// Makes `nodes` and their ancestors at least as public as `phase`.
    ///
    /// Returns how many changesets changed phase.
    pub fn advance_boundary(&mut self, phase: Phase, nodes: &[NodeId]) -> usize {
        let mut changed = 0;
        for id in self.ancestors(nodes.iter().copied()) {
            if let Some(rev) = self.rev(id) {
                if self.phases[rev.index()] > phase {
                    self.phases[rev.index()] = phase;
                    changed += 1;
                }
            }
        }
        changed
    }

    /// Creates a changeset from `spec`, or returns the existing one when a
    /// changeset with identical content already exists.
    ///
    /// Returns `(id, created)`. The new changeset is placed in `phase` or
    /// in its most secret parent's phase, whichever is less public.
    pub fn commit(&mut self, spec: ChangesetSpec, phase: Phase) -> Result<(NodeId, bool)> {
        let mut parents: Vec<NodeId> = Vec::with_capacity(2);
        for parent in spec.parents {
            if parent.is_null() || parents.contains(&parent) {
                continue;
            }
            if !self.contains(parent) {
                return Err(EvolveError::UnknownNode(parent));
            }
            parents.push(parent);
        }
        let mut manifest = match parents.first() {
            Some(p1) => self.get(*p1)?.manifest.clone(),
            None => Manifest::new(),
        };
        for (path, entry) in &spec.files {
            match entry {
                Some(entry) => manifest.insert(path.clone(), entry.clone()),
                None => {
                    manifest.remove(path);
                }
            }
        }
        let files: Vec<String> = spec.files.keys().cloned().collect();
        let id = hash_changeset(
            &parents,
            &manifest,
            &files,
            &spec.user,
            spec.date,
            &spec.message,
            &spec.extra,
        );
        if self.contains(id) {
            debug!(node = %id, "graph.commit.existing");
            return Ok((id, false));
        }
        let mut phase = phase;
        for parent in &parents {
            phase = phase.max(self.phase(*parent)?);
        }
        let cs = Changeset {
            id,
            rev: Rev(self.nodes.len() as u32),
            parents,
            manifest,
            files,
            user: spec.user,
            date: spec.date,
            message: spec.message,
            extra: spec.extra,
        };
        self.insert(cs, phase)?;
        debug!(node = %id, phase = %phase, "graph.commit.created");
        Ok((id, true))
    }

    fn insert(&mut self, cs: Changeset, phase: Phase) -> Result<()> {
        let rev = Rev(self.nodes.len() as u32);
        for parent in &cs.parents {
            let prev = self.rev(*parent).ok_or(EvolveError::UnknownNode(*parent))?;
            self.children[prev.index()].push(rev);
        }
        if self.index.insert(cs.id, rev).is_some() {
            return Err(EvolveError::Corruption(format!("duplicate changeset {}", cs.id)));
        }
        self.nodes.push(cs);
        self.phases.push(phase);
        self.children.push(SmallVec::new());
        Ok(())
    }

    /// Drops every changeset created at or after revision `len`.
    pub(crate) fn truncate(&mut self, len: usize) {
        while self.nodes.len() > len {
            let Some(cs) = self.nodes.pop() else { break };
            self.phases.pop();
            self.children.pop();
            self.index.remove(&cs.id);
            for parent in &cs.parents {
                if let Some(prev) = self.rev(*parent) {
                    self.children[prev.index()].retain(|child| *child != cs.rev);
                }
            }
        }
    }

    pub(crate) fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub(crate) fn restore_phases(&mut self, phases: &[Phase]) {
        let shared = phases.len().min(self.phases.len());
        self.phases[..shared].copy_from_slice(&phases[..shared]);
    }
}
