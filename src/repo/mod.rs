#![forbid(unsafe_code)]

//! The repository aggregate.
//!
//! [`Repo`] owns the changeset graph, the marker store, bookmarks, the
//! working position and the resumable evolve state. Mutations go through
//! [`Repo::transaction`], which holds both scoped locks, rolls everything
//! back on error and flushes to disk on success. Trouble sets are derived
//! lazily and cached until the next mutation.

mod options;
mod persist;
mod revs;
mod txn;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use tracing::{debug, info};

use crate::obsolete::{
    Marker, MarkerFlags, ObsStore, ObsoleteStatus, Relation, Traversal, TroubleKind, TroubleSets,
};
use crate::primitives::concurrency::RepoLocks;
use crate::storage::{
    Bookmarks, Changeset, ChangesetGraph, ChangesetSpec, EvolveState, FileEntry, Resolution,
    WorkingState,
};
use crate::types::{EvolveError, NodeId, Phase, Result, Timestamp};

pub use options::{default_config_path, RepoOptions};

/// Directory holding repository state, relative to the repository root.
pub const REPO_DIR: &str = ".evolve";

/// A history repository with its obsolescence overlay.
pub struct Repo {
    dir: Option<PathBuf>,
    options: RepoOptions,
    locks: RepoLocks,
    graph: ChangesetGraph,
    store: ObsStore,
    bookmarks: Bookmarks,
    working: WorkingState,
    evolve_state: Option<EvolveState>,
    troubles: Mutex<Option<Arc<TroubleSets>>>,
    txn_depth: usize,
    flushed_markers: usize,
}

/// A new changeset on top of the working position.
#[derive(Clone, Debug, Default)]
pub struct CommitRequest {
    /// Paths to write (`Some`) or remove (`None`).
    pub files: BTreeMap<String, Option<FileEntry>>,
    /// Commit message.
    pub message: String,
    /// Author; defaults to the configured username.
    pub user: Option<String>,
    /// Date; defaults to now.
    pub date: Option<Timestamp>,
    /// Phase of the new changeset; defaults to draft.
    pub phase: Option<Phase>,
    /// Changesets the new one obsoletes.
    pub obsoletes: Vec<NodeId>,
}

impl CommitRequest {
    /// Request with a message and no file changes yet.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    /// Writes `path`.
    pub fn write(mut self, path: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        self.files.insert(path.into(), Some(FileEntry::new(data)));
        self
    }

    /// Writes `path` with a full entry (mode, copy source).
    pub fn write_entry(mut self, path: impl Into<String>, entry: FileEntry) -> Self {
        self.files.insert(path.into(), Some(entry));
        self
    }

    /// Removes `path`.
    pub fn remove(mut self, path: impl Into<String>) -> Self {
        self.files.insert(path.into(), None);
        self
    }

    /// Sets the commit date.
    pub fn date(mut self, date: Timestamp) -> Self {
        self.date = Some(date);
        self
    }

    /// Records that the new changeset replaces `node`.
    pub fn obsoletes(mut self, node: NodeId) -> Self {
        self.obsoletes.push(node);
        self
    }
}

impl Repo {
    /// Repository that lives only in memory.
    pub fn in_memory(options: RepoOptions) -> Self {
        Self::assemble(
            None,
            options.clone(),
            RepoLocks::in_memory(),
            ChangesetGraph::new(),
            ObsStore::new(options.obsolescence),
            Bookmarks::new(),
            WorkingState::default(),
            None,
        )
    }

    /// Creates a new repository rooted at `root`.
    pub fn init(root: impl AsRef<Path>, options: RepoOptions) -> Result<Self> {
        let dir = root.as_ref().join(REPO_DIR);
        if dir.exists() {
            return Err(EvolveError::InvalidArgument(format!(
                "repository {} already exists",
                root.as_ref().display()
            )));
        }
        std::fs::create_dir_all(&dir)?;
        let mut repo = Self::in_memory(options);
        repo.locks = RepoLocks::on_disk(&dir);
        repo.dir = Some(dir);
        repo.flush()?;
        info!(root = %root.as_ref().display(), "repo.init.completed");
        Ok(repo)
    }

    /// Opens the repository rooted at `root` with options from its config files.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let dir = root.as_ref().join(REPO_DIR);
        let options = RepoOptions::load(Some(&dir))?;
        Self::open_with(root, options)
    }

    /// Opens the repository rooted at `root` with explicit options.
    pub fn open_with(root: impl AsRef<Path>, options: RepoOptions) -> Result<Self> {
        let dir = root.as_ref().join(REPO_DIR);
        if !dir.is_dir() {
            return Err(EvolveError::InvalidArgument(format!(
                "no repository found in {}",
                root.as_ref().display()
            )));
        }
        let loaded = persist::load(&dir, options.obsolescence)?;
        let markers = loaded.store.len();
        let mut repo = Self::assemble(
            Some(dir.clone()),
            options,
            RepoLocks::on_disk(&dir),
            loaded.graph,
            loaded.store,
            loaded.bookmarks,
            loaded.working,
            loaded.evolve_state,
        );
        repo.flushed_markers = markers;
        debug!(
            changesets = repo.graph.len(),
            markers,
            "repo.open.completed"
        );
        Ok(repo)
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        dir: Option<PathBuf>,
        options: RepoOptions,
        locks: RepoLocks,
        graph: ChangesetGraph,
        store: ObsStore,
        bookmarks: Bookmarks,
        working: WorkingState,
        evolve_state: Option<EvolveState>,
    ) -> Self {
        Self {
            dir,
            options,
            locks,
            graph,
            store,
            bookmarks,
            working,
            evolve_state,
            troubles: Mutex::new(None),
            txn_depth: 0,
            flushed_markers: 0,
        }
    }

    /// State directory, `None` for in-memory repositories.
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Options the handle was built with.
    pub fn options(&self) -> &RepoOptions {
        &self.options
    }

    /// Scoped locks of this repository.
    pub fn locks(&self) -> &RepoLocks {
        &self.locks
    }

    /// The changeset graph.
    pub fn graph(&self) -> &ChangesetGraph {
        &self.graph
    }

    /// The marker store.
    pub fn store(&self) -> &ObsStore {
        &self.store
    }

    /// Bookmarks.
    pub fn bookmarks(&self) -> &Bookmarks {
        &self.bookmarks
    }

    /// Closure and successor-set queries over the current state.
    pub fn traversal(&self) -> Traversal<'_> {
        Traversal::new(&self.store, &self.graph)
    }

    /// Looks up a changeset.
    pub fn changeset(&self, node: NodeId) -> Result<&Changeset> {
        self.graph.get(node)
    }

    /// Phase of a changeset.
    pub fn phase(&self, node: NodeId) -> Result<Phase> {
        self.graph.phase(node)
    }

    /// Configured author.
    pub fn username(&self) -> &str {
        &self.options.username
    }

    // ---- working position ------------------------------------------------

    /// First parent of the working copy, if any.
    pub fn working_parent(&self) -> Option<NodeId> {
        self.working.parents.first().copied()
    }

    /// Parents of the working copy.
    pub fn working_parents(&self) -> &[NodeId] {
        &self.working.parents
    }

    /// Moves the working copy onto `parents`.
    pub fn set_working_parents(&mut self, parents: &[NodeId]) -> Result<()> {
        for parent in parents.iter().filter(|p| !p.is_null()) {
            if !self.graph.contains(*parent) {
                return Err(EvolveError::UnknownNode(*parent));
            }
        }
        self.working.set_parents(parents);
        debug!(parents = ?self.working.parents, "repo.working.set_parents");
        Ok(())
    }

    /// Updates the working copy to `node`, activating `bookmark` when given
    /// and deactivating the active bookmark otherwise.
    pub fn update(&mut self, node: NodeId, bookmark: Option<&str>) -> Result<()> {
        self.set_working_parents(&[node])?;
        match bookmark {
            Some(name) if self.bookmarks.get(name) == Some(node) => {
                self.bookmarks.set_active(Some(name.to_string()))
            }
            _ => self.bookmarks.set_active(None),
        }
        Ok(())
    }

    // ---- bookmarks -------------------------------------------------------

    /// Creates or moves a bookmark.
    pub fn set_bookmark(&mut self, name: &str, node: NodeId) -> Result<()> {
        if name.trim().is_empty() || name.parse::<u32>().is_ok() || name == "." || name == "tip" {
            return Err(EvolveError::InvalidArgument(format!(
                "bookmark name '{name}' is reserved or empty"
            )));
        }
        self.graph.get(node)?;
        self.bookmarks.set(name, node);
        Ok(())
    }

    /// Deletes a bookmark.
    pub fn delete_bookmark(&mut self, name: &str) -> Result<NodeId> {
        self.bookmarks
            .remove(name)
            .ok_or_else(|| EvolveError::InvalidArgument(format!("bookmark '{name}' does not exist")))
    }

    /// Activates an existing bookmark or clears the active one.
    pub fn activate_bookmark(&mut self, name: Option<&str>) {
        self.bookmarks.set_active(name.map(str::to_string));
    }

    /// Moves every bookmark on `from` to `to`.
    pub fn move_bookmarks(&mut self, from: NodeId, to: NodeId) -> usize {
        let moved = self.bookmarks.move_all(from, to);
        if moved > 0 {
            debug!(from = %from, to = %to, moved, "repo.bookmarks.moved");
        }
        moved
    }

    // ---- evolve state ----------------------------------------------------

    /// The interrupted evolution, if any.
    pub fn evolve_state(&self) -> Option<&EvolveState> {
        self.evolve_state.as_ref()
    }

    pub(crate) fn set_evolve_state(&mut self, state: Option<EvolveState>) {
        self.evolve_state = state;
    }

    /// Settles one conflicted path of the interrupted evolution.
    pub fn resolve_path(&mut self, path: &str, resolution: Resolution) -> Result<()> {
        self.transaction("resolve", |repo| {
            let state = repo
                .evolve_state
                .as_mut()
                .ok_or(EvolveError::NoEvolveInProgress)?;
            state.resolve(path, resolution)
        })
    }

    // ---- graph mutation --------------------------------------------------

    /// Commits a changeset spec directly into the graph.
    pub fn commit_changeset(&mut self, spec: ChangesetSpec, phase: Phase) -> Result<(NodeId, bool)> {
        let outcome = self.graph.commit(spec, phase)?;
        if outcome.1 {
            self.invalidate();
        }
        Ok(outcome)
    }

    /// Commits on top of the working position, moving the active bookmark
    /// and the working copy to the new changeset.
    pub fn commit(&mut self, request: CommitRequest) -> Result<NodeId> {
        self.transaction("commit", |repo| {
            if request.files.is_empty() && repo.working.parents.len() < 2 {
                return Err(EvolveError::InvalidArgument("nothing changed".into()));
            }
            let parents = [
                repo.working.parents.first().copied().unwrap_or(NodeId::NULL),
                repo.working.parents.get(1).copied().unwrap_or(NodeId::NULL),
            ];
            let mut spec = ChangesetSpec::new(
                parents,
                request.user.clone().unwrap_or_else(|| repo.options.username.clone()),
                request.message.clone(),
            )
            .date(request.date.unwrap_or_else(Timestamp::now));
            spec.files = request.files.clone();
            let (node, _) = repo.commit_changeset(spec, request.phase.unwrap_or(Phase::Draft))?;
            if let Some(active) = repo.bookmarks.active().map(str::to_string) {
                if parents.contains(&repo.bookmarks.get(&active).unwrap_or(NodeId::NULL)) {
                    repo.bookmarks.set(active, node);
                }
            }
            repo.working.set_parents(&[node]);
            if !request.obsoletes.is_empty() {
                let relations = request
                    .obsoletes
                    .iter()
                    .map(|old| Relation::new(*old, [node]))
                    .collect();
                repo.create_markers(relations)?;
                for old in &request.obsoletes {
                    repo.move_bookmarks(*old, node);
                }
            }
            info!(node = %node, obsoletes = request.obsoletes.len(), "repo.commit.completed");
            Ok(node)
        })
    }

    /// Makes `nodes` and their descendants no more public than `phase`.
    pub fn retract_boundary(&mut self, phase: Phase, nodes: &[NodeId]) -> usize {
        let changed = self.graph.retract_boundary(phase, nodes);
        if changed > 0 {
            self.invalidate();
        }
        changed
    }

    /// Makes `nodes` and their ancestors at least as public as `phase`.
    pub fn advance_boundary(&mut self, phase: Phase, nodes: &[NodeId]) -> usize {
        let changed = self.graph.advance_boundary(phase, nodes);
        if changed > 0 {
            self.invalidate();
        }
        changed
    }

    // ---- markers ---------------------------------------------------------

    /// Appends one marker per relation, all or nothing.
    ///
    /// Every precursor must be a known, mutable changeset and every
    /// successor a known changeset. The configured user and the current
    /// date are recorded on each marker. Returns how many markers were new.
    pub fn create_markers(&mut self, relations: Vec<Relation>) -> Result<usize> {
        if !self.store.is_enabled() {
            return Err(EvolveError::ObsolescenceDisabled);
        }
        for relation in &relations {
            if !self.graph.phase(relation.precursor)?.is_mutable() {
                return Err(EvolveError::ImmutableChangeset {
                    node: relation.precursor,
                    action: "obsolete",
                });
            }
            for succ in relation.successors.iter().filter(|s| !s.is_null()) {
                if *succ == relation.precursor {
                    return Err(EvolveError::InvalidArgument(format!(
                        "in-marker cycle with {succ}"
                    )));
                }
                self.graph.get(*succ)?;
            }
        }
        let date = Timestamp::now();
        let user = self.options.username.clone();
        self.transaction("add-obsolescence-marker", move |repo| {
            let mut added = 0;
            for relation in relations {
                let mut metadata = BTreeMap::from([("user".to_string(), user.clone())]);
                metadata.extend(relation.metadata);
                let marker = Marker {
                    precursor: relation.precursor,
                    successors: relation.successors,
                    flags: relation.flags,
                    metadata,
                    date,
                };
                debug!(marker = %marker, "obsstore.append");
                if repo.store.append(marker)? {
                    added += 1;
                }
            }
            repo.invalidate();
            Ok(added)
        })
    }

    // ---- derived queries -------------------------------------------------

    /// Trouble sets for the current state, computed on first use.
    pub fn troubles(&self) -> Arc<TroubleSets> {
        let mut cached = self.troubles.lock();
        if let Some(sets) = cached.as_ref() {
            return Arc::clone(sets);
        }
        let sets = Arc::new(TroubleSets::compute(&self.store, &self.graph));
        *cached = Some(Arc::clone(&sets));
        sets
    }

    pub(crate) fn invalidate(&self) {
        *self.troubles.lock() = None;
    }

    /// Trouble kinds of one changeset.
    pub fn classify(&self, node: NodeId) -> std::collections::BTreeSet<TroubleKind> {
        self.troubles().classify(node)
    }

    /// Obsolescence status of one changeset.
    pub fn obsolete_status(&self, node: NodeId) -> ObsoleteStatus {
        self.troubles().status(node)
    }

    /// Whether `node` is obsolete.
    pub fn is_obsolete(&self, node: NodeId) -> bool {
        self.troubles().obsolete.contains(&node)
    }

    /// Obsolete changesets, by revision.
    pub fn obsolete(&self) -> Vec<NodeId> {
        self.sorted(&self.troubles().obsolete)
    }

    /// Unstable changesets, by revision.
    pub fn unstable(&self) -> Vec<NodeId> {
        self.sorted(&self.troubles().unstable)
    }

    /// Bumped changesets, by revision.
    pub fn bumped(&self) -> Vec<NodeId> {
        self.sorted(&self.troubles().bumped)
    }

    /// Divergent changesets, by revision.
    pub fn divergent(&self) -> Vec<NodeId> {
        self.sorted(&self.troubles().divergent)
    }

    /// Suspended changesets, by revision.
    pub fn suspended(&self) -> Vec<NodeId> {
        self.sorted(&self.troubles().suspended)
    }

    /// Extinct changesets, by revision.
    pub fn extinct(&self) -> Vec<NodeId> {
        self.sorted(&self.troubles().extinct)
    }

    /// Unstable, bumped or divergent changesets, by revision.
    pub fn troubled(&self) -> Vec<NodeId> {
        self.sorted(&self.troubles().troubled())
    }

    /// Known direct precursors of `nodes`, by revision.
    pub fn precursors(&self, nodes: &[NodeId]) -> Vec<NodeId> {
        self.sorted(&self.traversal().direct_precursors(nodes.iter().copied()))
    }

    /// Known direct successors of `nodes`, by revision.
    pub fn successors(&self, nodes: &[NodeId]) -> Vec<NodeId> {
        self.sorted(&self.traversal().direct_successors(nodes.iter().copied()))
    }

    /// Known transitive precursors of `nodes`, by revision.
    pub fn all_precursors(&self, nodes: &[NodeId]) -> Vec<NodeId> {
        self.sorted(&self.traversal().transitive_precursors(nodes.iter().copied()))
    }

    /// Known transitive successors of `nodes`, by revision.
    pub fn all_successors(&self, nodes: &[NodeId]) -> Vec<NodeId> {
        self.sorted(
            &self
                .traversal()
                .transitive_successors(nodes.iter().copied(), MarkerFlags::NONE),
        )
    }

    /// Successor sets of `node`.
    pub fn successor_sets(&self, node: NodeId) -> Vec<Vec<NodeId>> {
        self.traversal().successor_sets(node)
    }

    fn sorted(&self, nodes: &FxHashSet<NodeId>) -> Vec<NodeId> {
        self.graph.sort_by_rev(nodes.iter().copied())
    }
}
