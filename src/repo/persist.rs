use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::obsolete::{codec, ObsStore};
use crate::repo::Repo;
use crate::storage::{Bookmarks, ChangesetGraph, EvolveState, GraphSnapshot, WorkingState};
use crate::types::{EvolveError, Result};

const CHANGESETS_FILE: &str = "changesets.json";
const BOOKMARKS_FILE: &str = "bookmarks.json";
const WORKSTATE_FILE: &str = "workstate.json";
const EVOLVESTATE_FILE: &str = "evolvestate.json";
const OBSSTORE_FILE: &str = "obsstore";

pub(crate) struct Loaded {
    pub(crate) graph: ChangesetGraph,
    pub(crate) store: ObsStore,
    pub(crate) bookmarks: Bookmarks,
    pub(crate) working: WorkingState,
    pub(crate) evolve_state: Option<EvolveState>,
}

pub(crate) fn load(dir: &Path, obsolescence: bool) -> Result<Loaded> {
    let snapshot: GraphSnapshot = read_json(&dir.join(CHANGESETS_FILE))?.unwrap_or_default();
    let graph = ChangesetGraph::from_snapshot(snapshot)?;
    let obsstore = dir.join(OBSSTORE_FILE);
    let bytes = if obsstore.exists() {
        fs::read(&obsstore)?
    } else {
        Vec::new()
    };
    let store = ObsStore::load(obsolescence, &bytes)?;
    let bookmarks: Bookmarks = read_json(&dir.join(BOOKMARKS_FILE))?.unwrap_or_default();
    let working: WorkingState = read_json(&dir.join(WORKSTATE_FILE))?.unwrap_or_default();
    let evolve_state = read_json(&dir.join(EVOLVESTATE_FILE))?;
    Ok(Loaded {
        graph,
        store,
        bookmarks,
        working,
        evolve_state,
    })
}

impl Repo {
    /// Writes every piece of state to the repository directory.
    ///
    /// Markers are appended to the obsstore file; the other files are
    /// replaced whole. In-memory repositories ignore this.
    pub(crate) fn flush(&mut self) -> Result<()> {
        let Some(dir) = self.dir.clone() else {
            return Ok(());
        };
        write_json(&dir.join(CHANGESETS_FILE), &self.graph.snapshot())?;
        write_json(&dir.join(BOOKMARKS_FILE), &self.bookmarks)?;
        write_json(&dir.join(WORKSTATE_FILE), &self.working)?;
        let evolvestate = dir.join(EVOLVESTATE_FILE);
        match &self.evolve_state {
            Some(state) => write_json(&evolvestate, state)?,
            None if evolvestate.exists() => fs::remove_file(&evolvestate)?,
            None => {}
        }
        self.flush_obsstore(&dir.join(OBSSTORE_FILE))?;
        debug!(
            dir = %dir.display(),
            changesets = self.graph.len(),
            markers = self.store.len(),
            "repo.flush.completed"
        );
        Ok(())
    }

    fn flush_obsstore(&mut self, path: &Path) -> Result<()> {
        if !path.exists() {
            write_atomic(path, &self.store.encode())?;
            self.flushed_markers = self.store.len();
            return Ok(());
        }
        let pending = self.store.since(self.flushed_markers);
        if pending.is_empty() {
            return Ok(());
        }
        let mut records = Vec::new();
        for marker in pending {
            codec::encode_record(marker, &mut records);
        }
        let mut file = OpenOptions::new().append(true).open(path)?;
        file.write_all(&records)?;
        file.sync_data()?;
        self.flushed_markers = self.store.len();
        Ok(())
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let bytes = fs::read(path)?;
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|err| EvolveError::Serialization(format!("{}: {err}", path.display())))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)
        .map_err(|err| EvolveError::Serialization(format!("{}: {err}", path.display())))?;
    write_atomic(path, &bytes)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
