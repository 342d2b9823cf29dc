use tracing::{debug, warn};

use crate::repo::Repo;
use crate::storage::{Bookmarks, EvolveState, WorkingState};
use crate::types::{Phase, Result};

/// Everything a failed transaction has to put back.
struct TxnSnapshot {
    changesets: usize,
    markers: usize,
    phases: Vec<Phase>,
    bookmarks: Bookmarks,
    working: WorkingState,
    evolve_state: Option<EvolveState>,
}

impl Repo {
    /// Runs `f` as one named transaction.
    ///
    /// Both scoped locks are held for the duration. If `f` fails, every
    /// changeset, marker, phase move, bookmark move and working-state change
    /// it made is undone; if it succeeds, the repository is flushed to disk.
    /// Nested calls join the outermost transaction.
    pub fn transaction<T, F>(&mut self, name: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Repo) -> Result<T>,
    {
        if self.txn_depth > 0 {
            return f(self);
        }
        let locks = self.locks.clone();
        let _wlock = locks.wlock()?;
        let _lock = locks.lock()?;
        let snapshot = self.snapshot();
        self.txn_depth += 1;
        let outcome = f(self);
        self.txn_depth -= 1;
        match outcome {
            Ok(value) => {
                self.flush()?;
                debug!(txn = name, "repo.txn.committed");
                Ok(value)
            }
            Err(err) => {
                self.rollback(snapshot);
                warn!(txn = name, error = %err, "repo.txn.rollback");
                Err(err)
            }
        }
    }

    /// Whether a transaction is currently open.
    pub fn in_transaction(&self) -> bool {
        self.txn_depth > 0
    }

    fn snapshot(&self) -> TxnSnapshot {
        TxnSnapshot {
            changesets: self.graph.len(),
            markers: self.store.len(),
            phases: self.graph.phases().to_vec(),
            bookmarks: self.bookmarks.clone(),
            working: self.working.clone(),
            evolve_state: self.evolve_state.clone(),
        }
    }

    fn rollback(&mut self, snapshot: TxnSnapshot) {
        self.graph.truncate(snapshot.changesets);
        self.graph.restore_phases(&snapshot.phases);
        self.store.truncate(snapshot.markers);
        self.bookmarks = snapshot.bookmarks;
        self.working = snapshot.working;
        self.evolve_state = snapshot.evolve_state;
        self.invalidate();
    }
}
