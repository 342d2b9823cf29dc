//! In-process history store the obsolescence layer sits on.
//!
//! Holds the changeset DAG with phases, manifests with copy tracking,
//! bookmarks, the working position and the resumable evolve state.

mod changeset;
mod graph;
mod refs;
mod workstate;

pub use changeset::{Changeset, ChangesetDelta, ChangesetSpec, FileEntry, Manifest};
pub use graph::{ChangesetGraph, GraphSnapshot};
pub use refs::Bookmarks;
pub use workstate::{ConflictSides, EvolveKind, EvolveState, Resolution, WorkingState};
