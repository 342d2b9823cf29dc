//! Obsolescence markers and history stabilization for changeset graphs.
//!
//! A marker records that a changeset was rewritten into successors (or
//! pruned). From the markers the crate derives which changesets are
//! obsolete and which live ones are left in trouble: unstable (an ancestor
//! is obsolete), bumped (a precursor became public) or divergent (several
//! competing successors). The [`evolve`](mod@evolve) engine repairs those
//! troubles one changeset at a time.
//!
//! ```no_run
//! use evolve::{evolve::{evolve, EvolveOptions, NoopReporter}, Repo, RepoOptions};
//!
//! # fn main() -> evolve::Result<()> {
//! let mut repo = Repo::open(".")?;
//! let report = evolve(&mut repo, &EvolveOptions::default(), &mut NoopReporter)?;
//! println!("{} fixes", report.fixes.len());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod admin;
pub mod cli;
pub mod evolve;
pub mod obsolete;
pub mod primitives;
pub mod repo;
pub mod rewrite;
pub mod storage;
pub mod types;

pub use obsolete::{Marker, MarkerFlags, ObsStore, Relation, TroubleKind};
pub use repo::{CommitRequest, Repo, RepoOptions};
pub use types::{EvolveError, NodeId, Phase, Result, Rev, Timestamp};
