#![forbid(unsafe_code)]

//! Obsolescence markers and everything derived from them.
//!
//! The [`ObsStore`] owns the append-only marker set and its dual index.
//! [`Traversal`] answers precursor/successor closure and successor-set
//! queries, and [`TroubleSets`] classifies changesets as obsolete,
//! unstable, suspended, extinct, bumped or divergent.

pub mod codec;
mod marker;
mod store;
mod traversal;
mod troubles;

pub use marker::{Marker, MarkerFlags, Relation};
pub use store::ObsStore;
pub use traversal::{SuccessorSetCache, Traversal};
pub use troubles::{ObsoleteStatus, TroubleKind, TroubleSets};
