#![forbid(unsafe_code)]

//! Changeset rewriting: file-level three-way merges, the rewrite primitive
//! and relocation of a changeset onto a new parent.

mod merge;
mod primitive;
mod relocate;

pub use merge::{merge_manifests, MergeResult};
pub use primitive::{rewrite, CommitOptions};
pub use relocate::{relocate, try_relocate, PendingMerge, Relocation};

pub(crate) use relocate::conclude as conclude_relocation;
