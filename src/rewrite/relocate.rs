use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::obsolete::Relation;
use crate::repo::Repo;
use crate::rewrite::merge::merge_manifests;
use crate::storage::{ChangesetDelta, ChangesetSpec, ConflictSides, Manifest};
use crate::types::{EvolveError, NodeId, Result};

/// Outcome of moving a changeset onto a new parent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Relocation {
    /// A new changeset was created on the destination.
    Moved(NodeId),
    /// The destination already contained every change; the original was pruned.
    Absorbed,
    /// The merge left conflicts; nothing was written.
    Conflicted(Box<PendingMerge>),
}

/// Merge state of a relocation that hit conflicts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingMerge {
    /// Changeset being relocated.
    pub source: NodeId,
    /// Destination.
    pub destination: NodeId,
    /// Merge result, conflicted paths holding the destination's version.
    pub merged: Manifest,
    /// Conflicted paths.
    pub conflicts: BTreeMap<String, ConflictSides>,
}

/// Moves `orig` onto `dest`, failing with `MergeConflict` when the merge
/// does not apply cleanly.
///
/// Returns the new changeset, or `None` when `dest` already contained the
/// whole change.
pub fn relocate(repo: &mut Repo, orig: NodeId, dest: NodeId) -> Result<Option<NodeId>> {
    match try_relocate(repo, orig, dest)? {
        Relocation::Moved(node) => Ok(Some(node)),
        Relocation::Absorbed => Ok(None),
        Relocation::Conflicted(pending) => Err(EvolveError::MergeConflict {
            node: orig,
            paths: pending.conflicts.keys().cloned().collect(),
            resumable: false,
        }),
    }
}

/// Moves `orig` onto `dest`, reporting conflicts as a value so the caller
/// can persist them.
///
/// The changes of `orig` relative to its first parent are merged into
/// `dest`. On success `orig` is marked obsolete (by the new changeset, or
/// pruned when nothing was left to commit), its bookmarks follow, and the
/// working copy moves to the result.
pub fn try_relocate(repo: &mut Repo, orig: NodeId, dest: NodeId) -> Result<Relocation> {
    if orig == dest {
        return Err(EvolveError::SelfRelocation(orig));
    }
    let orig_cs = repo.changeset(orig)?.clone();
    if orig_cs.is_merge() {
        return Err(EvolveError::UnsupportedMergeRelocation(orig));
    }
    let dest_manifest = repo.changeset(dest)?.manifest.clone();
    let ancestor = match orig_cs.p1() {
        Some(p1) => repo.changeset(p1)?.manifest.clone(),
        None => Manifest::new(),
    };
    let merged = merge_manifests(&dest_manifest, &orig_cs.manifest, &ancestor);
    if !merged.is_clean() {
        warn!(
            orig = %orig,
            dest = %dest,
            conflicts = merged.conflicts.len(),
            "rewrite.relocate.conflict"
        );
        return Ok(Relocation::Conflicted(Box::new(PendingMerge {
            source: orig,
            destination: dest,
            merged: merged.manifest,
            conflicts: merged.conflicts,
        })));
    }
    let outcome = conclude(repo, orig, dest, &merged.manifest)?;
    Ok(outcome)
}

/// Commits `merged` on `dest` with `orig`'s metadata and records the
/// relocation. Shared by a clean relocation and `evolve --continue`.
pub(crate) fn conclude(
    repo: &mut Repo,
    orig: NodeId,
    dest: NodeId,
    merged: &Manifest,
) -> Result<Relocation> {
    repo.transaction("relocate", |repo| {
        let orig_cs = repo.changeset(orig)?.clone();
        let orig_phase = repo.phase(orig)?;
        let dest_manifest = repo.changeset(dest)?.manifest.clone();
        let delta = ChangesetDelta::between(&dest_manifest, merged);
        if delta.files.is_empty() {
            repo.create_markers(vec![Relation::prune(orig)])?;
            repo.move_bookmarks(orig, dest);
            repo.set_working_parents(&[dest])?;
            info!(orig = %orig, dest = %dest, "rewrite.relocate.absorbed");
            return Ok(Relocation::Absorbed);
        }
        let mut spec = ChangesetSpec::new([dest, NodeId::NULL], orig_cs.user, orig_cs.message)
            .date(orig_cs.date);
        spec.extra = orig_cs.extra;
        for path in delta.files {
            let entry = merged.get(&path).cloned();
            spec.files.insert(path, entry);
        }
        let (new, _) = repo.commit_changeset(spec, orig_phase)?;
        if new != orig {
            repo.retract_boundary(orig_phase, &[new]);
            repo.create_markers(vec![Relation::new(orig, [new])])?;
            repo.move_bookmarks(orig, new);
        }
        repo.set_working_parents(&[new])?;
        info!(orig = %orig, dest = %dest, new = %new, "rewrite.relocate.moved");
        Ok(Relocation::Moved(new))
    })
}
