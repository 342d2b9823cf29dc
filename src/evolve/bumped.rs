use tracing::info;

use crate::evolve::plan::{FixPlan, FixRecord};
use crate::evolve::store_conflict;
use crate::obsolete::{MarkerFlags, Relation, TroubleKind};
use crate::repo::Repo;
use crate::rewrite::{try_relocate, Relocation};
use crate::storage::{ChangesetDelta, ChangesetSpec, EvolveKind};
use crate::types::{EvolveError, NodeId, Phase, Result};

/// Finds the public precursor a bumped changeset has to be recreated on.
///
/// The most recent public changeset among its transitive precursors wins.
/// Merges on either side are refused.
pub(crate) fn plan(repo: &Repo, node: NodeId) -> Result<FixPlan> {
    let bumped = repo.changeset(node)?;
    if bumped.is_merge() {
        return Err(EvolveError::UnsupportedMergeRewrite(node));
    }
    let precursor = repo
        .all_precursors(&[node])
        .into_iter()
        .filter(|prec| matches!(repo.phase(*prec), Ok(Phase::Public)))
        .last()
        .ok_or(EvolveError::BumpedPrecursorNotFound(node))?;
    let prec = repo.changeset(precursor)?;
    if prec.is_merge() {
        return Err(EvolveError::UnsupportedMergeRewrite(precursor));
    }
    // Two root changesets share the null base.
    let shares_parent = match (bumped.p1(), prec.p1()) {
        (None, None) => true,
        _ => bumped.parents.iter().any(|p| prec.parents.contains(p)),
    };
    Ok(FixPlan::Recreate {
        node,
        precursor,
        rebase_first: !shares_parent,
    })
}

/// Commits the bumped changeset's content as a child of its public precursor.
///
/// When the two do not share a parent, the bumped changeset is first
/// relocated onto the precursor's parent; that relocation is committed on
/// its own and survives a later failure. The replacement marker carries
/// [`MarkerFlags::BUMPED_FIX`]. If nothing differs from the precursor, the
/// bumped changeset is pruned and the working copy moves to the precursor.
pub(crate) fn solve(
    repo: &mut Repo,
    node: NodeId,
    precursor: NodeId,
    rebase_first: bool,
) -> Result<FixRecord> {
    let mut tmp = node;
    if rebase_first {
        let dest = repo
            .changeset(precursor)?
            .p1()
            .ok_or(EvolveError::BumpedPrecursorNotFound(node))?;
        info!(node = %node, dest = %dest, "evolve.bumped.rebase");
        match try_relocate(repo, node, dest)? {
            Relocation::Moved(new) => tmp = new,
            Relocation::Absorbed => {}
            Relocation::Conflicted(pending) => {
                return Err(store_conflict(repo, EvolveKind::Bumped, *pending))
            }
        }
    }

    repo.transaction("bumped-stabilize", |repo| {
        let bumped_phase = repo.phase(node)?;
        let source = repo.changeset(tmp)?.clone();
        let prec_manifest = repo.changeset(precursor)?.manifest.clone();
        let delta = ChangesetDelta::between(&prec_manifest, &source.manifest);
        let copies = source.manifest.copies_from(&prec_manifest);

        let newid = if delta.files.is_empty() {
            repo.create_markers(vec![Relation::prune(tmp)])?;
            precursor
        } else {
            let message = format!(
                "bumped update to {}:\n\n{}",
                precursor.short(),
                source.message
            );
            let mut spec = ChangesetSpec::new([precursor, NodeId::NULL], source.user, message)
                .date(source.date);
            spec.extra = source.extra;
            for path in delta.files {
                let entry = source.manifest.get(&path).cloned().map(|mut entry| {
                    entry.copied_from = copies.get(&path).cloned();
                    entry
                });
                spec.files.insert(path, entry);
            }
            let (newid, _) = repo.commit_changeset(spec, bumped_phase)?;
            repo.retract_boundary(bumped_phase, &[newid]);
            repo.create_markers(vec![
                Relation::new(tmp, [newid]).flags(MarkerFlags::BUMPED_FIX)
            ])?;
            newid
        };
        repo.move_bookmarks(node, newid);
        repo.move_bookmarks(tmp, newid);
        repo.set_working_parents(&[newid])?;
        info!(node = %node, precursor = %precursor, new = %newid, "evolve.bumped.recreated");
        Ok(FixRecord {
            kind: TroubleKind::Bumped,
            node,
            result: Some(newid),
        })
    })
}
