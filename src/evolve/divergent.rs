use std::cmp::Reverse;

use tracing::{info, warn};

use crate::evolve::plan::{FixPlan, FixRecord};
use crate::obsolete::{Relation, TroubleKind};
use crate::repo::Repo;
use crate::rewrite::{merge_manifests, rewrite, CommitOptions};
use crate::storage::ChangesetDelta;
use crate::types::{EvolveError, NodeId, Phase, Result};

/// Common precursor and competing successor set of a divergent changeset.
///
/// Direct precursors are tried from the most recent; the first one with a
/// non-empty successor set that does not contain `node` wins.
pub fn divergent_data(repo: &Repo, node: NodeId) -> Result<(NodeId, Vec<NodeId>)> {
    let mut bases = repo.precursors(&[node]);
    bases.sort_by_key(|base| Reverse(repo.graph().rev(*base)));
    for base in bases {
        let newer = repo
            .successor_sets(base)
            .into_iter()
            .find(|set| !set.is_empty() && !set.contains(&node));
        if let Some(others) = newer {
            return Ok((base, others));
        }
    }
    Err(EvolveError::DivergentBaseNotFound(node))
}

/// Checks whether a divergent changeset can be merged with its rival.
pub(crate) fn plan(repo: &Repo, node: NodeId) -> Result<FixPlan> {
    let (base, others) = divergent_data(repo, node)?;
    if others.len() > 1 {
        return Err(EvolveError::UnsupportedSplitDivergence {
            divergent: node,
            others,
        });
    }
    let other = others[0];
    if repo.phase(node)? == Phase::Public {
        return Err(EvolveError::ImmutableConflict {
            divergent: node,
            other,
        });
    }
    let other_cs = repo.changeset(other)?;
    if other_cs.is_merge() {
        return Err(EvolveError::UnsupportedMergeRewrite(other));
    }
    let divergent_cs = repo.changeset(node)?;
    let shares_base = other_cs
        .p1()
        .map_or(divergent_cs.parents.is_empty(), |p1| divergent_cs.parents.contains(&p1));
    if !shares_base {
        return Err(EvolveError::UnrelatedDivergence {
            divergent: node,
            other,
        });
    }
    Ok(FixPlan::Merge { node, other, base })
}

/// Merges `other` into `node` using `base` as ancestor, amends `node` with
/// the result and marks `other` as replaced by it.
///
/// Any conflict aborts without writing anything; there is no resumable
/// state for this fix.
pub(crate) fn solve(repo: &mut Repo, node: NodeId, other: NodeId, base: NodeId) -> Result<FixRecord> {
    let local = repo.changeset(node)?.clone();
    let other_manifest = repo.changeset(other)?.manifest.clone();
    let base_manifest = repo.changeset(base)?.manifest.clone();
    let merged = merge_manifests(&local.manifest, &other_manifest, &base_manifest);
    if !merged.is_clean() {
        warn!(node = %node, other = %other, conflicts = merged.conflicts.len(), "evolve.divergent.conflict");
        return Err(EvolveError::MergeConflict {
            node,
            paths: merged.conflicted_paths(),
            resumable: false,
        });
    }

    repo.transaction("stabilize-divergent", |repo| {
        let delta = ChangesetDelta::between(&local.manifest, &merged.manifest);
        let parents = [
            local.p1().unwrap_or(NodeId::NULL),
            local.p2().unwrap_or(NodeId::NULL),
        ];
        let (new, created) = rewrite(
            repo,
            node,
            &[delta],
            &merged.manifest,
            parents,
            &CommitOptions::default(),
        )?;
        if new != node {
            repo.create_markers(vec![Relation::new(node, [new])])?;
        }
        if new != other {
            repo.create_markers(vec![Relation::new(other, [new])])?;
        }
        let other_phase = repo.phase(other)?;
        repo.retract_boundary(other_phase, &[new]);
        repo.set_working_parents(&[new])?;
        info!(node = %node, other = %other, new = %new, created, "evolve.divergent.merged");
        Ok(FixRecord {
            kind: TroubleKind::Divergent,
            node,
            result: Some(new),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::{CommitRequest, RepoOptions};

    #[test]
    fn public_divergent_changeset_is_an_immutable_conflict() {
        let mut repo = Repo::in_memory(RepoOptions::default().username("tester"));
        let base = repo.commit(CommitRequest::new("base").write("a", "0")).unwrap();
        let c1 = repo.commit(CommitRequest::new("c1").write("a", "1")).unwrap();
        repo.update(base, None).unwrap();
        let t1 = repo
            .commit(CommitRequest::new("t1").write("a", "2").obsoletes(c1))
            .unwrap();
        repo.update(base, None).unwrap();
        let t2 = repo
            .commit(CommitRequest::new("t2").write("a", "3").obsoletes(c1))
            .unwrap();
        assert_eq!(divergent_data(&repo, t1).unwrap(), (c1, vec![t2]));

        repo.advance_boundary(Phase::Public, &[t1]);
        let err = plan(&repo, t1).unwrap_err();
        assert!(matches!(
            err,
            EvolveError::ImmutableConflict { divergent, other } if divergent == t1 && other == t2
        ));
        assert!(err.hint().unwrap().contains("is public"));
        assert!(matches!(plan(&repo, t2), Ok(FixPlan::Merge { node, other, base: b })
            if node == t2 && other == t1 && b == c1));
    }
}
