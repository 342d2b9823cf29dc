use tracing::{debug, info};

use crate::evolve::plan::{FixPlan, FixRecord};
use crate::evolve::store_conflict;
use crate::obsolete::TroubleKind;
use crate::repo::Repo;
use crate::rewrite::{try_relocate, Relocation};
use crate::storage::EvolveKind;
use crate::types::{EvolveError, NodeId, Result};

/// Finds where an unstable changeset should move.
///
/// Starts from its obsolete parent and climbs first parents while the
/// successor sets are empty (the parent was pruned). The destination must
/// be a single changeset.
pub(crate) fn plan(repo: &Repo, node: NodeId) -> Result<FixPlan> {
    let cs = repo.changeset(node)?;
    let mut obs = match cs.parents.iter().copied().find(|p| repo.is_obsolete(*p)) {
        Some(parent) => parent,
        None => {
            return Err(EvolveError::InvalidArgument(format!(
                "{node} has no obsolete parent"
            )))
        }
    };
    let mut newer = repo.successor_sets(obs);
    while newer.is_empty() {
        debug!(target_node = %obs, "evolve.unstable.dead_parent");
        obs = repo
            .changeset(obs)?
            .p1()
            .ok_or(EvolveError::NoLivingAncestor(node))?;
        newer = repo.successor_sets(obs);
    }
    if newer.len() > 1 || newer[0].len() > 1 {
        let mut candidates: Vec<NodeId> = newer.into_iter().flatten().collect();
        candidates = repo.graph().sort_by_rev(candidates);
        return Err(EvolveError::AmbiguousDestination { node, candidates });
    }
    Ok(FixPlan::Relocate {
        node,
        onto: newer[0][0],
    })
}

/// Relocates `node` onto `onto`, persisting the merge state on conflict.
pub(crate) fn solve(repo: &mut Repo, node: NodeId, onto: NodeId) -> Result<FixRecord> {
    info!(node = %node, onto = %onto, "evolve.unstable.relocate");
    let result = match try_relocate(repo, node, onto)? {
        Relocation::Moved(new) => Some(new),
        Relocation::Absorbed => None,
        Relocation::Conflicted(pending) => {
            return Err(store_conflict(repo, EvolveKind::Unstable, *pending))
        }
    };
    Ok(FixRecord {
        kind: TroubleKind::Unstable,
        node,
        result,
    })
}
