use serde::Serialize;
use tracing::info;

use crate::evolve::engine::ExitStatus;
use crate::repo::Repo;
use crate::types::{EvolveError, NodeId, Result};

/// Outcome of [`previous`] or [`next`].
#[derive(Clone, Debug, Serialize)]
pub struct Navigation {
    /// Exit status.
    pub status: ExitStatus,
    /// New working parent when the move happened.
    pub moved_to: Option<NodeId>,
    /// Choices offered when several changesets qualified.
    pub candidates: Vec<NodeId>,
}

/// Moves the working copy to the parent of the working parent.
pub fn previous(repo: &mut Repo) -> Result<Navigation> {
    let wdp = current(repo)?;
    let parents: Vec<NodeId> = repo.graph().parents(wdp)?.to_vec();
    step(repo, wdp, parents, "no parent to move to")
}

/// Moves the working copy to the non-obsolete child of the working parent.
pub fn next(repo: &mut Repo) -> Result<Navigation> {
    let wdp = current(repo)?;
    let children: Vec<NodeId> = repo
        .graph()
        .children(wdp)?
        .into_iter()
        .filter(|child| !repo.is_obsolete(*child))
        .collect();
    step(repo, wdp, children, "no children to move to")
}

fn current(repo: &Repo) -> Result<NodeId> {
    if repo.working_parents().len() > 1 {
        return Err(EvolveError::InvalidArgument(
            "merge in progress, cannot move".into(),
        ));
    }
    repo.working_parent()
        .ok_or_else(|| EvolveError::InvalidArgument("working copy has no parent".into()))
}

fn step(repo: &mut Repo, from: NodeId, candidates: Vec<NodeId>, none: &str) -> Result<Navigation> {
    match candidates.as_slice() {
        [] => {
            info!(from = %from, reason = none, "evolve.navigate.stuck");
            Ok(Navigation {
                status: ExitStatus::NothingToDo,
                moved_to: None,
                candidates,
            })
        }
        [target] => {
            let target = *target;
            repo.transaction("navigate", |repo| {
                let active = repo.bookmarks().active().map(str::to_string);
                match active {
                    Some(mark) if repo.bookmarks().get(&mark) == Some(from) => {
                        repo.set_bookmark(&mark, target)?;
                        repo.update(target, Some(&mark))
                    }
                    _ => repo.update(target, None),
                }
            })?;
            info!(from = %from, to = %target, "evolve.navigate.moved");
            Ok(Navigation {
                status: ExitStatus::Ok,
                moved_to: Some(target),
                candidates: Vec::new(),
            })
        }
        _ => Ok(Navigation {
            status: ExitStatus::NeedsUserChoice,
            moved_to: None,
            candidates: repo.graph().sort_by_rev(candidates),
        }),
    }
}
