use std::collections::BTreeMap;

use tracing::info;

use crate::obsolete::Relation;
use crate::repo::Repo;
use crate::rewrite::{rewrite, CommitOptions};
use crate::storage::{ChangesetDelta, FileEntry};
use crate::types::{EvolveError, NodeId, Result};

/// Folds `files` into the working parent and obsoletes it by the result.
///
/// `None` entries remove the path. The amended changeset keeps the parents,
/// phase and (unless overridden in `opts`) metadata of the original.
/// Descendants of the original become unstable; `evolve` fixes them.
pub fn amend(
    repo: &mut Repo,
    files: BTreeMap<String, Option<FileEntry>>,
    opts: &CommitOptions,
) -> Result<NodeId> {
    if repo.working_parents().len() > 1 {
        return Err(EvolveError::InvalidArgument(
            "cannot amend while merging".into(),
        ));
    }
    let old = repo
        .working_parent()
        .ok_or_else(|| EvolveError::InvalidArgument("nothing to amend".into()))?;
    let phase = repo.phase(old)?;
    if !phase.is_mutable() {
        return Err(EvolveError::ImmutableChangeset {
            node: old,
            action: "amend",
        });
    }

    repo.transaction("amend", |repo| {
        let old_cs = repo.changeset(old)?.clone();
        let mut head = old_cs.manifest.clone();
        for (path, entry) in &files {
            match entry {
                Some(entry) => head.insert(path.clone(), entry.clone()),
                None => {
                    head.remove(path);
                }
            }
        }
        let parents = [
            old_cs.p1().unwrap_or(NodeId::NULL),
            old_cs.p2().unwrap_or(NodeId::NULL),
        ];
        let delta = ChangesetDelta::new(files.keys().cloned());
        let (new, _) = rewrite(repo, old, &[delta], &head, parents, opts)?;
        if new == old {
            info!(node = %old, "evolve.amend.unchanged");
            return Ok(old);
        }
        repo.create_markers(vec![Relation::new(old, [new])])?;
        repo.retract_boundary(phase, &[new]);
        repo.set_working_parents(&[new])?;
        info!(old = %old, new = %new, "evolve.amend.completed");
        Ok(new)
    })
}
