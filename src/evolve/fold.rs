use rustc_hash::FxHashSet;
use tracing::info;

use crate::obsolete::Relation;
use crate::repo::Repo;
use crate::rewrite::{rewrite, CommitOptions};
use crate::storage::ChangesetDelta;
use crate::types::{EvolveError, NodeId, Result};

const MESSAGE_SEPARATOR: &str = "\n\n***\n\n";

/// Combines a contiguous range of changesets into one.
///
/// The set must have a single root and a single head. The result sits on
/// the root's parents with the head's content and the concatenated
/// messages; every folded changeset is marked as replaced by it.
pub fn fold(repo: &mut Repo, nodes: &[NodeId]) -> Result<NodeId> {
    let revs = repo.graph().sort_by_rev(nodes.iter().copied());
    if revs.len() < 2 {
        return Err(EvolveError::InvalidArgument(
            "fold needs at least two changesets".into(),
        ));
    }
    let set: FxHashSet<NodeId> = revs.iter().copied().collect();

    let mut roots = Vec::new();
    let mut heads = Vec::new();
    for node in &revs {
        let parents = repo.graph().parents(*node)?;
        if !parents.iter().any(|p| set.contains(p)) {
            roots.push(*node);
        }
        if !repo.graph().children(*node)?.iter().any(|c| set.contains(c)) {
            heads.push(*node);
        }
    }
    let (root, head) = match (roots.as_slice(), heads.as_slice()) {
        ([root], [head]) => (*root, *head),
        ([_], _) => {
            return Err(EvolveError::InvalidArgument(
                "cannot fold non-linear revisions (multiple heads given)".into(),
            ))
        }
        _ => {
            return Err(EvolveError::InvalidArgument(
                "cannot fold non-linear revisions (multiple roots given)".into(),
            ))
        }
    };
    let mut max_phase = repo.phase(root)?;
    if !max_phase.is_mutable() {
        return Err(EvolveError::ImmutableChangeset {
            node: root,
            action: "fold",
        });
    }
    for node in &revs {
        max_phase = max_phase.max(repo.phase(*node)?);
    }

    repo.transaction("fold", |repo| {
        let mut messages = Vec::with_capacity(revs.len());
        let mut deltas = Vec::with_capacity(revs.len());
        for node in &revs {
            let cs = repo.changeset(*node)?;
            messages.push(cs.message.clone());
            deltas.push(ChangesetDelta::from(cs));
        }
        let head_manifest = repo.changeset(head)?.manifest.clone();
        let root_cs = repo.changeset(root)?.clone();
        let parents = [
            root_cs.p1().unwrap_or(NodeId::NULL),
            root_cs.p2().unwrap_or(NodeId::NULL),
        ];
        let opts = CommitOptions::message(messages.join(MESSAGE_SEPARATOR));
        let (new, _) = rewrite(repo, root, &deltas, &head_manifest, parents, &opts)?;
        repo.retract_boundary(max_phase, &[new]);

        let relations: Vec<Relation> = revs
            .iter()
            .filter(|node| **node != new)
            .map(|node| Relation::new(*node, [new]))
            .collect();
        repo.create_markers(relations)?;
        for node in &revs {
            repo.move_bookmarks(*node, new);
        }
        if repo.working_parent().is_some_and(|wdp| set.contains(&wdp)) {
            repo.set_working_parents(&[new])?;
        }
        info!(folded = revs.len(), new = %new, "evolve.fold.completed");
        Ok(new)
    })
}
