use std::collections::BTreeMap;

use rand::Rng;
use tracing::info;

use crate::obsolete::Relation;
use crate::repo::Repo;
use crate::rewrite::{rewrite, CommitOptions};
use crate::types::{EvolveError, NodeId, Result};

const NOISE_KEY: &str = "__touch-noise__";

/// Recreates each changeset with fresh identity and unchanged content.
///
/// Used to revive pruned changesets. Unless `duplicate` is set the old
/// changesets are marked as replaced, which makes the revived copy
/// divergent when the original already had a successor. Public changesets
/// can only be duplicated. Children in the set follow their touched parent.
pub fn touch(repo: &mut Repo, nodes: &[NodeId], duplicate: bool) -> Result<Vec<NodeId>> {
    let revs = repo.graph().sort_by_rev(nodes.iter().copied());
    if revs.is_empty() {
        return Err(EvolveError::InvalidArgument("nothing to touch".into()));
    }
    if !duplicate {
        for node in &revs {
            if !repo.phase(*node)?.is_mutable() {
                return Err(EvolveError::ImmutableChangeset {
                    node: *node,
                    action: "touch",
                });
            }
        }
    }

    repo.transaction("touch", |repo| {
        let mut rng = rand::thread_rng();
        let mut remapped: BTreeMap<NodeId, NodeId> = BTreeMap::new();
        let mut created = Vec::with_capacity(revs.len());
        for node in &revs {
            let cs = repo.changeset(*node)?.clone();
            let phase = repo.phase(*node)?;
            let remap = |p: Option<NodeId>| {
                p.map(|p| remapped.get(&p).copied().unwrap_or(p))
                    .unwrap_or(NodeId::NULL)
            };
            let parents = [remap(cs.p1()), remap(cs.p2())];
            let mut opts = CommitOptions::default();
            opts.extra
                .insert(NOISE_KEY.to_string(), rng.gen::<u32>().to_string());
            let (new, _) = rewrite(repo, *node, &[], &cs.manifest, parents, &opts)?;
            if !duplicate {
                repo.create_markers(vec![Relation::new(*node, [new])])?;
            }
            repo.retract_boundary(phase, &[new]);
            if repo.working_parent() == Some(*node) {
                repo.set_working_parents(&[new])?;
            }
            remapped.insert(*node, new);
            created.push(new);
        }
        info!(touched = created.len(), duplicate, "evolve.touch.completed");
        Ok(created)
    })
}
