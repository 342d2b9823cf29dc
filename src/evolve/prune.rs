use rustc_hash::FxHashSet;
use serde::Serialize;
use tracing::info;

use crate::obsolete::Relation;
use crate::repo::Repo;
use crate::types::{EvolveError, NodeId, Result};

/// How [`prune`] links precursors to successors.
#[derive(Clone, Debug, Default)]
pub struct PruneOptions {
    /// Replacements; empty prunes without successor.
    pub successors: Vec<NodeId>,
    /// Pair the i-th precursor with the i-th successor.
    pub bijective: bool,
    /// Also prune what only this bookmark reaches, then delete it.
    pub bookmark: Option<String>,
}

/// What [`prune`] did.
#[derive(Clone, Debug, Default, Serialize)]
pub struct PruneReport {
    /// Obsoleted changesets, by revision.
    pub pruned: Vec<NodeId>,
    /// New markers.
    pub markers: usize,
    /// Working parent after the operation, when it moved.
    pub moved_to: Option<NodeId>,
    /// Bookmark deleted by bookmark mode.
    pub deleted_bookmark: Option<String>,
}

impl PruneReport {
    /// Number of pruned changesets.
    pub fn count(&self) -> usize {
        self.pruned.len()
    }
}

/// Marks `nodes` obsolete, optionally replaced by `opts.successors`.
///
/// Without `bijective` every precursor gets the whole successor list, which
/// is refused when both lists hold several nodes. With `bijective` the
/// lists are paired by revision order and must have the same length. Both
/// checks run before any marker is written. Afterwards the working copy
/// leaves pruned changesets for their closest living ancestor (or the
/// single successor), and bookmarks on pruned changesets move to their
/// closest living ancestor.
pub fn prune(repo: &mut Repo, nodes: &[NodeId], opts: &PruneOptions) -> Result<PruneReport> {
    repo.transaction("prune", |repo| {
        let mut report = PruneReport::default();
        let mut targets: Vec<NodeId> = nodes.to_vec();
        if let Some(mark) = opts.bookmark.as_deref() {
            targets.extend(reachable_from_bookmark(repo, mark)?);
        }
        let precs = repo.graph().sort_by_rev(targets);
        if precs.is_empty() {
            if let Some(mark) = opts.bookmark.as_deref() {
                repo.delete_bookmark(mark)?;
                report.deleted_bookmark = Some(mark.to_string());
                return Ok(report);
            }
            return Err(EvolveError::NothingToPrune);
        }
        for prec in &precs {
            if !repo.phase(*prec)?.is_mutable() {
                return Err(EvolveError::ImmutableChangeset {
                    node: *prec,
                    action: "prune",
                });
            }
        }
        for succ in &opts.successors {
            repo.changeset(*succ)?;
        }
        let sucs = repo.graph().sort_by_rev(opts.successors.iter().copied());
        if !opts.bijective && sucs.len() > 1 && precs.len() > 1 {
            return Err(EvolveError::PruneFanOut);
        }
        if opts.bijective && sucs.len() != precs.len() {
            return Err(EvolveError::PruneArity {
                precursors: precs.len(),
                successors: sucs.len(),
            });
        }

        let relations: Vec<Relation> = if opts.bijective {
            precs
                .iter()
                .zip(&sucs)
                .map(|(prec, succ)| Relation::new(*prec, [*succ]))
                .collect()
        } else {
            precs
                .iter()
                .map(|prec| Relation::new(*prec, sucs.iter().copied()))
                .collect()
        };
        report.markers = repo.create_markers(relations)?;

        if let Some(wdp) = repo.working_parent() {
            let mut dest = if sucs.len() == 1 && precs.len() == 1 && precs[0] == wdp {
                Some(sucs[0])
            } else {
                Some(wdp)
            };
            while let Some(node) = dest.filter(|n| repo.is_obsolete(*n)) {
                dest = repo.changeset(node)?.p1();
            }
            if dest != Some(wdp) {
                repo.set_working_parents(dest.as_slice())?;
                report.moved_to = dest;
            }
        }

        if let Some(mark) = opts.bookmark.as_deref() {
            repo.delete_bookmark(mark)?;
            report.deleted_bookmark = Some(mark.to_string());
        }
        for prec in &precs {
            if repo.bookmarks().pointing_at(*prec).is_empty() {
                continue;
            }
            let living: Vec<NodeId> = repo
                .graph()
                .ancestors([*prec])
                .into_iter()
                .filter(|n| !repo.is_obsolete(*n))
                .collect();
            if let Some(dest) = repo.graph().sort_by_rev(living).last().copied() {
                repo.move_bookmarks(*prec, dest);
            }
        }

        info!(pruned = precs.len(), markers = report.markers, "evolve.prune.completed");
        report.pruned = precs;
        Ok(report)
    })
}

/// Mutable, living changesets reachable only from bookmark `mark`.
///
/// Nothing is reachable when another bookmark points at the same changeset.
fn reachable_from_bookmark(repo: &Repo, mark: &str) -> Result<Vec<NodeId>> {
    let target = repo
        .bookmarks()
        .get(mark)
        .ok_or_else(|| EvolveError::InvalidArgument(format!("bookmark '{mark}' not found")))?;
    let shared = repo
        .bookmarks()
        .iter()
        .any(|(name, node)| name != mark && node == target);
    if shared {
        return Ok(Vec::new());
    }
    let troubles = repo.troubles();
    let graph = repo.graph();
    let visible_heads = graph.iter().map(|cs| cs.id).filter(|id| {
        !troubles.extinct.contains(id)
            && graph
                .children(*id)
                .map(|children| children.iter().all(|c| troubles.extinct.contains(c)))
                .unwrap_or(true)
    });
    let others: Vec<NodeId> = visible_heads
        .chain(repo.bookmarks().iter().filter(|(name, _)| *name != mark).map(|(_, n)| n))
        .filter(|n| *n != target)
        .collect();
    let excluded: FxHashSet<NodeId> = graph.ancestors(others);
    Ok(graph
        .ancestors([target])
        .into_iter()
        .filter(|n| {
            !excluded.contains(n)
                && !troubles.obsolete.contains(n)
                && matches!(repo.phase(*n), Ok(p) if p.is_mutable())
        })
        .collect())
}
