use serde::Serialize;
use tracing::{info, warn};

use crate::repo::Repo;
use crate::types::{EvolveError, NodeId, Phase, Result};

/// Hint attached to rejected pushes by [`PushHint`].
pub const PUSH_HINT: &str = "use 'evolve' to get a stable history or --force to ignore warnings";

/// What a push published.
#[derive(Clone, Debug, Default, Serialize)]
pub struct PushReport {
    /// Changesets that became public.
    pub published: usize,
}

/// Sends changesets to a remote.
pub trait Push {
    /// Pushes `heads` and their ancestors.
    fn push(&self, repo: &mut Repo, heads: &[NodeId], force: bool) -> Result<PushReport>;
}

/// Local stand-in for a remote: pushing publishes the outgoing changesets.
///
/// Outgoing obsolete or troubled changesets are refused unless forced.
#[derive(Clone, Copy, Debug, Default)]
pub struct PublishPush;

impl Push for PublishPush {
    fn push(&self, repo: &mut Repo, heads: &[NodeId], force: bool) -> Result<PushReport> {
        let outgoing: Vec<NodeId> = repo
            .graph()
            .ancestors(heads.iter().copied())
            .into_iter()
            .filter(|node| matches!(repo.phase(*node), Ok(p) if p.is_mutable()))
            .collect();
        let outgoing = repo.graph().sort_by_rev(outgoing);
        if !force {
            let troubles = repo.troubles();
            for node in &outgoing {
                if troubles.obsolete.contains(node) {
                    return Err(rejected(*node, "obsolete"));
                }
                if let Some(kind) = troubles.classify(*node).into_iter().next() {
                    return Err(rejected(*node, kind.as_str()));
                }
            }
        }
        let published =
            repo.transaction("push", |repo| Ok(repo.advance_boundary(Phase::Public, heads)))?;
        info!(heads = heads.len(), published, force, "evolve.push.published");
        Ok(PushReport { published })
    }
}

fn rejected(node: NodeId, reason: &'static str) -> EvolveError {
    warn!(node = %node, reason, "evolve.push.rejected");
    EvolveError::PushRejected {
        node,
        reason,
        hint: None,
    }
}

/// Decorates a [`Push`] so rejections carry [`PUSH_HINT`].
#[derive(Clone, Debug, Default)]
pub struct PushHint<P> {
    inner: P,
}

impl<P: Push> PushHint<P> {
    /// Wraps `inner`.
    pub fn new(inner: P) -> Self {
        Self { inner }
    }
}

impl<P: Push> Push for PushHint<P> {
    fn push(&self, repo: &mut Repo, heads: &[NodeId], force: bool) -> Result<PushReport> {
        self.inner.push(repo, heads, force).map_err(|err| match err {
            EvolveError::PushRejected {
                node,
                reason,
                hint: None,
            } => EvolveError::PushRejected {
                node,
                reason,
                hint: Some(PUSH_HINT.to_string()),
            },
            other => other,
        })
    }
}
