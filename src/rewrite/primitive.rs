use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;

use tracing::{debug, info};

use crate::repo::Repo;
use crate::storage::{ChangesetDelta, ChangesetSpec, Manifest};
use crate::types::{EvolveError, NodeId, Phase, Result, Timestamp};

/// Metadata overrides for a rewritten changeset. Unset fields fall back to
/// the old changeset's values.
#[derive(Clone, Debug, Default)]
pub struct CommitOptions {
    /// New message.
    pub message: Option<String>,
    /// File to read the new message from; exclusive with `message`.
    pub logfile: Option<PathBuf>,
    /// New author.
    pub user: Option<String>,
    /// New date.
    pub date: Option<Timestamp>,
    /// Extra fields merged over the old ones.
    pub extra: BTreeMap<String, String>,
}

impl CommitOptions {
    /// Options with a new message.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    /// The message requested by `message` or `logfile`, if any.
    ///
    /// Empty values count as unset.
    pub fn resolve_message(&self) -> Result<Option<String>> {
        let message = self.message.as_ref().filter(|m| !m.is_empty());
        let logfile = self
            .logfile
            .as_ref()
            .filter(|p| !p.as_os_str().is_empty());
        match (message, logfile) {
            (Some(_), Some(_)) => Err(EvolveError::ConflictingOptions("--message and --logfile")),
            (Some(message), None) => Ok(Some(message.clone())),
            (None, Some(path)) => Ok(Some(fs::read_to_string(path)?)),
            (None, None) => Ok(None),
        }
    }
}

/// Recreates `old` on `new_parents` with the content of `head` for every
/// path touched by `old` or by one of `updates`.
///
/// Paths whose content in `head` is identical to `old`'s first parent are
/// not recorded as changed, and copy sources are recomputed against that
/// parent so a rename back to the original path disappears. Bookmarks on
/// `old` follow the new changeset. Returns `(node, created)`; when an
/// identical changeset already exists it is returned with `created = false`.
///
/// No marker is recorded and `old`'s phase is not checked: callers decide
/// whether the old changeset becomes obsolete.
pub fn rewrite(
    repo: &mut Repo,
    old: NodeId,
    updates: &[ChangesetDelta],
    head: &Manifest,
    new_parents: [NodeId; 2],
    opts: &CommitOptions,
) -> Result<(NodeId, bool)> {
    let message = opts.resolve_message()?;
    let old_cs = repo.changeset(old)?.clone();
    if old_cs.is_merge() {
        return Err(EvolveError::UnsupportedMergeRewrite(old));
    }
    let phase = repo.phase(old)?;
    let base = match old_cs.p1() {
        Some(p1) => repo.changeset(p1)?.manifest.clone(),
        None => Manifest::new(),
    };

    let mut touched: BTreeSet<String> = old_cs.files.iter().cloned().collect();
    for delta in updates {
        touched.extend(delta.files.iter().cloned());
    }
    let copies = head.copies_from(&base);

    let mut extra = old_cs.extra.clone();
    extra.extend(opts.extra.clone());
    let mut spec = ChangesetSpec::new(
        new_parents,
        opts.user.clone().unwrap_or_else(|| old_cs.user.clone()),
        message.unwrap_or_else(|| old_cs.message.clone()),
    )
    .date(opts.date.unwrap_or(old_cs.date));
    spec.extra = extra;

    let mut skipped = 0usize;
    for path in touched {
        match (head.get(&path), base.get(&path)) {
            (Some(new), Some(prev)) if new.same_content(prev) => skipped += 1,
            (None, None) => skipped += 1,
            (Some(new), _) => {
                let mut entry = new.clone();
                entry.copied_from = copies.get(&path).cloned();
                spec.files.insert(path, Some(entry));
            }
            (None, Some(_)) => {
                spec.files.insert(path, None);
            }
        }
    }
    debug!(
        old = %old,
        files = spec.files.len(),
        skipped,
        "rewrite.commit.files"
    );

    let (new, created) = repo.commit_changeset(spec, phase.max(Phase::Draft))?;
    if new != old {
        repo.move_bookmarks(old, new);
    }
    info!(old = %old, new = %new, created, "rewrite.commit.completed");
    Ok((new, created))
}
