use serde::Serialize;

use crate::obsolete::TroubleKind;
use crate::repo::Repo;
use crate::types::{NodeId, Phase, Result};

/// One changeset as shown by `log`.
#[derive(Clone, Debug, Serialize)]
pub struct LogEntry {
    /// Local revision number.
    pub rev: u32,
    /// Full node id.
    pub node: NodeId,
    /// Phase name.
    pub phase: Phase,
    /// Parent node ids.
    pub parents: Vec<NodeId>,
    /// Bookmarks on the changeset.
    pub bookmarks: Vec<String>,
    /// Obsolete status keyword.
    pub obsolete: &'static str,
    /// Troubles of the changeset.
    pub troubles: Vec<TroubleKind>,
    /// Whether the working copy sits on it.
    pub working: bool,
    /// First line of the message.
    pub summary: String,
}

impl LogEntry {
    /// `rev:short` label followed by decorations, as printed in text mode.
    pub fn label(&self) -> String {
        let mut out = format!("{}:{}", self.rev, self.node.short());
        if self.working {
            out.push_str(" @");
        }
        out.push_str(&format!(" [{}]", self.phase));
        for mark in &self.bookmarks {
            out.push_str(&format!(" {mark}"));
        }
        if self.obsolete != "stable" {
            out.push_str(&format!(" ({})", self.obsolete));
        }
        out
    }
}

/// Log entries, newest first. Extinct changesets are hidden unless `hidden`.
pub fn log_entries(repo: &Repo, hidden: bool) -> Result<Vec<LogEntry>> {
    let troubles = repo.troubles();
    let working = repo.working_parents();
    let mut entries = Vec::with_capacity(repo.graph().len());
    for cs in repo.graph().iter() {
        if !hidden && troubles.extinct.contains(&cs.id) {
            continue;
        }
        entries.push(LogEntry {
            rev: cs.rev.0,
            node: cs.id,
            phase: repo.phase(cs.id)?,
            parents: cs.parents.clone(),
            bookmarks: repo.bookmarks().pointing_at(cs.id),
            obsolete: troubles.status(cs.id).as_str(),
            troubles: troubles.classify(cs.id).into_iter().collect(),
            working: working.contains(&cs.id),
            summary: cs.summary().to_string(),
        });
    }
    entries.reverse();
    Ok(entries)
}

/// `rev:short summary` for one changeset, or the bare short id when unknown.
pub fn describe(repo: &Repo, node: NodeId) -> String {
    match repo.changeset(node) {
        Ok(cs) => format!("{}:{} \"{}\"", cs.rev, node.short(), cs.summary()),
        Err(_) => node.short(),
    }
}
