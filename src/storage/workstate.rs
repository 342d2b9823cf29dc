use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::storage::changeset::{FileEntry, Manifest};
use crate::types::{EvolveError, NodeId, Result};

/// Parents of the working copy.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingState {
    /// Zero (empty repository), one or two parents.
    pub parents: Vec<NodeId>,
}

impl WorkingState {
    /// First parent, or the null sentinel.
    pub fn p1(&self) -> NodeId {
        self.parents.first().copied().unwrap_or(NodeId::NULL)
    }

    /// Replaces the parents; null entries are dropped.
    pub fn set_parents(&mut self, parents: &[NodeId]) {
        self.parents = parents.iter().copied().filter(|p| !p.is_null()).collect();
    }
}

/// Both sides of one conflicted path. `None` means the side deleted it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictSides {
    /// Version on the destination side.
    pub local: Option<FileEntry>,
    /// Version on the relocated side.
    pub other: Option<FileEntry>,
}

/// How the user settled one conflicted path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// Keep the destination's version.
    Local,
    /// Keep the relocated changeset's version.
    Other,
    /// Use explicit content.
    Content(FileEntry),
    /// Drop the path.
    Remove,
}

/// Which fix was interrupted.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvolveKind {
    /// Relocation of an unstable changeset.
    Unstable,
    /// Preliminary relocation of a bumped changeset.
    Bumped,
}

/// Persisted record of a relocation interrupted by merge conflicts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvolveState {
    /// Fix that was running.
    pub kind: EvolveKind,
    /// Changeset being relocated.
    pub source: NodeId,
    /// Changeset it is relocated onto.
    pub destination: NodeId,
    /// Merge result; conflicted paths hold the destination's version until resolved.
    pub merged: Manifest,
    /// Conflicted paths still waiting for a resolution.
    pub unresolved: BTreeMap<String, ConflictSides>,
    /// Paths already resolved by the user.
    #[serde(default)]
    pub resolved: Vec<String>,
}

impl EvolveState {
    /// Settles one conflicted path.
    pub fn resolve(&mut self, path: &str, resolution: Resolution) -> Result<()> {
        let sides = self.unresolved.remove(path).ok_or_else(|| {
            EvolveError::InvalidArgument(format!("{path} is not an unresolved path"))
        })?;
        let entry = match resolution {
            Resolution::Local => sides.local,
            Resolution::Other => sides.other,
            Resolution::Content(entry) => Some(entry),
            Resolution::Remove => None,
        };
        match entry {
            Some(entry) => self.merged.insert(path, entry),
            None => {
                self.merged.remove(path);
            }
        }
        self.resolved.push(path.to_string());
        Ok(())
    }

    /// Whether every conflict has been settled.
    pub fn is_resolved(&self) -> bool {
        self.unresolved.is_empty()
    }
}
