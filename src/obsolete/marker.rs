use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::types::{NodeId, Timestamp};

/// Bitset of marker flags.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct MarkerFlags(pub u8);

impl MarkerFlags {
    /// No flag set.
    pub const NONE: MarkerFlags = MarkerFlags(0);
    /// The successor recreates a bumped changeset's content on top of its
    /// public precursor. Traversals ignoring this flag do not walk through
    /// such markers.
    pub const BUMPED_FIX: MarkerFlags = MarkerFlags(1);

    /// Whether any flag in `other` is also set here.
    pub fn intersects(self, other: MarkerFlags) -> bool {
        self.0 & other.0 != 0
    }

    /// Union of both flag sets.
    pub fn union(self, other: MarkerFlags) -> MarkerFlags {
        MarkerFlags(self.0 | other.0)
    }
}

/// One recorded obsolescence relation.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Marker {
    /// Obsoleted changeset.
    pub precursor: NodeId,
    /// Replacements; empty for a prune.
    pub successors: Vec<NodeId>,
    /// Flag bits.
    pub flags: MarkerFlags,
    /// Free-form metadata (`user` is always recorded by the repository).
    pub metadata: BTreeMap<String, String>,
    /// Creation time.
    pub date: Timestamp,
}

impl Marker {
    /// Marker without flags or metadata, dated now.
    pub fn new(precursor: NodeId, successors: Vec<NodeId>) -> Self {
        Self {
            precursor,
            successors,
            flags: MarkerFlags::NONE,
            metadata: BTreeMap::new(),
            date: Timestamp::now(),
        }
    }

    /// Whether the marker records a prune.
    pub fn is_prune(&self) -> bool {
        self.successors.is_empty()
    }

    /// Whether two markers record the same relation, ignoring their dates.
    pub fn same_relation(&self, other: &Marker) -> bool {
        self.precursor == other.precursor
            && self.successors == other.successors
            && self.flags == other.flags
            && self.metadata == other.metadata
    }

    /// Drops every null-sentinel successor. Returns whether any was removed.
    pub(crate) fn strip_null(&mut self) -> bool {
        let before = self.successors.len();
        self.successors.retain(|s| !s.is_null());
        self.successors.len() != before
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> (", self.precursor)?;
        for (i, succ) in self.successors.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{succ}")?;
        }
        f.write_str(")")?;
        if self.flags != MarkerFlags::NONE {
            write!(f, " flags={}", self.flags.0)?;
        }
        Ok(())
    }
}

/// A relation requested through [`crate::Repo::create_markers`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Relation {
    /// Obsoleted changeset.
    pub precursor: NodeId,
    /// Replacements; empty for a prune.
    pub successors: Vec<NodeId>,
    /// Flag bits.
    pub flags: MarkerFlags,
    /// Extra metadata merged over the repository defaults.
    pub metadata: BTreeMap<String, String>,
}

impl Relation {
    /// Plain rewrite or prune relation.
    pub fn new(precursor: NodeId, successors: impl IntoIterator<Item = NodeId>) -> Self {
        Self {
            precursor,
            successors: successors.into_iter().collect(),
            flags: MarkerFlags::NONE,
            metadata: BTreeMap::new(),
        }
    }

    /// Prune relation.
    pub fn prune(precursor: NodeId) -> Self {
        Self::new(precursor, [])
    }

    /// Adds flag bits.
    pub fn flags(mut self, flags: MarkerFlags) -> Self {
        self.flags = self.flags.union(flags);
        self
    }

    /// Adds one metadata entry.
    pub fn meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
