use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use crate::primitives::bytes::lp;
use crate::types::{NodeId, Rev, Timestamp};

/// Content and mode of one tracked file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FileEntry {
    /// Raw file content.
    pub data: Vec<u8>,
    /// Executable bit.
    #[serde(default)]
    pub exec: bool,
    /// Symlink flag.
    #[serde(default)]
    pub link: bool,
    /// Path this file was copied or renamed from, if recorded.
    #[serde(default)]
    pub copied_from: Option<String>,
}

impl FileEntry {
    /// Regular, non-executable file.
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            ..Self::default()
        }
    }

    /// Same file recorded as a copy of `source`.
    pub fn copied_from(mut self, source: impl Into<String>) -> Self {
        self.copied_from = Some(source.into());
        self
    }

    /// Byte-identical content and identical mode. Copy metadata is ignored.
    pub fn same_content(&self, other: &FileEntry) -> bool {
        self.data == other.data && self.exec == other.exec && self.link == other.link
    }

    /// Mode flags in the `l`/`x` notation.
    pub fn flags(&self) -> &'static str {
        match (self.link, self.exec) {
            (true, _) => "l",
            (false, true) => "x",
            (false, false) => "",
        }
    }
}

/// Path → file mapping of one changeset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Manifest(BTreeMap<String, FileEntry>);

impl Manifest {
    /// Empty manifest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a path.
    pub fn get(&self, path: &str) -> Option<&FileEntry> {
        self.0.get(path)
    }

    /// Whether `path` is tracked.
    pub fn contains(&self, path: &str) -> bool {
        self.0.contains_key(path)
    }

    /// Adds or replaces a path.
    pub fn insert(&mut self, path: impl Into<String>, entry: FileEntry) {
        self.0.insert(path.into(), entry);
    }

    /// Removes a path.
    pub fn remove(&mut self, path: &str) -> Option<FileEntry> {
        self.0.remove(path)
    }

    /// Iterates entries in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &FileEntry)> {
        self.0.iter()
    }

    /// Number of tracked paths.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Paths whose presence, content or mode differ between the two manifests.
    pub fn diff(&self, other: &Manifest) -> BTreeSet<String> {
        let mut changed = BTreeSet::new();
        for (path, entry) in &self.0 {
            match other.get(path) {
                Some(theirs) if theirs.same_content(entry) => {}
                _ => {
                    changed.insert(path.clone());
                }
            }
        }
        for path in other.0.keys() {
            if !self.contains(path) {
                changed.insert(path.clone());
            }
        }
        changed
    }

    /// Copy sources recorded in `self` relative to `base`, as destination → source.
    ///
    /// A copy whose source equals its destination is a round trip and is
    /// dropped; so is one whose source does not exist in `base`.
    pub fn copies_from(&self, base: &Manifest) -> BTreeMap<String, String> {
        self.0
            .iter()
            .filter_map(|(path, entry)| {
                let source = entry.copied_from.as_ref()?;
                (source != path && base.contains(source)).then(|| (path.clone(), source.clone()))
            })
            .collect()
    }
}

impl FromIterator<(String, FileEntry)> for Manifest {
    fn from_iter<I: IntoIterator<Item = (String, FileEntry)>>(iter: I) -> Self {
        Manifest(iter.into_iter().collect())
    }
}

/// Immutable snapshot node of the history DAG.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Changeset {
    /// Content hash.
    pub id: NodeId,
    /// Local creation sequence number.
    pub rev: Rev,
    /// Zero, one or two parents; the null sentinel is never stored.
    pub parents: Vec<NodeId>,
    /// Full file snapshot.
    pub manifest: Manifest,
    /// Paths touched by this changeset relative to its first parent.
    pub files: Vec<String>,
    /// Author.
    pub user: String,
    /// Commit date.
    pub date: Timestamp,
    /// Commit message.
    pub message: String,
    /// Free-form extra fields.
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl Changeset {
    /// First parent, if any.
    pub fn p1(&self) -> Option<NodeId> {
        self.parents.first().copied()
    }

    /// Second parent, if any.
    pub fn p2(&self) -> Option<NodeId> {
        self.parents.get(1).copied()
    }

    /// Whether this changeset has two parents.
    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    /// First line of the message.
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }
}

impl fmt::Display for Changeset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.rev, self.summary())
    }
}

/// Paths touched by one update applied through the rewrite primitive.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChangesetDelta {
    /// Touched paths.
    pub files: BTreeSet<String>,
}

impl ChangesetDelta {
    /// Delta touching exactly the given paths.
    pub fn new<I, S>(files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            files: files.into_iter().map(Into::into).collect(),
        }
    }

    /// Delta covering every path differing between two manifests.
    pub fn between(from: &Manifest, to: &Manifest) -> Self {
        Self {
            files: from.diff(to),
        }
    }
}

impl From<&Changeset> for ChangesetDelta {
    fn from(cs: &Changeset) -> Self {
        Self::new(cs.files.iter().cloned())
    }
}

/// Request handed to the graph's commit machinery.
#[derive(Clone, Debug)]
pub struct ChangesetSpec {
    /// First and second parent; `NodeId::NULL` for "none".
    pub parents: [NodeId; 2],
    /// Touched paths: `Some` writes the entry, `None` removes the path.
    pub files: BTreeMap<String, Option<FileEntry>>,
    /// Author.
    pub user: String,
    /// Commit date.
    pub date: Timestamp,
    /// Commit message.
    pub message: String,
    /// Extra fields.
    pub extra: BTreeMap<String, String>,
}

impl ChangesetSpec {
    /// Spec with no file changes.
    pub fn new(parents: [NodeId; 2], user: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            parents,
            files: BTreeMap::new(),
            user: user.into(),
            date: Timestamp::default(),
            message: message.into(),
            extra: BTreeMap::new(),
        }
    }

    /// Records a write of `path`.
    pub fn write(mut self, path: impl Into<String>, entry: FileEntry) -> Self {
        self.files.insert(path.into(), Some(entry));
        self
    }

    /// Records a removal of `path`.
    pub fn remove(mut self, path: impl Into<String>) -> Self {
        self.files.insert(path.into(), None);
        self
    }

    /// Sets the commit date.
    pub fn date(mut self, date: Timestamp) -> Self {
        self.date = date;
        self
    }
}

/// Hash identifying a changeset with the given content.
///
/// Parents are hashed in sorted order so the identity does not depend on
/// which side of a merge came first.
pub(crate) fn hash_changeset(
    parents: &[NodeId],
    manifest: &Manifest,
    files: &[String],
    user: &str,
    date: Timestamp,
    message: &str,
    extra: &BTreeMap<String, String>,
) -> NodeId {
    let mut p1 = parents.first().copied().unwrap_or(NodeId::NULL);
    let mut p2 = parents.get(1).copied().unwrap_or(NodeId::NULL);
    if p2 < p1 {
        std::mem::swap(&mut p1, &mut p2);
    }
    let mut buf = Vec::with_capacity(256);
    buf.extend_from_slice(&p1.0);
    buf.extend_from_slice(&p2.0);
    buf.extend_from_slice(&(manifest.len() as u32).to_be_bytes());
    for (path, entry) in manifest.iter() {
        lp::put_str(&mut buf, path);
        lp::put_bytes(&mut buf, &entry.data);
        lp::put_str(&mut buf, entry.flags());
        lp::put_str(&mut buf, entry.copied_from.as_deref().unwrap_or(""));
    }
    buf.extend_from_slice(&(files.len() as u32).to_be_bytes());
    for path in files {
        lp::put_str(&mut buf, path);
    }
    lp::put_str(&mut buf, user);
    buf.extend_from_slice(&date.secs.to_be_bytes());
    buf.extend_from_slice(&date.offset.to_be_bytes());
    lp::put_str(&mut buf, message);
    buf.extend_from_slice(&(extra.len() as u32).to_be_bytes());
    for (key, value) in extra {
        lp::put_str(&mut buf, key);
        lp::put_str(&mut buf, value);
    }
    let digest = Sha1::digest(&buf);
    let mut id = [0u8; crate::types::NODE_LEN];
    id.copy_from_slice(&digest);
    NodeId(id)
}
