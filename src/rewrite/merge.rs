use std::collections::{BTreeMap, BTreeSet};

use crate::storage::{ConflictSides, FileEntry, Manifest};

/// Result of a file-level three-way manifest merge.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergeResult {
    /// Merged manifest; conflicted paths keep the local version.
    pub manifest: Manifest,
    /// Paths changed differently on both sides.
    pub conflicts: BTreeMap<String, ConflictSides>,
}

impl MergeResult {
    /// Whether the merge left nothing to resolve.
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }

    /// Conflicted paths in order.
    pub fn conflicted_paths(&self) -> Vec<String> {
        self.conflicts.keys().cloned().collect()
    }
}

fn same(a: Option<&FileEntry>, b: Option<&FileEntry>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.same_content(b),
        _ => false,
    }
}

/// Merges `other`'s changes since `ancestor` into `local`.
///
/// Per path: identical sides merge trivially, a side equal to the ancestor
/// yields to the other side, anything else is a conflict.
pub fn merge_manifests(local: &Manifest, other: &Manifest, ancestor: &Manifest) -> MergeResult {
    let paths: BTreeSet<&String> = local
        .iter()
        .chain(other.iter())
        .chain(ancestor.iter())
        .map(|(path, _)| path)
        .collect();
    let mut result = MergeResult::default();
    for path in paths {
        let l = local.get(path);
        let o = other.get(path);
        let a = ancestor.get(path);
        let chosen = if same(l, o) || same(o, a) {
            l
        } else if same(l, a) {
            o
        } else {
            result.conflicts.insert(
                path.clone(),
                ConflictSides {
                    local: l.cloned(),
                    other: o.cloned(),
                },
            );
            l
        };
        if let Some(entry) = chosen {
            result.manifest.insert(path.clone(), entry.clone());
        }
    }
    result
}
