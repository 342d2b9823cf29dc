use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::NodeId;

/// Named movable references plus the optional active one.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmarks {
    marks: BTreeMap<String, NodeId>,
    #[serde(default)]
    active: Option<String>,
}

impl Bookmarks {
    /// Empty bookmark table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Target of `name`.
    pub fn get(&self, name: &str) -> Option<NodeId> {
        self.marks.get(name).copied()
    }

    /// Creates or moves `name` to `node`.
    pub fn set(&mut self, name: impl Into<String>, node: NodeId) {
        self.marks.insert(name.into(), node);
    }

    /// Deletes `name`, deactivating it if it was active.
    pub fn remove(&mut self, name: &str) -> Option<NodeId> {
        if self.active.as_deref() == Some(name) {
            self.active = None;
        }
        self.marks.remove(name)
    }

    /// Names of every bookmark pointing at `node`, sorted.
    pub fn pointing_at(&self, node: NodeId) -> Vec<String> {
        self.marks
            .iter()
            .filter(|(_, target)| **target == node)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Moves every bookmark on `from` to `to`. Returns how many moved.
    pub fn move_all(&mut self, from: NodeId, to: NodeId) -> usize {
        let mut moved = 0;
        for target in self.marks.values_mut() {
            if *target == from {
                *target = to;
                moved += 1;
            }
        }
        moved
    }

    /// Currently active bookmark, if any.
    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// Activates `name`, or clears the active bookmark with `None`.
    pub fn set_active(&mut self, name: Option<String>) {
        self.active = name.filter(|n| self.marks.contains_key(n));
    }

    /// Iterates `(name, target)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, NodeId)> {
        self.marks.iter().map(|(name, node)| (name.as_str(), *node))
    }

    /// Number of bookmarks.
    pub fn len(&self) -> usize {
        self.marks.len()
    }

    /// Whether no bookmark exists.
    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn move_all_and_active_tracking() {
        let a = NodeId([1; 20]);
        let b = NodeId([2; 20]);
        let mut marks = Bookmarks::new();
        marks.set("one", a);
        marks.set("two", a);
        marks.set("three", b);
        marks.set_active(Some("two".into()));
        assert_eq!(marks.move_all(a, b), 2);
        assert_eq!(marks.pointing_at(b), vec!["one", "three", "two"]);
        marks.remove("two");
        assert_eq!(marks.active(), None);
        marks.set_active(Some("missing".into()));
        assert_eq!(marks.active(), None);
    }
}
