use rustc_hash::FxHashMap;
use tracing::{info, warn};

use crate::obsolete::codec;
use crate::obsolete::marker::Marker;
use crate::types::{EvolveError, NodeId, Result};

/// Append-only marker set with a dual index.
///
/// `successors` maps a precursor to the markers it is obsoleted by;
/// `precursors` maps each successor to the markers naming it. Both hold
/// positions into `markers`, so lookups cost one hash lookup.
#[derive(Clone, Debug)]
pub struct ObsStore {
    enabled: bool,
    markers: Vec<Marker>,
    successors: FxHashMap<NodeId, Vec<usize>>,
    precursors: FxHashMap<NodeId, Vec<usize>>,
    repaired: usize,
}

impl ObsStore {
    /// Empty store. A disabled store refuses appends.
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            markers: Vec::new(),
            successors: FxHashMap::default(),
            precursors: FxHashMap::default(),
            repaired: 0,
        }
    }

    /// Builds a store from raw markers, repairing legacy null successors.
    pub fn from_markers(enabled: bool, markers: Vec<Marker>) -> Self {
        let mut store = Self::new(enabled);
        for mut marker in markers {
            if marker.strip_null() {
                store.repaired += 1;
            }
            store.index(marker);
        }
        if store.repaired > 0 {
            warn!(
                repaired = store.repaired,
                markers = store.markers.len(),
                "obsstore.load.repaired"
            );
        }
        store
    }

    /// Decodes an obsstore file.
    pub fn load(enabled: bool, bytes: &[u8]) -> Result<Self> {
        let markers = codec::decode_file(bytes)?;
        let store = Self::from_markers(enabled, markers);
        info!(markers = store.len(), "obsstore.load.completed");
        Ok(store)
    }

    /// Whether markers may be appended.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Number of markers carrying a null successor when loaded.
    pub fn repaired(&self) -> usize {
        self.repaired
    }

    /// Number of markers.
    pub fn len(&self) -> usize {
        self.markers.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Markers in append order.
    pub fn iter(&self) -> impl Iterator<Item = &Marker> {
        self.markers.iter()
    }

    /// Markers appended at or after position `from`.
    pub fn since(&self, from: usize) -> &[Marker] {
        self.markers.get(from..).unwrap_or(&[])
    }

    /// Markers obsoleting `node` (the ones with `node` as precursor).
    pub fn successors_of(&self, node: NodeId) -> impl Iterator<Item = &Marker> {
        self.lookup(&self.successors, node)
    }

    /// Markers naming `node` as a successor.
    pub fn precursors_of(&self, node: NodeId) -> impl Iterator<Item = &Marker> {
        self.lookup(&self.precursors, node)
    }

    /// Whether `node` is the precursor of at least one marker.
    pub fn is_precursor(&self, node: NodeId) -> bool {
        self.successors.contains_key(&node)
    }

    /// Every node obsoleted by at least one marker.
    pub fn precursor_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.successors.keys().copied()
    }

    fn lookup<'a>(
        &'a self,
        index: &'a FxHashMap<NodeId, Vec<usize>>,
        node: NodeId,
    ) -> impl Iterator<Item = &'a Marker> + 'a {
        index
            .get(&node)
            .into_iter()
            .flatten()
            .map(move |pos| &self.markers[*pos])
    }

    /// Appends a marker unless an identical relation is already recorded.
    ///
    /// Returns whether the marker was added. Precondition checks against
    /// the changeset graph (phase, existence) belong to the caller.
    pub fn append(&mut self, mut marker: Marker) -> Result<bool> {
        if !self.enabled {
            return Err(EvolveError::ObsolescenceDisabled);
        }
        marker.strip_null();
        if self
            .successors_of(marker.precursor)
            .any(|existing| existing.same_relation(&marker))
        {
            return Ok(false);
        }
        self.index(marker);
        Ok(true)
    }

    fn index(&mut self, marker: Marker) {
        let pos = self.markers.len();
        self.successors.entry(marker.precursor).or_default().push(pos);
        for succ in &marker.successors {
            let slots = self.precursors.entry(*succ).or_default();
            if !slots.contains(&pos) {
                slots.push(pos);
            }
        }
        self.markers.push(marker);
    }

    /// Drops every marker appended at or after position `len`.
    pub(crate) fn truncate(&mut self, len: usize) {
        while self.markers.len() > len {
            let pos = self.markers.len() - 1;
            let Some(marker) = self.markers.pop() else { break };
            unindex(&mut self.successors, marker.precursor, pos);
            for succ in &marker.successors {
                unindex(&mut self.precursors, *succ, pos);
            }
        }
    }

    /// Whole-file encoding of the store.
    pub fn encode(&self) -> Vec<u8> {
        codec::encode_file(&self.markers)
    }
}

fn unindex(index: &mut FxHashMap<NodeId, Vec<usize>>, node: NodeId, pos: usize) {
    if let Some(slots) = index.get_mut(&node) {
        slots.retain(|p| *p != pos);
        if slots.is_empty() {
            index.remove(&node);
        }
    }
}
