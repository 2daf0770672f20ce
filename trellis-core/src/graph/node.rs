//! Graph Nodes
//!
//! This module defines the node records that live in the dependency graph.
//! A node carries only graph bookkeeping: its kind, status flags, version,
//! height and the heads of its edge lists. Values and derivation closures
//! live with the typed handles in `reactive`.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, Key};

use super::edge::EdgeId;

new_key_type! {
    /// Generational index of a node in a runtime's graph.
    ///
    /// Once a node is disposed its slot may be reused, but the generation
    /// changes, so an old `NodeId` never resolves to the new occupant.
    pub struct NodeId;
}

impl NodeId {
    /// Get a stable integer form of this id, for logs and snapshots.
    pub fn raw(self) -> u64 {
        self.data().as_ffi()
    }
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// A reactive cell. These are the roots of the graph.
    /// They have no incoming edges, only consumers.
    Cell,

    /// A derived node. Reads producers and may itself be read.
    /// Caches its computed value.
    Derived,

    /// A reaction. These are leaves of the graph.
    /// They read producers but nothing reads them.
    Reaction,
}

bitflags! {
    /// Status flags of a node.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Status: u8 {
        /// The node's derivation is executing right now.
        const RUNNING = 1 << 0;
        /// The node sits in the work queue.
        const NOTIFIED = 1 << 1;
        /// Something upstream may have changed since the last settle; decided
        /// on next pull.
        const STALE = 1 << 2;
        /// The node is being torn down or is gone.
        const DISPOSED = 1 << 3;
        /// The last derivation raised; the error is cached.
        const HAS_ERROR = 1 << 4;
        /// The derivation must run unconditionally on the next pull.
        const PENDING = 1 << 5;
        /// At least one producer is a derived node.
        const DERIVED_SOURCES = 1 << 6;
    }
}

/// A node in the dependency graph.
#[derive(Debug, Clone)]
pub struct Node {
    kind: NodeKind,
    status: Status,

    /// Clock value stamped the last time this node's output changed.
    version: u64,

    /// Clock value at which the node was last confirmed fresh.
    checked_at: u64,

    /// Longest path from a cell. Cells are 0.
    height: u32,

    /// Creation order within the runtime.
    seq: u64,

    pub(super) first_in: Option<EdgeId>,
    pub(super) last_in: Option<EdgeId>,
    pub(super) first_out: Option<EdgeId>,
    pub(super) last_out: Option<EdgeId>,
}

impl Node {
    /// Create a new node of the given kind.
    ///
    /// Derived nodes and reactions start `PENDING` so their first pull runs
    /// the derivation.
    pub fn new(kind: NodeKind, seq: u64, version: u64) -> Self {
        Self {
            kind,
            status: match kind {
                NodeKind::Cell => Status::empty(),
                NodeKind::Derived | NodeKind::Reaction => Status::PENDING,
            },
            version,
            checked_at: version,
            height: match kind {
                NodeKind::Cell => 0,
                NodeKind::Derived | NodeKind::Reaction => 1,
            },
            seq,
            first_in: None,
            last_in: None,
            first_out: None,
            last_out: None,
        }
    }

    /// Get the node's kind.
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Get the current status flags.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Check whether every flag in `flags` is set.
    pub fn is(&self, flags: Status) -> bool {
        self.status.contains(flags)
    }

    /// Set the given flags.
    pub fn mark(&mut self, flags: Status) {
        self.status.insert(flags);
    }

    /// Clear the given flags.
    pub fn clear(&mut self, flags: Status) {
        self.status.remove(flags);
    }

    /// Set or clear the given flags.
    pub fn set(&mut self, flags: Status, value: bool) {
        self.status.set(flags, value);
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn set_version(&mut self, version: u64) {
        debug_assert!(version >= self.version, "node versions never go backwards");
        self.version = version;
    }

    pub fn checked_at(&self) -> u64 {
        self.checked_at
    }

    pub fn set_checked_at(&mut self, clock: u64) {
        self.checked_at = clock;
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn set_height(&mut self, height: u32) {
        self.height = height;
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// First edge of the incoming list (producers this node reads).
    pub fn first_incoming(&self) -> Option<EdgeId> {
        self.first_in
    }

    /// Last edge of the incoming list.
    pub fn last_incoming(&self) -> Option<EdgeId> {
        self.last_in
    }

    /// First edge of the outgoing list (consumers reading this node).
    pub fn first_outgoing(&self) -> Option<EdgeId> {
        self.first_out
    }

    /// Whether any consumer reads this node.
    pub fn has_consumers(&self) -> bool {
        self.first_out.is_some()
    }

    /// Whether this node reads exactly one producer.
    pub fn has_single_producer(&self) -> bool {
        self.first_in.is_some() && self.first_in == self.last_in
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    #[test]
    fn node_ids_are_generational() {
        let mut nodes: SlotMap<NodeId, ()> = SlotMap::with_key();
        let first = nodes.insert(());
        nodes.remove(first);
        let second = nodes.insert(());

        // Same slot, different generation
        assert_ne!(first, second);
        assert_ne!(first.raw(), second.raw());
        assert!(nodes.get(first).is_none());
    }

    #[test]
    fn cell_node_starts_clean() {
        let node = Node::new(NodeKind::Cell, 0, 0);
        assert_eq!(node.kind(), NodeKind::Cell);
        assert_eq!(node.status(), Status::empty());
        assert_eq!(node.height(), 0);
    }

    #[test]
    fn derived_node_starts_pending() {
        let node = Node::new(NodeKind::Derived, 1, 0);
        assert!(node.is(Status::PENDING));
        assert_eq!(node.height(), 1);
        assert!(!node.has_consumers());
    }

    #[test]
    fn status_transitions() {
        let mut node = Node::new(NodeKind::Reaction, 0, 0);

        node.mark(Status::STALE | Status::NOTIFIED);
        assert!(node.is(Status::STALE));
        assert!(node.is(Status::STALE | Status::NOTIFIED));

        node.clear(Status::NOTIFIED);
        assert!(!node.is(Status::NOTIFIED));
        assert!(node.is(Status::STALE));

        node.set(Status::HAS_ERROR, true);
        assert!(node.is(Status::HAS_ERROR));
        node.set(Status::HAS_ERROR, false);
        assert!(!node.is(Status::HAS_ERROR));
    }
}
