//! Graph Edges
//!
//! An edge links one producer to one consumer. It is threaded through two
//! doubly-linked lists at once: the consumer's incoming list and the
//! producer's outgoing list. Links are arena keys rather than pointers.

use slotmap::new_key_type;

use super::node::NodeId;

new_key_type! {
    /// Generational index of an edge in a runtime's graph.
    pub struct EdgeId;
}

/// A confirmed dependency of `to` on `from`.
#[derive(Debug, Clone)]
pub struct Edge {
    pub(super) from: NodeId,
    pub(super) to: NodeId,

    /// Producer version observed the last time `to` read `from`.
    pub(super) from_version: u64,

    pub(super) prev_in: Option<EdgeId>,
    pub(super) next_in: Option<EdgeId>,
    pub(super) prev_out: Option<EdgeId>,
    pub(super) next_out: Option<EdgeId>,
}

impl Edge {
    pub(super) fn new(from: NodeId, to: NodeId, from_version: u64) -> Self {
        Self {
            from,
            to,
            from_version,
            prev_in: None,
            next_in: None,
            prev_out: None,
            next_out: None,
        }
    }

    /// The producer.
    pub fn from(&self) -> NodeId {
        self.from
    }

    /// The consumer.
    pub fn to(&self) -> NodeId {
        self.to
    }

    pub fn from_version(&self) -> u64 {
        self.from_version
    }

    /// Next edge in the consumer's incoming list.
    pub fn next_incoming(&self) -> Option<EdgeId> {
        self.next_in
    }

    /// Next edge in the producer's outgoing list.
    pub fn next_outgoing(&self) -> Option<EdgeId> {
        self.next_out
    }
}
