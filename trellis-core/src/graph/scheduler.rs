//! Work Queue
//!
//! The queue holds nodes waiting to be settled by a flush: reactions that
//! must re-run, and derived nodes with consumers whose producers moved.
//!
//! # Ordering
//!
//! Entries pop in order of height (longest path from a cell), so a derived
//! node is settled before anything that reads it. Equal heights pop in
//! creation order, which keeps flushes deterministic.
//!
//! Duplicate suppression is not the queue's job: callers set `NOTIFIED` on the
//! node before pushing and clear it when popping.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use super::node::{Node, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct QueueEntry {
    height: u32,
    seq: u64,
    node: NodeId,
}

/// Pending nodes of one runtime, ordered by (height, creation order).
#[derive(Debug, Default)]
pub struct WorkQueue {
    heap: BinaryHeap<Reverse<QueueEntry>>,
}

impl WorkQueue {
    /// Create a new empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a node at its current height.
    pub fn push(&mut self, id: NodeId, node: &Node) {
        self.heap.push(Reverse(QueueEntry {
            height: node.height(),
            seq: node.seq(),
            node: id,
        }));
    }

    /// Take the lowest entry.
    pub fn pop(&mut self) -> Option<NodeId> {
        self.heap.pop().map(|Reverse(entry)| entry.node)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Remove every entry, returning the nodes that were waiting.
    pub fn drain(&mut self) -> Vec<NodeId> {
        self.heap.drain().map(|Reverse(entry)| entry.node).collect()
    }
}
