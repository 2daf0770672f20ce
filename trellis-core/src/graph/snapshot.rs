//! Graph Snapshots
//!
//! A point-in-time copy of a runtime's graph shape, for devtools and test
//! assertions. Nodes are listed in creation order; edges are listed per
//! consumer in incoming-list order.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::node::{NodeKind, Status};
use super::store::Graph;
use crate::error::SnapshotError;

/// One node in a [`GraphSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub kind: NodeKind,
    pub version: u64,
    pub height: u32,
    /// Raw [`Status`] bits.
    pub status: u8,
}

impl NodeSnapshot {
    pub fn status(&self) -> Status {
        Status::from_bits_truncate(self.status)
    }
}

/// One edge in a [`GraphSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeSnapshot {
    pub from: u64,
    pub to: u64,
    pub from_version: u64,
}

/// The shape of a graph at one clock value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub clock: u64,
    /// Keyed by [`NodeId::raw`](super::NodeId::raw).
    pub nodes: IndexMap<u64, NodeSnapshot>,
    pub edges: Vec<EdgeSnapshot>,
}

impl GraphSnapshot {
    pub(crate) fn capture(graph: &Graph, clock: u64) -> Self {
        let mut ordered: Vec<_> = graph.nodes().collect();
        ordered.sort_by_key(|(_, node)| node.seq());

        let mut nodes = IndexMap::with_capacity(ordered.len());
        let mut edges = Vec::with_capacity(graph.edge_count());
        for (id, node) in ordered {
            nodes.insert(
                id.raw(),
                NodeSnapshot {
                    kind: node.kind(),
                    version: node.version(),
                    height: node.height(),
                    status: node.status().bits(),
                },
            );
            edges.extend(graph.incoming(id).map(|(_, edge)| EdgeSnapshot {
                from: edge.from().raw(),
                to: id.raw(),
                from_version: edge.from_version(),
            }));
        }

        Self {
            clock,
            nodes,
            edges,
        }
    }

    /// Raw ids of the producers `node` reads, in incoming-list order.
    pub fn producers_of(&self, node: u64) -> Vec<u64> {
        self.edges
            .iter()
            .filter(|edge| edge.to == node)
            .map(|edge| edge.from)
            .collect()
    }

    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Compact encoding for devtools transports.
    pub fn to_msgpack(&self) -> Result<Vec<u8>, SnapshotError> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, SnapshotError> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}
