//! Graph Store
//!
//! Owns every node and edge of one runtime in two slot maps. Lists are
//! expressed as keys stored on the nodes and edges, so linking, moving and
//! unlinking an edge are all O(1) without any shared mutable pointers.

use slotmap::SlotMap;

use super::edge::{Edge, EdgeId};
use super::node::{Node, NodeId, NodeKind};

/// All nodes and edges of one runtime.
#[derive(Debug, Default)]
pub struct Graph {
    nodes: SlotMap<NodeId, Node>,
    edges: SlotMap<EdgeId, Edge>,
    next_seq: u64,
}

impl Graph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node stamped with the given version.
    pub fn add_node(&mut self, kind: NodeKind, version: u64) -> NodeId {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.nodes.insert(Node::new(kind, seq, version))
    }

    /// Remove a node from the graph.
    ///
    /// All of its edges must already be unlinked.
    pub fn remove_node(&mut self, id: NodeId) -> Option<Node> {
        let node = self.nodes.remove(id)?;
        debug_assert!(
            node.first_in.is_none() && node.first_out.is_none(),
            "node removed with live edges"
        );
        Some(node)
    }

    /// Get a reference to a node.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Get a mutable reference to a node.
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Get a reference to an edge.
    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(id)
    }

    pub(super) fn edge_mut(&mut self, id: EdgeId) -> Option<&mut Edge> {
        self.edges.get_mut(id)
    }

    /// Get the total number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Get the total number of edges in the graph.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Iterate over all nodes.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter()
    }

    /// Iterate over the incoming edges of `id`, head to tail.
    pub fn incoming(&self, id: NodeId) -> Incoming<'_> {
        Incoming {
            graph: self,
            next: self.node(id).and_then(Node::first_incoming),
        }
    }

    /// Iterate over the outgoing edges of `id`, head to tail.
    pub fn outgoing(&self, id: NodeId) -> Outgoing<'_> {
        Outgoing {
            graph: self,
            next: self.node(id).and_then(Node::first_outgoing),
        }
    }

    /// Add an edge from `from` to `to`.
    ///
    /// The edge is placed right after `after` in the consumer's incoming
    /// list (at the head when `after` is `None`) and at the tail of the
    /// producer's outgoing list.
    pub fn add_edge(
        &mut self,
        from: NodeId,
        to: NodeId,
        from_version: u64,
        after: Option<EdgeId>,
    ) -> EdgeId {
        let id = self.edges.insert(Edge::new(from, to, from_version));
        self.attach_incoming(id, after);
        self.attach_outgoing(id);
        id
    }

    /// Move an edge to sit right after `after` in its consumer's incoming list.
    pub fn move_incoming_after(&mut self, id: EdgeId, after: Option<EdgeId>) {
        if after == Some(id) {
            return;
        }
        self.detach_incoming(id);
        self.attach_incoming(id, after);
    }

    /// Remove an edge from both lists and from the graph.
    pub fn remove_edge(&mut self, id: EdgeId) -> Option<Edge> {
        if !self.edges.contains_key(id) {
            return None;
        }
        self.detach_incoming(id);
        self.detach_outgoing(id);
        self.edges.remove(id)
    }

    fn attach_incoming(&mut self, id: EdgeId, after: Option<EdgeId>) {
        let to = self.edges[id].to;
        let next = match after {
            Some(prev) => self.edges[prev].next_in,
            None => self.nodes[to].first_in,
        };

        let edge = &mut self.edges[id];
        edge.prev_in = after;
        edge.next_in = next;

        match after {
            Some(prev) => self.edges[prev].next_in = Some(id),
            None => self.nodes[to].first_in = Some(id),
        }
        match next {
            Some(next) => self.edges[next].prev_in = Some(id),
            None => self.nodes[to].last_in = Some(id),
        }
    }

    fn attach_outgoing(&mut self, id: EdgeId) {
        let from = self.edges[id].from;
        let tail = self.nodes[from].last_out;

        let edge = &mut self.edges[id];
        edge.prev_out = tail;
        edge.next_out = None;

        match tail {
            Some(tail) => self.edges[tail].next_out = Some(id),
            None => self.nodes[from].first_out = Some(id),
        }
        self.nodes[from].last_out = Some(id);
    }

    fn detach_incoming(&mut self, id: EdgeId) {
        let Edge {
            to,
            prev_in,
            next_in,
            ..
        } = self.edges[id];

        match prev_in {
            Some(prev) => self.edges[prev].next_in = next_in,
            None => {
                if let Some(node) = self.nodes.get_mut(to) {
                    node.first_in = next_in;
                }
            }
        }
        match next_in {
            Some(next) => self.edges[next].prev_in = prev_in,
            None => {
                if let Some(node) = self.nodes.get_mut(to) {
                    node.last_in = prev_in;
                }
            }
        }

        let edge = &mut self.edges[id];
        edge.prev_in = None;
        edge.next_in = None;
    }

    fn detach_outgoing(&mut self, id: EdgeId) {
        let Edge {
            from,
            prev_out,
            next_out,
            ..
        } = self.edges[id];

        match prev_out {
            Some(prev) => self.edges[prev].next_out = next_out,
            None => {
                if let Some(node) = self.nodes.get_mut(from) {
                    node.first_out = next_out;
                }
            }
        }
        match next_out {
            Some(next) => self.edges[next].prev_out = prev_out,
            None => {
                if let Some(node) = self.nodes.get_mut(from) {
                    node.last_out = prev_out;
                }
            }
        }

        let edge = &mut self.edges[id];
        edge.prev_out = None;
        edge.next_out = None;
    }
}

/// Iterator over a consumer's incoming edges.
pub struct Incoming<'a> {
    graph: &'a Graph,
    next: Option<EdgeId>,
}

impl<'a> Iterator for Incoming<'a> {
    type Item = (EdgeId, &'a Edge);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        let edge = self.graph.edge(id)?;
        self.next = edge.next_incoming();
        Some((id, edge))
    }
}

/// Iterator over a producer's outgoing edges.
pub struct Outgoing<'a> {
    graph: &'a Graph,
    next: Option<EdgeId>,
}

impl<'a> Iterator for Outgoing<'a> {
    type Item = (EdgeId, &'a Edge);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        let edge = self.graph.edge(id)?;
        self.next = edge.next_outgoing();
        Some((id, edge))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn producers(graph: &Graph, id: NodeId) -> Vec<NodeId> {
        graph.incoming(id).map(|(_, edge)| edge.from()).collect()
    }

    fn consumers(graph: &Graph, id: NodeId) -> Vec<NodeId> {
        graph.outgoing(id).map(|(_, edge)| edge.to()).collect()
    }

    #[test]
    fn add_and_remove_nodes() {
        let mut graph = Graph::new();

        let cell = graph.add_node(NodeKind::Cell, 0);
        let derived = graph.add_node(NodeKind::Derived, 0);
        assert_eq!(graph.node_count(), 2);
        assert!(graph.node(cell).unwrap().seq() < graph.node(derived).unwrap().seq());

        graph.remove_node(cell);
        assert_eq!(graph.node_count(), 1);
        assert!(graph.node(cell).is_none());
        assert!(graph.node(derived).is_some());
    }

    #[test]
    fn edges_join_both_lists() {
        let mut graph = Graph::new();
        let a = graph.add_node(NodeKind::Cell, 0);
        let b = graph.add_node(NodeKind::Cell, 0);
        let d = graph.add_node(NodeKind::Derived, 0);

        let ea = graph.add_edge(a, d, 0, None);
        graph.add_edge(b, d, 0, Some(ea));

        assert_eq!(producers(&graph, d), vec![a, b]);
        assert_eq!(consumers(&graph, a), vec![d]);
        assert_eq!(consumers(&graph, b), vec![d]);
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn insert_at_head_and_middle() {
        let mut graph = Graph::new();
        let a = graph.add_node(NodeKind::Cell, 0);
        let b = graph.add_node(NodeKind::Cell, 0);
        let c = graph.add_node(NodeKind::Cell, 0);
        let d = graph.add_node(NodeKind::Derived, 0);

        let ea = graph.add_edge(a, d, 0, None);
        graph.add_edge(c, d, 0, Some(ea));
        graph.add_edge(b, d, 0, Some(ea));
        assert_eq!(producers(&graph, d), vec![a, b, c]);

        let e = graph.add_node(NodeKind::Derived, 0);
        graph.add_edge(b, e, 0, None);
        graph.add_edge(a, e, 0, None);
        assert_eq!(producers(&graph, e), vec![a, b]);
        assert_eq!(consumers(&graph, a), vec![d, e]);
    }

    #[test]
    fn move_edge_within_incoming_list() {
        let mut graph = Graph::new();
        let a = graph.add_node(NodeKind::Cell, 0);
        let b = graph.add_node(NodeKind::Cell, 0);
        let c = graph.add_node(NodeKind::Cell, 0);
        let d = graph.add_node(NodeKind::Derived, 0);

        let ea = graph.add_edge(a, d, 0, None);
        let eb = graph.add_edge(b, d, 0, Some(ea));
        let ec = graph.add_edge(c, d, 0, Some(eb));

        graph.move_incoming_after(ec, None);
        assert_eq!(producers(&graph, d), vec![c, a, b]);
        assert_eq!(graph.node(d).unwrap().last_incoming(), Some(eb));

        graph.move_incoming_after(ec, Some(eb));
        assert_eq!(producers(&graph, d), vec![a, b, c]);
        assert_eq!(graph.node(d).unwrap().last_incoming(), Some(ec));

        // Moving after itself is a no-op
        graph.move_incoming_after(ec, Some(ec));
        assert_eq!(producers(&graph, d), vec![a, b, c]);
    }

    #[test]
    fn remove_edge_unlinks_both_lists() {
        let mut graph = Graph::new();
        let a = graph.add_node(NodeKind::Cell, 0);
        let d1 = graph.add_node(NodeKind::Derived, 0);
        let d2 = graph.add_node(NodeKind::Derived, 0);
        let d3 = graph.add_node(NodeKind::Derived, 0);

        graph.add_edge(a, d1, 0, None);
        let middle = graph.add_edge(a, d2, 0, None);
        graph.add_edge(a, d3, 0, None);
        assert_eq!(consumers(&graph, a), vec![d1, d2, d3]);

        let removed = graph.remove_edge(middle).unwrap();
        assert_eq!(removed.to(), d2);
        assert_eq!(consumers(&graph, a), vec![d1, d3]);
        assert!(producers(&graph, d2).is_empty());
        assert!(graph.node(d2).unwrap().last_incoming().is_none());

        // Removing twice is harmless
        assert!(graph.remove_edge(middle).is_none());
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn single_producer_detection() {
        let mut graph = Graph::new();
        let a = graph.add_node(NodeKind::Cell, 0);
        let b = graph.add_node(NodeKind::Cell, 0);
        let d = graph.add_node(NodeKind::Derived, 0);

        assert!(!graph.node(d).unwrap().has_single_producer());
        let ea = graph.add_edge(a, d, 0, None);
        assert!(graph.node(d).unwrap().has_single_producer());
        graph.add_edge(b, d, 0, Some(ea));
        assert!(!graph.node(d).unwrap().has_single_producer());
    }
}
