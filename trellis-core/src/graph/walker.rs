//! Graph Walker
//!
//! The algorithms that run over edges:
//!
//! - [`link`] confirms that the running consumer read a producer, reusing
//!   the edge from the previous run when there is one.
//! - [`prune`] drops the edges a run did not confirm.
//! - [`refresh`] decides whether a consumer's cached output is stale and
//!   brings it up to date.
//!
//! # Confirmation Cursor
//!
//! While a consumer runs, its incoming list is split in two: edges up to the
//! cursor were confirmed by this run, edges after it are left over from the
//! previous run. Reading producers in the same order as last time only ever
//! looks at the edge right after the cursor, so the steady state allocates
//! nothing and scans nothing.
//!
//! # Staleness
//!
//! `refresh` walks producers depth-first with an explicit stack. A derived
//! producer is settled before its version is compared, so consumers never see
//! a producer that is behind its own inputs. The first producer whose version
//! is newer than the version stamped on the edge makes the consumer stale,
//! and it is re-run right away.

use std::cell::{Ref, RefMut};

use smallvec::{smallvec, SmallVec};

use super::edge::EdgeId;
use super::node::{NodeId, NodeKind, Status};
use super::store::Graph;
use crate::error::{ReactiveError, Result};

/// Access the walker needs from a runtime.
pub(crate) trait Resolve {
    fn graph(&self) -> Ref<'_, Graph>;

    fn graph_mut(&self) -> RefMut<'_, Graph>;

    /// Current value of the version clock.
    fn clock(&self) -> u64;

    /// Re-run a derived node or reaction, relinking what it reads.
    fn rerun(&self, node: NodeId) -> Result<()>;
}

/// Result of confirming one read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Link {
    /// The cursor after this read.
    pub cursor: Option<EdgeId>,
    /// Whether a new edge was allocated.
    pub created: bool,
}

/// Confirm that `consumer` read `producer` during its current run.
pub(crate) fn link(
    graph: &mut Graph,
    producer: NodeId,
    consumer: NodeId,
    cursor: Option<EdgeId>,
) -> Link {
    let version = match graph.node(producer) {
        Some(node) => node.version(),
        None => return Link { cursor, created: false },
    };

    // Same producer as the last confirmed read
    if let Some(tail) = cursor {
        if let Some(edge) = graph.edge_mut(tail) {
            if edge.from == producer {
                edge.from_version = version;
                return Link { cursor, created: false };
            }
        }
    }

    // Producer read in the same order as last run
    let next = match cursor {
        Some(tail) => graph.edge(tail).and_then(|edge| edge.next_in),
        None => graph.node(consumer).and_then(|node| node.first_in),
    };
    if let Some(next) = next {
        if let Some(edge) = graph.edge_mut(next) {
            if edge.from == producer {
                edge.from_version = version;
                return Link {
                    cursor: Some(next),
                    created: false,
                };
            }
        }
    }

    let mut confirmed = cursor.is_some();
    let mut scan = graph.node(consumer).and_then(|node| node.first_in);
    while let Some(id) = scan {
        let Some(edge) = graph.edge_mut(id) else { break };
        if edge.from == producer {
            edge.from_version = version;
            if confirmed {
                // Read twice in one run
                return Link { cursor, created: false };
            }
            graph.move_incoming_after(id, cursor);
            return Link {
                cursor: Some(id),
                created: false,
            };
        }
        if Some(id) == cursor {
            confirmed = false;
        }
        scan = edge.next_in;
    }

    let id = graph.add_edge(producer, consumer, version, cursor);
    Link {
        cursor: Some(id),
        created: true,
    }
}

/// Unlink every incoming edge of `consumer` after `cursor`.
///
/// With `cursor` set to `None` this drops all of the consumer's producers.
/// Returns the producers that were unlinked.
pub(crate) fn prune(
    graph: &mut Graph,
    consumer: NodeId,
    cursor: Option<EdgeId>,
) -> SmallVec<[NodeId; 4]> {
    let mut removed = SmallVec::new();
    let mut next = match cursor {
        Some(tail) => graph.edge(tail).and_then(|edge| edge.next_in),
        None => graph.node(consumer).and_then(|node| node.first_in),
    };
    while let Some(id) = next {
        next = graph.edge(id).and_then(|edge| edge.next_in);
        match graph.remove_edge(id) {
            Some(edge) => removed.push(edge.from),
            None => break,
        }
    }
    removed
}

/// Unlink every outgoing edge of `producer`, returning the former consumers.
pub(crate) fn detach_consumers(graph: &mut Graph, producer: NodeId) -> SmallVec<[NodeId; 4]> {
    let mut removed = SmallVec::new();
    while let Some(id) = graph.node(producer).and_then(|node| node.first_out) {
        match graph.remove_edge(id) {
            Some(edge) => removed.push(edge.to),
            None => break,
        }
    }
    removed
}

/// Recompute a consumer's height and `DERIVED_SOURCES` flag from its
/// current producers.
pub(crate) fn reshape(graph: &mut Graph, consumer: NodeId) {
    let mut height = 0;
    let mut derived_sources = false;
    for (_, edge) in graph.incoming(consumer) {
        if let Some(producer) = graph.node(edge.from()) {
            height = height.max(producer.height());
            derived_sources |= producer.kind() == NodeKind::Derived;
        }
    }
    if let Some(node) = graph.node_mut(consumer) {
        node.set_height(height + 1);
        node.set(Status::DERIVED_SOURCES, derived_sources);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Check {
    Fresh,
    Rerun,
    Walk,
}

fn check(graph: &Graph, id: NodeId, clock: u64) -> Result<Check> {
    let node = graph.node(id).ok_or(ReactiveError::Disposed)?;
    let status = node.status();

    if status.contains(Status::DISPOSED) {
        return Err(ReactiveError::Disposed);
    }
    if status.contains(Status::RUNNING) {
        return Err(ReactiveError::Cycle);
    }
    if node.kind() == NodeKind::Cell {
        return Ok(Check::Fresh);
    }
    if status.contains(Status::PENDING) {
        return Ok(Check::Rerun);
    }
    if status.contains(Status::STALE) {
        return Ok(Check::Walk);
    }
    if node.checked_at() == clock {
        return Ok(Check::Fresh);
    }
    // Pushes mark every node below the write, so without derived producers
    // a clear STALE bit is proof enough.
    if !status.contains(Status::DERIVED_SOURCES) {
        return Ok(Check::Fresh);
    }
    Ok(Check::Walk)
}

fn mark_fresh<R: Resolve + ?Sized>(rt: &R, id: NodeId) {
    let clock = rt.clock();
    if let Some(node) = rt.graph_mut().node_mut(id) {
        node.clear(Status::STALE);
        node.set_checked_at(clock);
    }
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    node: NodeId,
    next: Option<EdgeId>,
}

/// Bring `root` up to date, re-running it if any producer changed.
pub(crate) fn refresh<R: Resolve + ?Sized>(rt: &R, root: NodeId) -> Result<()> {
    let check_root = check(&rt.graph(), root, rt.clock())?;
    match check_root {
        Check::Fresh => return Ok(()),
        Check::Rerun => return rt.rerun(root),
        Check::Walk => {}
    }

    // Single producer that is a cell: one comparison, no stack
    let single = {
        let graph = rt.graph();
        graph
            .node(root)
            .filter(|node| node.has_single_producer())
            .and_then(|node| node.first_in)
            .and_then(|id| graph.edge(id))
            .and_then(|edge| {
                let producer = graph.node(edge.from)?;
                (producer.kind() == NodeKind::Cell)
                    .then(|| producer.version() > edge.from_version)
            })
    };
    if let Some(stale) = single {
        if stale {
            return rt.rerun(root);
        }
        mark_fresh(rt, root);
        return Ok(());
    }

    let first = rt.graph().node(root).and_then(|node| node.first_in);
    let mut stack: SmallVec<[Frame; 16]> = smallvec![Frame {
        node: root,
        next: first,
    }];

    while let Some(frame) = stack.last().copied() {
        let Some(edge_id) = frame.next else {
            // Every producer checked out
            mark_fresh(rt, frame.node);
            stack.pop();
            continue;
        };

        let (producer, seen, next) = {
            let graph = rt.graph();
            match graph.edge(edge_id) {
                Some(edge) => (Some(edge.from), edge.from_version, edge.next_in),
                None => (None, 0, None),
            }
        };

        let changed = match producer {
            Some(producer) => {
                let check_producer = {
                    let graph = rt.graph();
                    if graph.contains(producer) {
                        Some(check(&graph, producer, rt.clock())?)
                    } else {
                        None
                    }
                };
                match check_producer {
                    Some(Check::Walk) => {
                        let first = rt.graph().node(producer).and_then(|node| node.first_in);
                        stack.push(Frame {
                            node: producer,
                            next: first,
                        });
                        continue;
                    }
                    Some(Check::Rerun) => rt.rerun(producer)?,
                    Some(Check::Fresh) => {}
                    None => {}
                }
                rt.graph()
                    .node(producer)
                    .map_or(true, |node| node.version() > seen)
            }
            // Edge vanished under us, so the last run's view is gone
            None => true,
        };

        if changed {
            rt.rerun(frame.node)?;
            stack.pop();
        } else if let Some(top) = stack.last_mut() {
            top.next = next;
        }
    }

    Ok(())
}
