//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects cells, derived nodes
//! and reactions. It owns the dependency graph, the version clock and the
//! work queue, and schedules updates when cells change.
//!
//! # How It Works
//!
//! 1. When a node is created, it registers with the runtime and gets a
//!    [`NodeId`].
//!
//! 2. When a derived node or reaction reads another node, the runtime links
//!    the two in the graph.
//!
//! 3. When a cell's value changes, the runtime:
//!    a. Advances the clock and stamps the cell's version
//!    b. Marks consumers `STALE`, carrying the mark down through derived
//!       nodes
//!    c. Queues the reactions the mark reached
//!    d. Flushes the queue, unless a batch is open
//!
//! Pushing never recomputes anything. Derived nodes settle when a read or a
//! queued reaction pulls them, so a derived node nobody reads never runs.
//!
//! # Threading
//!
//! A runtime is single-threaded. Its handles are `!Send` and every operation
//! takes the runtime by reference, so several runtimes can coexist without
//! sharing anything.

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use slotmap::SecondaryMap;
use smallvec::SmallVec;
use tracing::{debug, error, trace, warn};

use super::batch::{BatchGuard, FlushGuard};
use super::context::{ReactiveContext, TrackingStack, Untracked};
use super::observer::{GraphEvent, Observer};
use crate::error::{ReactiveError, Result};
use crate::graph::walker::{self, Resolve};
use crate::graph::{Graph, GraphSnapshot, Node, NodeId, NodeKind, Status, VersionClock, WorkQueue};

const DEFAULT_MAX_FLUSH_RUNS: usize = 100_000;

/// Unique identifier for a runtime.
///
/// Handles remember the runtime that created them, so using one with a
/// different runtime fails with [`ReactiveError::ForeignRuntime`] instead of
/// reading someone else's graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuntimeId(u64);

impl RuntimeId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// A handle to a node in a runtime's graph.
pub trait Reactive {
    /// Get the node this handle refers to.
    fn node_id(&self) -> NodeId;

    /// Get the runtime that created the node.
    fn runtime_id(&self) -> RuntimeId;
}

/// What one run of a derived node or reaction produced.
#[derive(Debug, Default)]
pub(crate) struct Outcome {
    /// The cached output moved (per the node's equality).
    pub changed: bool,
    pub error: Option<ReactiveError>,
}

/// The type-erased body of a derived node or reaction.
pub(crate) trait Computation {
    fn run(&self, rt: &Runtime) -> Outcome;
}

type Cleanup = Box<dyn FnOnce()>;

/// Builder for a [`Runtime`].
#[derive(Default)]
pub struct RuntimeBuilder {
    observer: Option<Rc<dyn Observer>>,
    max_flush_runs: Option<usize>,
}

impl RuntimeBuilder {
    /// Deliver lifecycle events to `observer`.
    pub fn observer(mut self, observer: impl Observer + 'static) -> Self {
        self.observer = Some(Rc::new(observer));
        self
    }

    /// Cap the number of queue entries one flush may settle.
    pub fn max_flush_runs(mut self, limit: usize) -> Self {
        self.max_flush_runs = Some(limit.max(1));
        self
    }

    pub fn build(self) -> Runtime {
        Runtime {
            id: RuntimeId::new(),
            graph: RefCell::new(Graph::new()),
            clock: VersionClock::new(),
            queue: RefCell::new(WorkQueue::new()),
            tracking: TrackingStack::default(),
            computations: RefCell::new(SecondaryMap::new()),
            cleanups: RefCell::new(SecondaryMap::new()),
            batch_depth: Cell::new(0),
            derivations_running: Cell::new(0),
            flushing: Cell::new(false),
            observer: self.observer,
            max_flush_runs: self.max_flush_runs.unwrap_or(DEFAULT_MAX_FLUSH_RUNS),
        }
    }
}

/// An incremental computation graph.
///
/// Create nodes with [`cell`](Runtime::cell), [`derived`](Runtime::derived)
/// and [`reaction`](Runtime::reaction); every handle operation takes the
/// runtime that created it.
pub struct Runtime {
    id: RuntimeId,
    pub(super) graph: RefCell<Graph>,
    clock: VersionClock,
    queue: RefCell<WorkQueue>,
    pub(super) tracking: TrackingStack,
    computations: RefCell<SecondaryMap<NodeId, Rc<dyn Computation>>>,
    cleanups: RefCell<SecondaryMap<NodeId, SmallVec<[Cleanup; 1]>>>,
    batch_depth: Cell<u32>,
    /// Derived nodes currently on the call stack. Writes are refused while
    /// this is non-zero.
    pub(super) derivations_running: Cell<u32>,
    flushing: Cell<bool>,
    observer: Option<Rc<dyn Observer>>,
    max_flush_runs: usize,
}

impl Runtime {
    /// Create a runtime with default settings.
    pub fn new() -> Self {
        RuntimeBuilder::default().build()
    }

    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::default()
    }

    pub fn id(&self) -> RuntimeId {
        self.id
    }

    /// Current value of the version clock.
    pub fn clock(&self) -> u64 {
        self.clock.now()
    }

    /// Run `f` as one batch: writes inside it are propagated by a single
    /// flush when the outermost batch closes.
    ///
    /// The flush runs even if `f` fails; `f`'s error takes precedence.
    pub fn batch<R>(&self, f: impl FnOnce(&Runtime) -> Result<R>) -> Result<R> {
        let result = {
            let _batch = BatchGuard::enter(&self.batch_depth);
            debug!(depth = self.batch_depth.get(), "batch opened");
            f(self)
        };
        if self.batch_depth.get() > 0 {
            return result;
        }

        debug!("batch closed");
        let flushed = self.flush();
        let value = result?;
        flushed?;
        Ok(value)
    }

    /// Whether a batch is open.
    pub fn is_batching(&self) -> bool {
        self.batch_depth.get() > 0
    }

    /// Drain the work queue.
    ///
    /// Entries run in (height, creation order) order, and entries queued
    /// while draining are drained by the same call. Calling `flush` from
    /// inside a flush does nothing. Reaction failures are logged and
    /// reported to the observer without stopping the flush.
    pub fn flush(&self) -> Result<()> {
        if self.queue.borrow().is_empty() {
            return Ok(());
        }
        let Some(_flushing) = FlushGuard::try_enter(&self.flushing) else {
            return Ok(());
        };

        debug!(queued = self.queue.borrow().len(), "flush started");
        self.emit(|| GraphEvent::FlushStarted);

        let mut runs = 0;
        loop {
            let next = self.queue.borrow_mut().pop();
            let Some(id) = next else { break };

            let live = match self.graph.borrow_mut().node_mut(id) {
                Some(node) if !node.is(Status::DISPOSED) => {
                    node.clear(Status::NOTIFIED);
                    true
                }
                _ => false,
            };
            if !live {
                continue;
            }

            if runs == self.max_flush_runs {
                let dropped = self.abandon_queue() + 1;
                error!(
                    limit = self.max_flush_runs,
                    dropped, "flush exceeded its run budget, dropping queued work"
                );
                self.emit(|| GraphEvent::FlushEnded { runs });
                return Err(ReactiveError::FlushLimitExceeded {
                    limit: self.max_flush_runs,
                });
            }
            runs += 1;

            if let Err(err) = walker::refresh(self, id) {
                warn!(node = ?id, %err, "queued node failed to settle");
            }
        }

        debug!(runs, "flush ended");
        self.emit(|| GraphEvent::FlushEnded { runs });
        Ok(())
    }

    /// Run `f` without linking its reads to the running consumer.
    pub fn untracked<R>(&self, f: impl FnOnce(&Runtime) -> R) -> R {
        let _scope = Untracked::enter(&self.tracking);
        f(self)
    }

    /// Register a callback on the running derived node or reaction.
    ///
    /// It runs before that node's next run, or when the node is disposed.
    pub fn on_cleanup(&self, cleanup: impl FnOnce() + 'static) {
        let Some(owner) = self.tracking.owner() else {
            warn!("on_cleanup called outside a running node, callback dropped");
            return;
        };
        if let Some(entry) = self.cleanups.borrow_mut().entry(owner) {
            entry.or_default().push(Box::new(cleanup));
        }
    }

    /// Dispose a node. Disposing twice is a no-op.
    ///
    /// The node's edges are unlinked and its cleanups run. Derived consumers
    /// re-run on their next read and reactions reading it are queued, so
    /// they observe [`ReactiveError::Disposed`] rather than a stale value.
    pub fn dispose<N: Reactive + ?Sized>(&self, node: &N) -> Result<()> {
        self.check_owner(node.runtime_id())?;
        let id = node.node_id();

        let running = match self.graph.borrow_mut().node_mut(id) {
            None => return Ok(()),
            Some(record) if record.is(Status::DISPOSED) => return Ok(()),
            Some(record) => {
                record.mark(Status::DISPOSED);
                record.is(Status::RUNNING)
            }
        };
        // A node disposing itself is finished once its run returns
        if running {
            return Ok(());
        }
        self.finish_dispose(id)
    }

    /// Whether the node has been disposed.
    pub fn is_disposed<N: Reactive + ?Sized>(&self, node: &N) -> Result<bool> {
        self.inspect(node, |graph, id| {
            Some(graph.node(id).map_or(true, |record| record.is(Status::DISPOSED)))
        })
    }

    /// The clock value stamped when the node's output last changed.
    pub fn version<N: Reactive + ?Sized>(&self, node: &N) -> Result<u64> {
        self.inspect(node, |graph, id| graph.node(id).map(Node::version))
    }

    pub fn status<N: Reactive + ?Sized>(&self, node: &N) -> Result<Status> {
        self.inspect(node, |graph, id| graph.node(id).map(Node::status))
    }

    /// Longest path from a cell to the node.
    pub fn height<N: Reactive + ?Sized>(&self, node: &N) -> Result<u32> {
        self.inspect(node, |graph, id| graph.node(id).map(Node::height))
    }

    /// Number of producers the node read on its last run.
    pub fn dependency_count<N: Reactive + ?Sized>(&self, node: &N) -> Result<usize> {
        self.inspect(node, |graph, id| {
            graph.node(id).map(|_| graph.incoming(id).count())
        })
    }

    /// Number of consumers that read the node.
    pub fn subscriber_count<N: Reactive + ?Sized>(&self, node: &N) -> Result<usize> {
        self.inspect(node, |graph, id| {
            graph.node(id).map(|_| graph.outgoing(id).count())
        })
    }

    pub fn node_count(&self) -> usize {
        self.graph.borrow().node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.borrow().edge_count()
    }

    /// Copy the graph's current shape.
    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot::capture(&self.graph.borrow(), self.clock.now())
    }

    fn inspect<N, T>(&self, node: &N, f: impl FnOnce(&Graph, NodeId) -> Option<T>) -> Result<T>
    where
        N: Reactive + ?Sized,
    {
        self.check_owner(node.runtime_id())?;
        let graph = self.graph.borrow();
        f(&graph, node.node_id()).ok_or(ReactiveError::Disposed)
    }

    pub(crate) fn register(
        &self,
        kind: NodeKind,
        computation: Option<Rc<dyn Computation>>,
    ) -> NodeId {
        let id = self.graph.borrow_mut().add_node(kind, self.clock.now());
        if let Some(computation) = computation {
            self.computations.borrow_mut().insert(id, computation);
        }
        debug!(node = ?id, ?kind, "node created");
        self.emit(|| GraphEvent::NodeCreated { node: id, kind });
        id
    }

    pub(crate) fn check_owner(&self, owner: RuntimeId) -> Result<()> {
        if owner == self.id {
            Ok(())
        } else {
            Err(ReactiveError::ForeignRuntime)
        }
    }

    pub(crate) fn check_alive(&self, id: NodeId) -> Result<()> {
        match self.graph.borrow().node(id) {
            Some(node) if !node.is(Status::DISPOSED) => Ok(()),
            _ => Err(ReactiveError::Disposed),
        }
    }

    pub(crate) fn check_writable(&self) -> Result<()> {
        if self.derivations_running.get() > 0 {
            return Err(ReactiveError::WriteDuringDerivation);
        }
        Ok(())
    }

    /// Link `producer` to the running consumer, if there is one.
    pub(crate) fn track(&self, producer: NodeId) {
        let Some((consumer, cursor)) = self.tracking.top() else {
            return;
        };
        let step = walker::link(&mut self.graph.borrow_mut(), producer, consumer, cursor);
        self.tracking.advance(step.cursor);
        if step.created {
            trace!(?producer, ?consumer, "edge linked");
            self.emit(|| GraphEvent::EdgeLinked { producer, consumer });
        }
    }

    /// Publish a cell write whose value already changed.
    pub(crate) fn commit_write(&self, id: NodeId) -> Result<()> {
        let version = self.clock.advance();
        let has_consumers = {
            let mut graph = self.graph.borrow_mut();
            let node = graph.node_mut(id).ok_or(ReactiveError::Disposed)?;
            node.set_version(version);
            node.set_checked_at(version);
            node.has_consumers()
        };
        trace!(node = ?id, version, "cell written");

        if has_consumers {
            self.invalidate_consumers(id);
        }
        if self.batch_depth.get() == 0 {
            self.flush()?;
        }
        Ok(())
    }

    fn invalidate_consumers(&self, producer: NodeId) {
        let consumers: SmallVec<[NodeId; 8]> = self
            .graph
            .borrow()
            .outgoing(producer)
            .map(|(_, edge)| edge.to())
            .collect();
        self.notify_consumers(&consumers, Status::STALE);
    }

    /// Mark consumers with `flags`, then carry `STALE` down through derived
    /// nodes and queue every reaction it reaches.
    ///
    /// A derived node that was already `STALE` stops the walk: everything
    /// below it was marked by the earlier push and has not settled since.
    fn notify_consumers(&self, consumers: &[NodeId], flags: Status) {
        let mut graph = self.graph.borrow_mut();
        let mut queue = self.queue.borrow_mut();
        let mut pending: SmallVec<[(NodeId, Status); 16]> =
            consumers.iter().map(|&id| (id, flags)).collect();

        while let Some((id, flags)) = pending.pop() {
            let Some(node) = graph.node_mut(id) else { continue };
            if node.is(Status::DISPOSED) {
                continue;
            }
            match node.kind() {
                NodeKind::Reaction => {
                    node.mark(flags);
                    if !node.is(Status::NOTIFIED) {
                        node.mark(Status::NOTIFIED);
                        queue.push(id, node);
                        trace!(node = ?id, height = node.height(), "reaction queued");
                    }
                }
                NodeKind::Derived => {
                    let marked = node.is(Status::STALE);
                    node.mark(flags);
                    if !marked {
                        pending.extend(
                            graph
                                .outgoing(id)
                                .map(|(_, edge)| (edge.to(), Status::STALE)),
                        );
                    }
                }
                NodeKind::Cell => {}
            }
        }
    }

    /// Clear the queue, returning how many entries were dropped.
    fn abandon_queue(&self) -> usize {
        let dropped = self.queue.borrow_mut().drain();
        let mut graph = self.graph.borrow_mut();
        for &id in &dropped {
            if let Some(node) = graph.node_mut(id) {
                node.clear(Status::NOTIFIED);
            }
        }
        dropped.len()
    }

    /// Run a derived node or reaction and publish the result.
    fn run_node(&self, id: NodeId) -> Result<()> {
        let computation = self
            .computations
            .borrow()
            .get(id)
            .cloned()
            .ok_or(ReactiveError::Disposed)?;
        let kind = {
            let mut graph = self.graph.borrow_mut();
            let node = graph.node_mut(id).ok_or(ReactiveError::Disposed)?;
            // Cleared up front: a write made by this run may set STALE again
            node.clear(Status::PENDING | Status::STALE);
            node.kind()
        };
        self.run_cleanups(id);

        let context = ReactiveContext::enter(self, id, kind);
        let outcome = computation.run(self);
        let cursor = context.exit();

        let removed = walker::prune(&mut self.graph.borrow_mut(), id, cursor);
        for producer in removed {
            self.unlinked(producer, id);
        }

        let disposed = self
            .graph
            .borrow()
            .node(id)
            .map_or(true, |node| node.is(Status::DISPOSED));
        if disposed {
            return self.finish_dispose(id);
        }

        {
            let mut graph = self.graph.borrow_mut();
            walker::reshape(&mut graph, id);
            let version = outcome.changed.then(|| self.clock.advance());
            let now = self.clock.now();
            if let Some(node) = graph.node_mut(id) {
                node.set(Status::HAS_ERROR, outcome.error.is_some());
                if let Some(version) = version {
                    node.set_version(version);
                }
                if !node.is(Status::STALE) {
                    node.set_checked_at(now);
                }
            }
        }

        let changed = outcome.changed;
        debug!(node = ?id, ?kind, changed, "node recomputed");
        self.emit(|| GraphEvent::NodeRecomputed { node: id, changed });

        if kind == NodeKind::Reaction {
            if let Some(err) = outcome.error {
                warn!(node = ?id, %err, "reaction failed");
                self.emit(|| GraphEvent::ReactionFailed {
                    node: id,
                    error: err.to_string(),
                });
            }
        }
        Ok(())
    }

    fn finish_dispose(&self, id: NodeId) -> Result<()> {
        let (producers, consumers) = {
            let mut graph = self.graph.borrow_mut();
            let producers = walker::prune(&mut graph, id, None);
            let consumers = walker::detach_consumers(&mut graph, id);
            (producers, consumers)
        };
        for &producer in &producers {
            self.unlinked(producer, id);
        }
        for &consumer in &consumers {
            self.unlinked(id, consumer);
        }
        self.notify_consumers(&consumers, Status::PENDING | Status::STALE);

        self.graph.borrow_mut().remove_node(id);
        let computation = self.computations.borrow_mut().remove(id);
        drop(computation);
        self.run_cleanups(id);

        debug!(node = ?id, "node disposed");
        self.emit(|| GraphEvent::NodeDisposed { node: id });

        if self.batch_depth.get() == 0 {
            self.flush()?;
        }
        Ok(())
    }

    fn unlinked(&self, producer: NodeId, consumer: NodeId) {
        trace!(?producer, ?consumer, "edge unlinked");
        self.emit(|| GraphEvent::EdgeUnlinked { producer, consumer });
    }

    fn run_cleanups(&self, id: NodeId) {
        let cleanups = self.cleanups.borrow_mut().remove(id);
        for cleanup in cleanups.into_iter().flatten() {
            cleanup();
        }
    }

    fn emit(&self, event: impl FnOnce() -> GraphEvent) {
        if let Some(observer) = &self.observer {
            observer.on_event(&event());
        }
    }
}

impl Resolve for Runtime {
    fn graph(&self) -> Ref<'_, Graph> {
        self.graph.borrow()
    }

    fn graph_mut(&self) -> RefMut<'_, Graph> {
        self.graph.borrow_mut()
    }

    fn clock(&self) -> u64 {
        self.clock.now()
    }

    fn rerun(&self, node: NodeId) -> Result<()> {
        self.run_node(node)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("id", &self.id)
            .field("clock", &self.clock.now())
            .field("nodes", &self.node_count())
            .field("edges", &self.edge_count())
            .field("queued", &self.queue.borrow().len())
            .finish()
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        let cleanups = std::mem::take(self.cleanups.get_mut());
        for (_, list) in cleanups {
            for cleanup in list {
                cleanup();
            }
        }
    }
}
