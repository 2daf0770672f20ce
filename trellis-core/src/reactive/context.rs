//! Reactive Context
//!
//! The reactive context tracks which consumer is currently running, so that
//! reads can be linked to it.
//!
//! # Implementation
//!
//! Each runtime owns a stack of frames. Running a derived node or reaction
//! pushes a frame for it; an untracked scope pushes a frame with no consumer,
//! which hides the enclosing consumer from reads. The top frame also carries
//! the confirmation cursor used by [`walker::link`](crate::graph::walker::link).
//!
//! Frames are popped by drop guards, so the stack stays balanced even if a
//! derivation panics.

use std::cell::RefCell;

use smallvec::SmallVec;

use super::runtime::Runtime;
use crate::graph::{EdgeId, NodeId, NodeKind, Status};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Frame {
    /// `None` for untracked scopes.
    pub consumer: Option<NodeId>,
    /// Last incoming edge confirmed by this run.
    pub cursor: Option<EdgeId>,
}

/// Per-runtime stack of running consumers.
#[derive(Debug, Default)]
pub(crate) struct TrackingStack {
    frames: RefCell<SmallVec<[Frame; 8]>>,
}

impl TrackingStack {
    pub fn push(&self, consumer: Option<NodeId>) {
        self.frames.borrow_mut().push(Frame {
            consumer,
            cursor: None,
        });
    }

    pub fn pop(&self) -> Option<Frame> {
        self.frames.borrow_mut().pop()
    }

    /// The consumer reads should link against, with its cursor.
    pub fn top(&self) -> Option<(NodeId, Option<EdgeId>)> {
        let frames = self.frames.borrow();
        let frame = frames.last()?;
        frame.consumer.map(|consumer| (consumer, frame.cursor))
    }

    /// Move the top frame's cursor.
    pub fn advance(&self, cursor: Option<EdgeId>) {
        if let Some(frame) = self.frames.borrow_mut().last_mut() {
            frame.cursor = cursor;
        }
    }

    /// The nearest running consumer, looking through untracked scopes.
    pub fn owner(&self) -> Option<NodeId> {
        self.frames
            .borrow()
            .iter()
            .rev()
            .find_map(|frame| frame.consumer)
    }

    #[cfg(test)]
    pub fn depth(&self) -> usize {
        self.frames.borrow().len()
    }
}

/// Guard for one run of a derived node or reaction.
///
/// Entering pushes a frame and sets `RUNNING`. [`exit`](Self::exit) (or
/// dropping the guard) undoes both and hands back the frame's cursor.
pub(crate) struct ReactiveContext<'rt> {
    rt: &'rt Runtime,
    node: NodeId,
    derived: bool,
    active: bool,
}

impl<'rt> ReactiveContext<'rt> {
    pub fn enter(rt: &'rt Runtime, node: NodeId, kind: NodeKind) -> Self {
        rt.tracking.push(Some(node));
        if let Some(record) = rt.graph.borrow_mut().node_mut(node) {
            record.mark(Status::RUNNING);
        }
        let derived = kind == NodeKind::Derived;
        if derived {
            rt.derivations_running.set(rt.derivations_running.get() + 1);
        }

        Self {
            rt,
            node,
            derived,
            active: true,
        }
    }

    /// Leave the context, returning the last confirmed edge.
    pub fn exit(mut self) -> Option<EdgeId> {
        self.leave()
    }

    fn leave(&mut self) -> Option<EdgeId> {
        if !self.active {
            return None;
        }
        self.active = false;

        let frame = self.rt.tracking.pop();
        debug_assert_eq!(
            frame.and_then(|frame| frame.consumer),
            Some(self.node),
            "ReactiveContext mismatch"
        );

        // Unwinding may leave the graph borrowed further up
        if let Ok(mut graph) = self.rt.graph.try_borrow_mut() {
            if let Some(record) = graph.node_mut(self.node) {
                record.clear(Status::RUNNING);
            }
        }
        if self.derived {
            let running = self.rt.derivations_running.get();
            self.rt.derivations_running.set(running.saturating_sub(1));
        }

        frame.and_then(|frame| frame.cursor)
    }
}

impl Drop for ReactiveContext<'_> {
    fn drop(&mut self) {
        self.leave();
    }
}

/// Guard for an untracked scope.
pub(crate) struct Untracked<'a> {
    stack: &'a TrackingStack,
}

impl<'a> Untracked<'a> {
    pub fn enter(stack: &'a TrackingStack) -> Self {
        stack.push(None);
        Self { stack }
    }
}

impl Drop for Untracked<'_> {
    fn drop(&mut self) {
        self.stack.pop();
    }
}
