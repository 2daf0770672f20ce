//! Lifecycle observation.
//!
//! An [`Observer`] sees what the runtime does without taking part in it:
//! devtools, loggers and tests plug in here. It is handed to
//! [`RuntimeBuilder::observer`](super::RuntimeBuilder::observer) when the
//! runtime is built.

use std::rc::Rc;

use serde::Serialize;

use crate::graph::{NodeId, NodeKind};

/// Something that happened in a runtime's graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GraphEvent {
    NodeCreated { node: NodeId, kind: NodeKind },
    /// A derived node or reaction ran. `changed` is whether its output moved.
    NodeRecomputed { node: NodeId, changed: bool },
    NodeDisposed { node: NodeId },
    EdgeLinked { producer: NodeId, consumer: NodeId },
    EdgeUnlinked { producer: NodeId, consumer: NodeId },
    FlushStarted,
    /// `runs` counts the queue entries settled by the flush.
    FlushEnded { runs: usize },
    ReactionFailed { node: NodeId, error: String },
}

/// Receives [`GraphEvent`]s from a runtime.
pub trait Observer {
    fn on_event(&self, event: &GraphEvent);
}

impl<F> Observer for F
where
    F: Fn(&GraphEvent),
{
    fn on_event(&self, event: &GraphEvent) {
        self(event)
    }
}

impl<O> Observer for Rc<O>
where
    O: Observer + ?Sized,
{
    fn on_event(&self, event: &GraphEvent) {
        (**self).on_event(event)
    }
}
