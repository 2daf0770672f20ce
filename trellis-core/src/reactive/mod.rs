//! Reactive Primitives
//!
//! This module implements the user-facing side of the graph: cells, derived
//! nodes and reactions, plus the runtime that owns them.
//!
//! # Concepts
//!
//! ## Cells
//!
//! A Cell is a container for mutable state. When a cell is read while a
//! derived node or reaction runs, the two are linked. When the cell's value
//! changes, everything linked to it is invalidated.
//!
//! ## Derived Nodes
//!
//! A Derived node caches a value computed from other nodes. It re-evaluates
//! only when one of the inputs it actually read has changed, and only on
//! demand.
//!
//! ## Reactions
//!
//! A Reaction is a side-effecting computation that re-runs whenever its
//! inputs change. Reactions are queued rather than run inline, and the queue
//! is drained in height order, so a reaction never sees a half-updated graph.
//!
//! # Implementation Notes
//!
//! Dependencies are discovered while a computation runs: the runtime keeps a
//! stack of running consumers, and every read links against the top one.
//! There is no global state; each operation takes the [`Runtime`] it belongs
//! to.

mod batch;
mod cell;
mod context;
mod derived;
mod observer;
mod reaction;
mod runtime;

pub use cell::Cell;
pub use derived::Derived;
pub use observer::{GraphEvent, Observer};
pub use reaction::Reaction;
pub use runtime::{Reactive, Runtime, RuntimeBuilder, RuntimeId};
