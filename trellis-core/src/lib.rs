//! Trellis Core
//!
//! This crate provides the runtime for Trellis, an incremental computation
//! graph. It implements:
//!
//! - Reactive primitives (cells, derived nodes, reactions)
//! - Automatic dependency discovery with dynamic edge sets
//! - Glitch-free push/pull propagation ordered by graph height
//! - Batching, lifecycle observation and graph snapshots
//!
//! # Architecture
//!
//! The crate is organized into two modules:
//!
//! - `graph`: the dependency graph as plain data, and the algorithms that
//!   walk it (linking, pruning, staleness, the work queue)
//! - `reactive`: typed handles and the runtime that owns the graph
//!
//! # Example
//!
//! ```rust
//! use trellis_core::Runtime;
//!
//! let rt = Runtime::new();
//!
//! // Create a cell
//! let count = rt.cell(1);
//!
//! // Create a derived value
//! let source = count.clone();
//! let doubled = rt.derived(move |rt| Ok(source.read(rt)? * 2));
//!
//! // Create a reaction
//! let watched = doubled.clone();
//! let _log = rt.reaction(move |rt| {
//!     println!("doubled: {}", watched.read(rt)?);
//!     Ok(())
//! })?;
//!
//! // Update the cell: the reaction runs again and prints "doubled: 10"
//! count.write(&rt, 5)?;
//! assert_eq!(doubled.read(&rt)?, 10);
//! # Ok::<(), trellis_core::ReactiveError>(())
//! ```

pub mod error;
pub mod graph;
pub mod reactive;

pub use error::{ReactiveError, Result, SnapshotError};
pub use graph::{GraphSnapshot, NodeId, NodeKind, Status};
pub use reactive::{
    Cell, Derived, GraphEvent, Observer, Reaction, Reactive, Runtime, RuntimeBuilder, RuntimeId,
};
