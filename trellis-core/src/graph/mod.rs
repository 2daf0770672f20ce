//! Dependency Graph
//!
//! This module implements the dependency graph that links reactive values
//! to the computations that read them.
//!
//! # Overview
//!
//! - Nodes represent cells, derived values and reactions.
//! - Edges represent confirmed reads: if D read C during its last run, there
//!   is an edge from C to D.
//!
//! When a cell changes, its direct consumers are marked and queued. The
//! walker then decides, per consumer, whether any input really moved before
//! anything is recomputed.
//!
//! # Design Decisions
//!
//! 1. Nodes and edges live in slot-map arenas owned by one runtime. Ids are
//!    generational, so a handle to a disposed node can never alias a newer
//!    one.
//!
//! 2. Each edge sits in two linked lists at once (the consumer's producers
//!    and the producer's consumers), with links stored as arena keys. That
//!    keeps relinking and unlinking O(1).
//!
//! 3. The graph holds no values or closures. It is plain data, which keeps
//!    the walker testable on its own.

mod clock;
mod edge;
mod node;
mod scheduler;
mod snapshot;
mod store;
pub(crate) mod walker;

pub use clock::VersionClock;
pub use edge::{Edge, EdgeId};
pub use node::{Node, NodeId, NodeKind, Status};
pub use scheduler::WorkQueue;
pub use snapshot::{EdgeSnapshot, GraphSnapshot, NodeSnapshot};
pub use store::{Graph, Incoming, Outgoing};
