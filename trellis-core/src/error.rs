//! Error types for the Trellis runtime.
//!
//! [`ReactiveError`] is what graph operations report. It is `Clone` and
//! `PartialEq` because derived nodes cache the error their derivation raised
//! and hand a copy to every reader until the next recompute.

use std::rc::Rc;

use thiserror::Error;

/// Result type for graph operations.
pub type Result<T> = std::result::Result<T, ReactiveError>;

/// Errors raised by reads, writes and derivations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReactiveError {
    /// The node was disposed and can no longer be read or written.
    #[error("node has been disposed")]
    Disposed,

    /// A derived node was reached again while its own derivation was running.
    #[error("dependency cycle: node was read while it was recomputing")]
    Cycle,

    /// A cell was written while a derived node was computing.
    #[error("cells cannot be written while a derived value is being computed")]
    WriteDuringDerivation,

    /// A handle was used with a runtime other than the one that created it.
    #[error("node belongs to a different runtime")]
    ForeignRuntime,

    /// A flush ran more nodes than the runtime allows; the queue was dropped.
    #[error("flush exceeded {limit} runs, a reaction keeps re-triggering itself")]
    FlushLimitExceeded { limit: usize },

    /// A derivation or reaction reported its own failure.
    #[error("derivation failed: {0}")]
    Derivation(Rc<str>),
}

impl ReactiveError {
    /// Build a [`ReactiveError::Derivation`] from a message.
    pub fn derivation(message: impl Into<Rc<str>>) -> Self {
        Self::Derivation(message.into())
    }
}

/// Errors raised while encoding or decoding a [`GraphSnapshot`](crate::graph::GraphSnapshot).
#[derive(Error, Debug)]
pub enum SnapshotError {
    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MessagePack encode error.
    #[error("MessagePack encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// MessagePack decode error.
    #[error("MessagePack decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}
