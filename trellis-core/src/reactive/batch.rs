//! Batch and flush guards.
//!
//! A batch is a depth counter: writes made while it is above zero only mark
//! and queue, and the flush happens when the outermost batch closes. The
//! flushing flag makes a nested flush call a no-op. Both are restored by drop
//! guards so a panicking closure does not leave the runtime stuck in a batch.

use std::cell::Cell;

/// Holds one level of batch depth.
pub(crate) struct BatchGuard<'a> {
    depth: &'a Cell<u32>,
}

impl<'a> BatchGuard<'a> {
    pub fn enter(depth: &'a Cell<u32>) -> Self {
        depth.set(depth.get() + 1);
        Self { depth }
    }
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        self.depth.set(self.depth.get().saturating_sub(1));
    }
}

/// Marks a flush in progress.
pub(crate) struct FlushGuard<'a> {
    flushing: &'a Cell<bool>,
}

impl<'a> FlushGuard<'a> {
    /// Returns `None` if a flush is already running.
    pub fn try_enter(flushing: &'a Cell<bool>) -> Option<Self> {
        if flushing.replace(true) {
            return None;
        }
        Some(Self { flushing })
    }
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.flushing.set(false);
    }
}
