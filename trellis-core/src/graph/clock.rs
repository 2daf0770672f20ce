//! Version Clock
//!
//! One counter per runtime. Cell writes advance it, as do derived recomputes
//! whose output actually changed. Node versions are stamps taken from it, so
//! "did this producer change since I read it" is a single `>` comparison.

use std::cell::Cell;

#[derive(Debug, Default)]
pub struct VersionClock {
    now: Cell<u64>,
}

impl VersionClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current clock value.
    pub fn now(&self) -> u64 {
        self.now.get()
    }

    /// Advance the clock and return the new value.
    pub fn advance(&self) -> u64 {
        let next = self.now.get() + 1;
        self.now.set(next);
        next
    }
}
