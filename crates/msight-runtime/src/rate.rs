//! # Rate Controller
//!
//! Gap-based subsampling: publish 1 of every `gap + 1` items, deterministically
//! the 1st, `gap+2`-th, and so on since node start.
//!
//! The counter is per node instance and lives only in memory; a process
//! restart resets the phase.

use std::sync::atomic::{AtomicU64, Ordering};

/// Deterministic gap-based subsampler.
///
/// # Contract
///
/// Item `n` (0-based, counting every item considered) is admitted iff
/// `n % (gap + 1) == 0`. The counter increments exactly once per call, also
/// under concurrent use - this is the thread-safety the ServerSource
/// hand-off path relies on.
pub struct RateController {
    gap: u32,
    counter: AtomicU64,
}

impl RateController {
    /// Create a controller with the given gap. `gap == 0` admits everything.
    #[must_use]
    pub fn new(gap: u32) -> Self {
        Self {
            gap,
            counter: AtomicU64::new(0),
        }
    }

    /// Consider one item; returns whether it passes.
    pub fn admit(&self) -> bool {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        n % (u64::from(self.gap) + 1) == 0
    }

    /// Total items considered so far (admitted and dropped).
    pub fn considered(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }

    /// The configured gap.
    #[must_use]
    pub fn gap(&self) -> u32 {
        self.gap
    }
}
