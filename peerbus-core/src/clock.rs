//! A per-peer Lamport-style logical clock.
//!
//! Not part of the collaborator interfaces in spec §6 — the spec exposes
//! `tick`/`sync` on the *queue* — but every concrete [`crate::queue::Queue`]
//! needs a monotonic counter underneath those two calls, so it lives here
//! as a small reusable building block, the way `panda-kernel`'s `RTC`
//! wraps a raw timestamp source for the scheduler.

use core::sync::atomic::{AtomicU64, Ordering};

/// The smallest even value strictly greater than `current`.
///
/// `current` even → `current + 2`; `current` odd → `current + 1`. Either
/// way the result is even, which is what [`LogicalClock::tick`] needs: its
/// return value becomes a commit timestamp, and [`peerbus_abi::Timestamp`]'s
/// low bit must be clear for a committed slot.
fn next_even(current: u64) -> u64 {
    current + 2 - (current & 1)
}

/// The smallest even value greater than or equal to `t`.
fn round_up_even(t: u64) -> u64 {
    t + (t & 1)
}

/// A monotonically non-decreasing 64-bit counter.
///
/// `tick` always advances to a fresh *even* value — staging a node at
/// `tick() - 1` and committing it at `tick()` must land on the two halves
/// of one [`peerbus_abi::Timestamp`] slot (spec §6: "the low bit
/// distinguishes staging from committed"), which only holds if every
/// value this clock hands out as a commit timestamp is even. `sync` only
/// advances forward, never back, and also rounds the value it syncs to up
/// to even, so a clock never gets stuck holding an odd value no
/// subsequent `tick()` could have produced on its own.
#[derive(Debug, Default)]
pub struct LogicalClock {
    value: AtomicU64,
}

impl LogicalClock {
    /// A clock starting at `initial`. Not rounded to even at construction —
    /// a peer's starting clock value is whatever the embedder already had;
    /// only values this clock itself hands out as commit timestamps need
    /// to be even, and the first `tick()` or `sync()` call establishes that.
    pub const fn new(initial: u64) -> Self {
        LogicalClock {
            value: AtomicU64::new(initial),
        }
    }

    /// Advance the clock to a fresh even value strictly greater than the
    /// current one, and return it.
    pub fn tick(&self) -> u64 {
        let mut current = self.value.load(Ordering::Acquire);
        loop {
            let next = next_even(current);
            match self.value.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return next,
                Err(observed) => current = observed,
            }
        }
    }

    /// Advance the clock to at least `t` (rounded up to even if odd),
    /// returning the resulting value.
    ///
    /// Uses a CAS loop rather than `fetch_max` so the return value is
    /// always the post-sync value this call observed, not a value some
    /// concurrent racer already moved past.
    pub fn sync(&self, t: u64) -> u64 {
        let target = round_up_even(t);
        let mut current = self.value.load(Ordering::Acquire);
        loop {
            if current >= target {
                return current;
            }
            match self.value.compare_exchange_weak(
                current,
                target,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return target,
                Err(observed) => current = observed,
            }
        }
    }

    /// The current value without advancing it.
    pub fn current(&self) -> u64 {
        self.value.load(Ordering::Acquire)
    }
}
