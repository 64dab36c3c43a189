//! # Completion Barrier
//!
//! One-shot countdown latch that keeps the main game thread in sync with
//! the reset workers.
//!
//! ```text
//!   Main thread:   new(N) ──> submit N tasks ──> wait() ─────────────┐
//!                                                                    │
//!   Worker 1:      reset ──> arrive()  (N-1)                         │
//!   Worker 2:      reset ──> arrive()  (N-2)                         │
//!   ...                                                              │
//!   Worker k:      reset ──> arrive()  (0) ──> notify ───────────────┘
//! ```
//!
//! Once the count reaches zero the barrier is terminal: it never goes
//! negative and is never reused for another tick.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::BarrierError;

/// What a single [`CompletionBarrier::arrive`] did to the count.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Arrival {
    /// Recorded; this many arrivals are still outstanding.
    Pending(usize),
    /// Recorded; this was the last one and the waiter has been released.
    Released,
    /// The barrier was already at zero. Nothing was recorded.
    Overflow,
}

/// One-shot counting barrier.
///
/// Initialized to the number of tasks dispatched for a tick. Each task
/// arrives exactly once; a single waiter blocks until all have.
pub struct CompletionBarrier {
    /// Arrivals expected in total.
    expected: usize,
    /// Arrivals still outstanding.
    remaining: Mutex<usize>,
    /// Signalled when `remaining` hits zero.
    released: Condvar,
    /// Set by the first wait.
    waited: AtomicBool,
}

impl CompletionBarrier {
    /// Creates a barrier expecting `count` arrivals.
    ///
    /// A barrier created with `count == 0` is already released.
    #[must_use]
    pub fn new(count: usize) -> Self {
        Self {
            expected: count,
            remaining: Mutex::new(count),
            released: Condvar::new(),
            waited: AtomicBool::new(false),
        }
    }

    /// Returns the number of arrivals the barrier was created for.
    #[inline]
    #[must_use]
    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Returns the number of arrivals still outstanding.
    #[inline]
    #[must_use]
    pub fn remaining(&self) -> usize {
        *self.remaining.lock()
    }

    /// Returns true once every expected arrival has happened.
    #[inline]
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.remaining() == 0
    }

    /// Records one arrival.
    ///
    /// An arrival on a released barrier means the dispatcher sized the
    /// barrier wrong. It is logged and ignored so the count can never
    /// go negative.
    pub fn arrive(&self) -> Arrival {
        let mut remaining = self.remaining.lock();
        match *remaining {
            0 => {
                drop(remaining);
                tracing::error!(
                    expected = self.expected,
                    "completion barrier received an arrival after release"
                );
                Arrival::Overflow
            }
            1 => {
                *remaining = 0;
                self.released.notify_all();
                Arrival::Released
            }
            n => {
                *remaining = n - 1;
                Arrival::Pending(n - 1)
            }
        }
    }

    /// Blocks until every expected arrival has happened.
    ///
    /// # Errors
    ///
    /// Returns [`BarrierError::AlreadyWaited`] if the barrier was already
    /// waited on.
    pub fn wait(&self) -> Result<(), BarrierError> {
        self.claim_waiter()?;

        let mut remaining = self.remaining.lock();
        while *remaining > 0 {
            self.released.wait(&mut remaining);
        }
        Ok(())
    }

    /// Blocks until every expected arrival has happened, or `timeout`
    /// elapses.
    ///
    /// # Errors
    ///
    /// Returns [`BarrierError::Timeout`] with the outstanding count if the
    /// timeout expires first, and [`BarrierError::AlreadyWaited`] if the
    /// barrier was already waited on.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<(), BarrierError> {
        let start = Instant::now();
        let Some(deadline) = start.checked_add(timeout) else {
            return self.wait();
        };
        self.claim_waiter()?;

        let mut remaining = self.remaining.lock();
        while *remaining > 0 {
            if self.released.wait_until(&mut remaining, deadline).timed_out() && *remaining > 0 {
                return Err(BarrierError::Timeout {
                    waited: start.elapsed(),
                    remaining: *remaining,
                });
            }
        }
        Ok(())
    }

    /// Marks the barrier as consumed by its single waiter.
    fn claim_waiter(&self) -> Result<(), BarrierError> {
        if self.waited.swap(true, Ordering::AcqRel) {
            return Err(BarrierError::AlreadyWaited);
        }
        Ok(())
    }
}

impl fmt::Debug for CompletionBarrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionBarrier")
            .field("expected", &self.expected)
            .field("remaining", &self.remaining())
            .finish_non_exhaustive()
    }
}

/// Arrives at a barrier exactly once, when dropped.
///
/// Owning the arrival in a guard makes the decrement structural: it runs
/// on success, on failure, on panic, and when the owning task is dropped
/// without ever running.
#[must_use = "dropping the guard arrives at the barrier immediately"]
pub struct ArrivalGuard {
    barrier: Arc<CompletionBarrier>,
}

impl ArrivalGuard {
    /// Binds one future arrival to `barrier`.
    pub fn new(barrier: Arc<CompletionBarrier>) -> Self {
        Self { barrier }
    }

    /// Returns the barrier this guard will arrive at.
    #[inline]
    #[must_use]
    pub fn barrier(&self) -> &CompletionBarrier {
        &self.barrier
    }
}

impl Drop for ArrivalGuard {
    fn drop(&mut self) {
        self.barrier.arrive();
    }
}

impl fmt::Debug for ArrivalGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrivalGuard")
            .field("barrier", &self.barrier)
            .finish()
    }
}
