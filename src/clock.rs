//! Monotonic clock abstraction shared by every timed component.
//!
//! Timeouts, backoff, TTLs and render pacing all read milliseconds from a
//! [`Clock`] instead of calling `Instant::now()` directly. The simulated clock
//! advances only when something sleeps on it, which lets the full connection
//! scenarios run in tests without waiting for real time to pass.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Source of monotonic time and the only way timed code is allowed to wait.
pub trait Clock: Send + Sync {
    /// Milliseconds since the clock was created. Never goes backwards.
    fn now_ms(&self) -> u64;

    /// Block the calling thread (or advance simulated time) for `duration`.
    fn sleep(&self, duration: Duration);

    /// Check if this is a simulated clock
    fn is_simulated(&self) -> bool {
        false
    }
}

pub type SharedClock = Arc<dyn Clock>;

/// Real monotonic time anchored at construction.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn shared() -> SharedClock {
        Arc::new(Self::new())
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Fast-forward clock: `sleep` jumps time instantly by the requested amount.
///
/// Several threads may share one simulated clock. Each sleep yields the
/// current thread so the others get a chance to observe the new time.
pub struct SimulatedClock {
    now: AtomicU64,
}

impl SimulatedClock {
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    pub fn starting_at(ms: u64) -> Self {
        Self {
            now: AtomicU64::new(ms),
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Move time forward without sleeping.
    pub fn advance(&self, duration: Duration) {
        self.now
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Default for SimulatedClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SimulatedClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
        std::thread::yield_now();
    }

    fn is_simulated(&self) -> bool {
        true
    }
}

/// Recurring timer polled from a loop; never blocks.
#[derive(Debug, Clone)]
pub struct Interval {
    period_ms: u64,
    next_ms: u64,
}

impl Interval {
    /// First tick fires one full period after `now_ms`.
    pub fn new(period: Duration, now_ms: u64) -> Self {
        let period_ms = period.as_millis() as u64;
        Self {
            period_ms,
            next_ms: now_ms.saturating_add(period_ms),
        }
    }

    /// First tick fires on the next poll.
    pub fn immediate(period: Duration, now_ms: u64) -> Self {
        Self {
            period_ms: period.as_millis() as u64,
            next_ms: now_ms,
        }
    }

    /// Returns true once per elapsed period. Missed periods collapse into one tick.
    pub fn poll(&mut self, now_ms: u64) -> bool {
        if now_ms < self.next_ms {
            return false;
        }
        let behind = now_ms - self.next_ms;
        if behind >= self.period_ms {
            self.next_ms = now_ms.saturating_add(self.period_ms);
        } else {
            self.next_ms = self.next_ms.saturating_add(self.period_ms);
        }
        true
    }

    /// Restart the period from `now_ms`.
    pub fn reset(&mut self, now_ms: u64) {
        self.next_ms = now_ms.saturating_add(self.period_ms);
    }

    /// Make the next poll fire regardless of elapsed time.
    pub fn trigger_now(&mut self, now_ms: u64) {
        self.next_ms = now_ms;
    }

    pub fn remaining_ms(&self, now_ms: u64) -> u64 {
        self.next_ms.saturating_sub(now_ms)
    }

    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

/// One-shot deadline. `None` duration means it never expires.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    expires_at_ms: Option<u64>,
}

impl Deadline {
    pub fn after(duration: Option<Duration>, now_ms: u64) -> Self {
        Self {
            expires_at_ms: duration.map(|d| now_ms.saturating_add(d.as_millis() as u64)),
        }
    }

    pub fn never() -> Self {
        Self {
            expires_at_ms: None,
        }
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.expires_at_ms.is_some_and(|at| now_ms >= at)
    }

    /// Remaining time, or `None` for an unbounded deadline.
    pub fn remaining(&self, now_ms: u64) -> Option<Duration> {
        self.expires_at_ms
            .map(|at| Duration::from_millis(at.saturating_sub(now_ms)))
    }
}
