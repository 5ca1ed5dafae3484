//! Single token-bucket capacity/refill math.
//!
//! Lazy refill-on-access, parameterized by `capacity`/`refill_rate` so one
//! type can back a bucket for any [`super::tier::Tier`].

use std::time::{Duration, Instant};

/// Outcome of [`TokenBucket::try_take`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TakeResult {
    Allowed,
    Denied {
        retry_after: Duration,
        /// `true` when `n` exceeds `capacity` — no amount of waiting will
        /// ever satisfy this request.
        permanent: bool,
    },
}

/// A single token bucket. Not `Sync` on its own — callers hold it behind a
/// per-entry lock (see [`super::registry::RateLimiterRegistry`]).
#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: f64,
    refill_rate: f64,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// A freshly created bucket starts full — a new client (or a client
    /// that just had its tier changed) gets its entire burst allowance
    /// immediately.
    pub fn new(capacity: f64, refill_rate: f64, now: Instant) -> Self {
        Self {
            capacity,
            refill_rate,
            tokens: capacity,
            last_refill: now,
        }
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Refill lazily, clamp to capacity, and advance `last_refill`.
    ///
    /// A clock regression (`now < last_refill`) credits zero elapsed time
    /// rather than going negative.
    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    /// Current token count after a lazy refill. Read-only: does not
    /// advance `last_refill`'s accounting beyond the refill itself.
    pub fn available(&mut self, now: Instant) -> f64 {
        self.refill(now);
        self.tokens
    }

    /// Attempt to consume `n` tokens.
    ///
    /// `n == 0` is always allowed without touching state beyond the
    /// refill. `n > capacity` is a permanent denial — this bucket can
    /// never hold enough tokens to satisfy it.
    pub fn try_take(&mut self, n: f64, now: Instant) -> TakeResult {
        if n > self.capacity {
            return TakeResult::Denied {
                retry_after: Duration::MAX,
                permanent: true,
            };
        }

        self.refill(now);

        if n == 0.0 {
            return TakeResult::Allowed;
        }

        if self.tokens >= n {
            self.tokens -= n;
            TakeResult::Allowed
        } else {
            let deficit = n - self.tokens;
            let retry_after_secs = deficit / self.refill_rate;
            // Round up to the nearest millisecond for the wire header.
            let retry_after = Duration::from_millis((retry_after_secs * 1000.0).ceil() as u64);
            TakeResult::Denied {
                retry_after,
                permanent: false,
            }
        }
    }
}
