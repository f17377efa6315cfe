// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delay computation for retried queue items.
//!
//! Two limiters are combined and the longer delay wins:
//!
//! - [`ItemExponentialBackoff`] doubles the delay of one item every time it
//!   fails, so a failing item backs off without slowing down others.
//! - [`TokenBucket`] caps the overall retry rate of a queue, so many items
//!   failing at once do not hammer the destination.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    /// Delay after the first failure of an item.
    pub base_delay: Duration,
    /// Per-item delay never exceeds this.
    pub max_delay: Duration,
    /// Sustained retries per second across the whole queue.
    pub rate_per_second: f64,
    /// Retries allowed back to back before the rate applies.
    pub burst: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_secs(1000),
            rate_per_second: 10.0,
            burst: 100,
        }
    }
}

/// Per-item exponential backoff: `base_delay * 2^failures`, capped at
/// `max_delay`.
#[derive(Debug)]
pub struct ItemExponentialBackoff {
    base_delay: Duration,
    max_delay: Duration,
    failures: Mutex<HashMap<u64, u32>>,
}

impl ItemExponentialBackoff {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Records a failure of `item` and returns how long it should wait.
    pub fn when(&self, item: u64) -> Duration {
        let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        let count = failures.entry(item).or_insert(0);
        let exponent = *count;
        *count = count.saturating_add(1);

        1u32.checked_shl(exponent)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(self.max_delay, |backoff| backoff.min(self.max_delay))
    }

    pub fn num_requeues(&self, item: u64) -> u32 {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&item)
            .copied()
            .unwrap_or(0)
    }

    pub fn forget(&self, item: u64) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&item);
    }
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last: Instant,
}

/// Token bucket handing out reservations.
///
/// Unlike a try-acquire bucket, a reservation always succeeds: the token count
/// may go negative, and the returned delay is how long until that reservation
/// is covered by refill.
#[derive(Debug)]
pub struct TokenBucket {
    rate: f64,
    burst: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(rate_per_second: f64, burst: u32) -> Self {
        let burst = f64::from(burst);
        Self {
            rate: rate_per_second,
            burst,
            state: Mutex::new(BucketState {
                tokens: burst,
                last: Instant::now(),
            }),
        }
    }

    /// Takes one token and returns how long the caller must wait for it.
    pub fn reserve(&self) -> Duration {
        self.reserve_at(Instant::now())
    }

    fn reserve_at(&self, now: Instant) -> Duration {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let elapsed = now.saturating_duration_since(state.last).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rate).min(self.burst);
        state.last = now;
        state.tokens -= 1.0;

        if state.tokens >= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(-state.tokens / self.rate).unwrap_or(Duration::MAX)
    }
}

/// Combined limiter used by a destination queue.
#[derive(Debug)]
pub struct RetryRateLimiter {
    backoff: ItemExponentialBackoff,
    bucket: TokenBucket,
}

impl RetryRateLimiter {
    pub fn new(config: &BackoffConfig) -> Self {
        Self {
            backoff: ItemExponentialBackoff::new(config.base_delay, config.max_delay),
            bucket: TokenBucket::new(config.rate_per_second, config.burst),
        }
    }

    /// Delay before `item` is retried. Counts as one more requeue.
    pub fn when(&self, item: u64) -> Duration {
        self.backoff.when(item).max(self.bucket.reserve())
    }

    /// Number of times `item` has been rate limited since it was last
    /// forgotten.
    pub fn num_requeues(&self, item: u64) -> u32 {
        self.backoff.num_requeues(item)
    }

    /// Clears the failure history of `item` once it is delivered or dropped.
    pub fn forget(&self, item: u64) {
        self.backoff.forget(item);
    }
}

impl Default for RetryRateLimiter {
    fn default() -> Self {
        Self::new(&BackoffConfig::default())
    }
}
