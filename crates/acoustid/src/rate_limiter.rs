// SPDX-License-Identifier: GPL-3.0-or-later

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration, Instant};

/// Interval the AcoustID service asks clients to keep between requests
/// (three requests per second).
pub const ACOUSTID_REQUEST_INTERVAL: Duration = Duration::from_millis(333);

/// How requests through a [`RateLimiter`] are spaced out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    /// At least this long between the starts of two consecutive requests.
    FixedInterval(Duration),
    /// No spacing. Requests are still serialized.
    Disabled,
}

impl Pacing {
    /// A zero interval disables pacing.
    pub fn from_interval(interval: Duration) -> Self {
        if interval.is_zero() {
            Pacing::Disabled
        } else {
            Pacing::FixedInterval(interval)
        }
    }

    fn interval(&self) -> Option<Duration> {
        match self {
            Pacing::FixedInterval(interval) => Some(*interval),
            Pacing::Disabled => None,
        }
    }
}

/// Rate limiter for AcoustID API calls.
///
/// Acts as a monitor around the wrapped operation: one call runs at a time,
/// and a call never starts sooner than the pacing interval after the previous
/// call started. The interval is measured start-to-start, so when the calls
/// themselves are slow a queued caller may go out immediately after the lock
/// is released.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    pacing: Pacing,
    last_call: Arc<Mutex<Option<Instant>>>,
}

impl RateLimiter {
    /// Create a new rate limiter with the given pacing policy.
    pub fn new(pacing: Pacing) -> Self {
        Self {
            pacing,
            last_call: Arc::new(Mutex::new(None)),
        }
    }

    /// Create a rate limiter with AcoustID defaults (3 requests per second).
    pub fn acoustid_default() -> Self {
        Self::new(Pacing::FixedInterval(ACOUSTID_REQUEST_INTERVAL))
    }

    /// A limiter that only serializes calls.
    pub fn disabled() -> Self {
        Self::new(Pacing::Disabled)
    }

    pub fn pacing(&self) -> Pacing {
        self.pacing
    }

    /// Run `op` once the rate limit allows it.
    ///
    /// The lock is held until `op` completes, so concurrent callers are
    /// serialized through the whole call and not only through the pacing check.
    pub async fn run<F, Fut, T>(&self, op: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let mut last = self.last_call.lock().await;

        if let (Some(interval), Some(last_instant)) = (self.pacing.interval(), *last) {
            let elapsed = last_instant.elapsed();
            if elapsed < interval {
                let wait_time = interval - elapsed;
                tracing::trace!(
                    target: "acoustid",
                    "rate limiting: waiting {:?}",
                    wait_time
                );
                sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());

        op().await
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::acoustid_default()
    }
}
