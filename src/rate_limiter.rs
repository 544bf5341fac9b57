//! Request rate limiting using a token bucket
//!
//! All workers of a pipeline share one [`RateLimiter`]. Each finished transfer
//! consumes one permit, which caps the aggregate request rate no matter how
//! many workers run.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// One permit in bucket units. Tokens are kept in thousandths of a permit so
/// rates below one request per second refill smoothly.
const PERMIT: u64 = 1_000;

/// Shared gate bounding how often requests may be issued
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Wait until one permit is available and consume it
    ///
    /// Returns [`Error::Cancelled`] if `cancel` fires first.
    async fn wait(&self, cancel: &CancellationToken) -> Result<()>;
}

/// Limiter that never waits
#[derive(Clone, Copy, Debug, Default)]
pub struct Unlimited;

#[async_trait]
impl RateLimiter for Unlimited {
    async fn wait(&self, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }
}

/// Lock-free token bucket shared across workers
///
/// # Algorithm
///
/// - Tokens represent permits to issue one request
/// - Tokens refill at a constant rate (`per_second`)
/// - The bucket holds at most `burst` permits
/// - A waiter that finds the bucket empty sleeps until the next refill
///
/// Clones share the same bucket.
#[derive(Clone, Debug)]
pub struct TokenBucket {
    /// Refill rate in thousandths of a permit per second (0 = unlimited)
    rate_milli: Arc<AtomicU64>,
    /// Bucket capacity in thousandths of a permit
    capacity: Arc<AtomicU64>,
    /// Available tokens in thousandths of a permit
    tokens: Arc<AtomicU64>,
    /// Last refill timestamp (nanoseconds since arbitrary epoch)
    last_refill: Arc<AtomicU64>,
}

impl TokenBucket {
    /// Create a bucket refilling at `per_second` permits with room for `burst`
    ///
    /// `None` (or a non-positive rate) means unlimited. The bucket starts full.
    ///
    /// # Examples
    ///
    /// ```
    /// use attachment_dl::rate_limiter::TokenBucket;
    ///
    /// // 20 requests per minute, bursts of up to 3
    /// let limiter = TokenBucket::new(Some(20.0 / 60.0), 3);
    ///
    /// // Unlimited
    /// let unlimited = TokenBucket::new(None, 1);
    /// assert_eq!(unlimited.rate(), None);
    /// ```
    #[must_use]
    pub fn new(per_second: Option<f64>, burst: u32) -> Self {
        let capacity = u64::from(burst.max(1)) * PERMIT;
        Self {
            rate_milli: Arc::new(AtomicU64::new(Self::to_milli(per_second))),
            capacity: Arc::new(AtomicU64::new(capacity)),
            tokens: Arc::new(AtomicU64::new(capacity)),
            last_refill: Arc::new(AtomicU64::new(Self::now_nanos())),
        }
    }

    /// Change the refill rate; takes effect for waiters on their next check
    pub fn set_rate(&self, per_second: Option<f64>) {
        self.rate_milli
            .store(Self::to_milli(per_second), Ordering::SeqCst);
    }

    /// Current refill rate in permits per second, `None` if unlimited
    pub fn rate(&self) -> Option<f64> {
        let rate = self.rate_milli.load(Ordering::Relaxed);
        if rate == 0 {
            None
        } else {
            Some(rate as f64 / PERMIT as f64)
        }
    }

    /// Permits that could be taken right now without waiting
    pub fn available(&self) -> u64 {
        self.refill_tokens();
        self.tokens.load(Ordering::SeqCst) / PERMIT
    }

    /// Take one permit, sleeping as long as the bucket is empty
    async fn acquire(&self) {
        let mut remaining = PERMIT;

        loop {
            // Re-read the rate each iteration so dynamic changes take effect
            let rate = self.rate_milli.load(Ordering::Relaxed);
            if rate == 0 {
                return;
            }

            self.refill_tokens();

            // Partial consumption allowed; the rest is taken on later refills
            let current_tokens = self.tokens.load(Ordering::SeqCst);
            let to_consume = remaining.min(current_tokens);

            if to_consume > 0 {
                if self
                    .tokens
                    .compare_exchange(
                        current_tokens,
                        current_tokens - to_consume,
                        Ordering::SeqCst,
                        Ordering::SeqCst,
                    )
                    .is_ok()
                {
                    remaining -= to_consume;
                    if remaining == 0 {
                        return;
                    }
                }
                continue;
            }

            // Cap the sleep so rate changes are picked up promptly
            let wait_ms = (remaining as f64 / rate as f64 * 1000.0) as u64;
            tokio::time::sleep(Duration::from_millis(wait_ms.clamp(10, 100))).await;
        }
    }

    fn refill_tokens(&self) {
        let rate = self.rate_milli.load(Ordering::Relaxed);
        if rate == 0 {
            return;
        }

        let now = Self::now_nanos();
        let last = self.last_refill.load(Ordering::SeqCst);

        let elapsed_secs = now.saturating_sub(last) as f64 / 1_000_000_000.0;
        let tokens_to_add = (rate as f64 * elapsed_secs) as u64;

        if tokens_to_add > 0
            && self
                .last_refill
                .compare_exchange(last, now, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            let capacity = self.capacity.load(Ordering::Relaxed);
            // a single read-modify-write so concurrent consumers are not overwritten
            let _ = self
                .tokens
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                    Some(current.saturating_add(tokens_to_add).min(capacity))
                });
        }
    }

    fn to_milli(per_second: Option<f64>) -> u64 {
        match per_second {
            Some(rate) if rate.is_finite() && rate > 0.0 => ((rate * PERMIT as f64) as u64).max(1),
            _ => 0,
        }
    }

    /// Monotonic time in nanoseconds; the epoch is fixed for the process lifetime
    fn now_nanos() -> u64 {
        static START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
        let start = START.get_or_init(Instant::now);
        start.elapsed().as_nanos() as u64
    }
}

#[async_trait]
impl RateLimiter for TokenBucket {
    async fn wait(&self, cancel: &CancellationToken) -> Result<()> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            _ = self.acquire() => Ok(()),
        }
    }
}
