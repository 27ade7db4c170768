use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

/// Outcome of a token withdrawal attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub remaining: u32,
    /// Time until the next token is added, when the bucket is not full.
    pub retry_after: Option<Duration>,
}

/// The limiter backend could not answer.
#[derive(Debug, thiserror::Error)]
pub enum LimiterError {
    #[error("rate limiter timed out after {0:?}")]
    Timeout(Duration),
    #[error("rate limiter backend unavailable: {0}")]
    Unavailable(String),
}

/// Shared admission gate for generation requests.
///
/// `acquire` never blocks waiting for tokens: an exhausted bucket answers
/// `allowed = false` immediately.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn acquire(&self, scope: &str) -> Result<RateDecision, LimiterError>;
}

struct TokenBucket {
    tokens: u32,
    last_refill: Instant,
}

/// In-process token bucket per scope.
///
/// Refill is discrete: every whole `refill_interval` that has elapsed since
/// the last refill adds `refill_amount` tokens, capped at `capacity`.
pub struct TokenBucketLimiter {
    buckets: Mutex<HashMap<String, TokenBucket>>,
    capacity: u32,
    refill_amount: u32,
    refill_interval: Duration,
}

impl TokenBucketLimiter {
    pub fn new(capacity: u32, refill_amount: u32, refill_interval: Duration) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            capacity,
            refill_amount,
            refill_interval,
        }
    }

    fn refill(&self, bucket: &mut TokenBucket, now: Instant) {
        if self.refill_amount == 0 || self.refill_interval.is_zero() {
            return;
        }
        let elapsed = now.duration_since(bucket.last_refill);
        let periods = elapsed.as_nanos() / self.refill_interval.as_nanos();
        if periods == 0 {
            return;
        }
        let added = u64::try_from(periods)
            .unwrap_or(u64::MAX)
            .saturating_mul(u64::from(self.refill_amount));
        let tokens = u64::from(bucket.tokens).saturating_add(added);
        if tokens >= u64::from(self.capacity) {
            bucket.tokens = self.capacity;
            bucket.last_refill = now;
        } else {
            // Below capacity, so `periods * refill_amount < capacity` fits in u32.
            bucket.tokens = tokens as u32;
            bucket.last_refill += self.refill_interval * periods as u32;
        }
    }

    fn retry_after(&self, bucket: &TokenBucket, now: Instant) -> Option<Duration> {
        if bucket.tokens >= self.capacity || self.refill_amount == 0 {
            return None;
        }
        let since = now.duration_since(bucket.last_refill);
        Some(self.refill_interval.saturating_sub(since))
    }
}

#[async_trait]
impl RateLimiter for TokenBucketLimiter {
    async fn acquire(&self, scope: &str) -> Result<RateDecision, LimiterError> {
        let mut buckets = self.buckets.lock().await;
        let now = Instant::now();
        let bucket = buckets
            .entry(scope.to_string())
            .or_insert_with(|| TokenBucket {
                tokens: self.capacity,
                last_refill: now,
            });

        self.refill(bucket, now);

        let allowed = if bucket.tokens > 0 {
            bucket.tokens -= 1;
            true
        } else {
            false
        };
        Ok(RateDecision {
            allowed,
            remaining: bucket.tokens,
            retry_after: self.retry_after(bucket, now),
        })
    }
}
