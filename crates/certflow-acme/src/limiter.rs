//! Per-identity issuance rate limiting
//!
//! Token buckets keyed by contact email. Each acquire reserves a token
//! up front and sleeps until it matures, so waiters queue fairly without
//! polling. A cancelled waiter hands its reservation back.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::Cancelled;

/// One token every 36 seconds
pub const DEFAULT_ISSUANCE_INTERVAL: Duration = Duration::from_secs(36);
/// Tokens available to an identity that has been idle
pub const DEFAULT_ISSUANCE_BURST: u32 = 300;

#[derive(Debug)]
struct BucketState {
    /// Negative when reservations are outstanding
    tokens: f64,
    last_refill: Instant,
}

#[derive(Debug)]
struct TokenBucket {
    interval: Duration,
    burst: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    fn new(interval: Duration, burst: u32) -> Self {
        Self {
            interval,
            burst: burst as f64,
            state: Mutex::new(BucketState {
                tokens: burst as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Take one token, returning how long the caller must wait for it
    fn reserve(&self) -> Duration {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill);
        state.tokens =
            (state.tokens + elapsed.as_secs_f64() / self.interval.as_secs_f64()).min(self.burst);
        state.last_refill = now;

        state.tokens -= 1.0;
        if state.tokens >= 0.0 {
            Duration::ZERO
        } else {
            self.interval.mul_f64(-state.tokens)
        }
    }

    fn release(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.tokens = (state.tokens + 1.0).min(self.burst);
    }
}

/// Token buckets, one per identity, created on first use
#[derive(Debug)]
pub struct IssuanceLimiter {
    interval: Duration,
    burst: u32,
    buckets: DashMap<String, Arc<TokenBucket>>,
}

impl IssuanceLimiter {
    /// Refill one token every `interval`, holding at most `burst`
    pub fn new(interval: Duration, burst: u32) -> Self {
        Self {
            interval,
            burst,
            buckets: DashMap::new(),
        }
    }

    /// Wait for a token for `key`, or fail with `Cancelled`
    pub async fn acquire(&self, key: &str, cancel: &CancellationToken) -> Result<(), Cancelled> {
        if cancel.is_cancelled() {
            return Err(Cancelled);
        }

        let bucket = self.bucket(key);
        let wait = bucket.reserve();
        if wait.is_zero() {
            return Ok(());
        }

        debug!(key = %key, wait_secs = wait.as_secs_f64(), "Waiting for issuance token");
        tokio::select! {
            _ = cancel.cancelled() => {
                bucket.release();
                Err(Cancelled)
            }
            _ = tokio::time::sleep(wait) => Ok(()),
        }
    }

    /// Number of identities seen so far
    pub fn tracked_keys(&self) -> usize {
        self.buckets.len()
    }

    fn bucket(&self, key: &str) -> Arc<TokenBucket> {
        self.buckets
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(TokenBucket::new(self.interval, self.burst)))
            .clone()
    }
}

impl Default for IssuanceLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_ISSUANCE_INTERVAL, DEFAULT_ISSUANCE_BURST)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_burst_then_wait_one_interval() {
        let limiter = IssuanceLimiter::default();
        let cancel = CancellationToken::new();
        let start = Instant::now();

        for _ in 0..300 {
            limiter.acquire("ops@example.com", &cancel).await.unwrap();
        }
        assert_eq!(start.elapsed(), Duration::ZERO);

        limiter.acquire("ops@example.com", &cancel).await.unwrap();
        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(36), "waited {waited:?}");
        assert!(waited < Duration::from_secs(37), "waited {waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let limiter = IssuanceLimiter::new(Duration::from_secs(36), 1);
        let cancel = CancellationToken::new();
        let start = Instant::now();

        limiter.acquire("a@example.com", &cancel).await.unwrap();
        limiter.acquire("b@example.com", &cancel).await.unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(limiter.tracked_keys(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_wait_returns_token() {
        let limiter = Arc::new(IssuanceLimiter::new(Duration::from_secs(36), 1));
        let cancel = CancellationToken::new();
        limiter.acquire("k", &cancel).await.unwrap();

        let waiter_cancel = CancellationToken::new();
        let handle = {
            let limiter = limiter.clone();
            let waiter_cancel = waiter_cancel.clone();
            tokio::spawn(async move { limiter.acquire("k", &waiter_cancel).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        waiter_cancel.cancel();
        assert_eq!(handle.await.unwrap(), Err(Cancelled));

        // the next caller waits for the first token, not for two
        let start = Instant::now();
        limiter.acquire("k", &cancel).await.unwrap();
        assert!(start.elapsed() < Duration::from_secs(36));
    }

    #[tokio::test]
    async fn test_already_cancelled() {
        let limiter = IssuanceLimiter::default();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(limiter.acquire("k", &cancel).await, Err(Cancelled));
        assert_eq!(limiter.tracked_keys(), 0);
    }
}
