//! Gasless rate limiting.
//!
//! Sponsored (paymaster-backed) submissions cost the service real money, so
//! each (owner, chain, flow) key gets a fixed-window counter consulted before
//! anything reaches a bundler. Buckets are process-local; losing them on
//! restart only allows one extra burst.

use crate::{config::GaslessConfig, error::RateLimitError};
use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::warn;

/// Sponsored flows throttled independently of each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GaslessFlow {
    /// Native-asset transfer through a sponsored path.
    NativeTransfer,
    /// Token transfer through a sponsored path.
    TokenTransfer,
}

impl std::fmt::Display for GaslessFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NativeTransfer => f.write_str("native_transfer"),
            Self::TokenTransfer => f.write_str("token_transfer"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BucketKey {
    owner: String,
    chain: String,
    flow: GaslessFlow,
}

#[derive(Debug)]
struct Bucket {
    count: u32,
    reset_at: Instant,
}

/// Fixed-window counter over sponsored submissions.
///
/// Scoped to one orchestrator instance so tests can construct isolated
/// limiters.
#[derive(Debug)]
pub struct GaslessRateLimiter {
    buckets: DashMap<BucketKey, Bucket>,
    max_per_window: u32,
    window: Duration,
}

impl GaslessRateLimiter {
    /// Creates a limiter from configuration.
    pub fn new(config: &GaslessConfig) -> Self {
        Self { buckets: DashMap::new(), max_per_window: config.max_per_window, window: config.window }
    }

    /// Counts one attempted sponsored submission, rejecting over-limit calls
    /// with the time until the window resets.
    pub fn check(
        &self,
        owner: &str,
        chain: &str,
        flow: GaslessFlow,
    ) -> Result<(), RateLimitError> {
        let key = BucketKey { owner: owner.to_string(), chain: chain.to_string(), flow };
        let now = Instant::now();
        let mut bucket = self
            .buckets
            .entry(key)
            .or_insert_with(|| Bucket { count: 0, reset_at: now + self.window });

        if now >= bucket.reset_at {
            bucket.count = 1;
            bucket.reset_at = now + self.window;
            return Ok(());
        }

        bucket.count += 1;
        if bucket.count > self.max_per_window {
            let retry_after = bucket.reset_at.saturating_duration_since(now);
            drop(bucket);
            metrics::counter!("custodia_gasless_rate_limited").increment(1);
            warn!(owner, chain, %flow, ?retry_after, "gasless rate limit exceeded");
            return Err(RateLimitError::Exceeded { retry_after });
        }
        Ok(())
    }

    /// Drops buckets whose window has fully elapsed.
    pub fn sweep_expired(&self) -> usize {
        let before = self.buckets.len();
        let now = Instant::now();
        self.buckets.retain(|_, bucket| bucket.reset_at > now);
        before.saturating_sub(self.buckets.len())
    }
}
