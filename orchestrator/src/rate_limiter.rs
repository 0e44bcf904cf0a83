// Token-bucket throttle keyed by caller identity

use crate::error::ConfigError;
use crate::metrics;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Maximum tokens a bucket holds.
    pub capacity: u32,
    pub refill_interval: Duration,
    /// Tokens added per elapsed interval.
    pub refill_amount: u32,
    /// Buckets unseen for this long may be evicted. `None` keeps them forever.
    pub idle_retention: Option<Duration>,
}

impl RateLimiterConfig {
    /// Reset-per-interval semantics: the bucket refills completely every `interval`.
    pub fn per_interval(capacity: u32, interval: Duration) -> Self {
        Self {
            capacity,
            refill_interval: interval,
            refill_amount: capacity,
            idle_retention: None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::invalid("rate_limit.capacity", "must be at least 1"));
        }
        if self.refill_interval.is_zero() {
            return Err(ConfigError::invalid(
                "rate_limit.refill_interval_ms",
                "must be greater than zero",
            ));
        }
        if self.refill_amount == 0 {
            return Err(ConfigError::invalid(
                "rate_limit.refill_amount",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Result of a single `acquire`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub remaining: u32,
}

#[derive(Debug)]
struct Bucket {
    tokens: u32,
    last_refill: Instant,
    last_seen: Instant,
}

impl Bucket {
    fn full(capacity: u32, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_refill: now,
            last_seen: now,
        }
    }

    fn refill(&mut self, now: Instant, config: &RateLimiterConfig) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        let interval = config.refill_interval.as_nanos();
        let intervals = elapsed.as_nanos() / interval;
        if intervals == 0 {
            return;
        }

        let added = u128::from(config.refill_amount) * intervals;
        let topped = u128::from(self.tokens) + added;
        self.tokens = topped.min(u128::from(config.capacity)) as u32;

        // Advance by whole intervals only so partial progress toward the next refill survives.
        let advanced = u64::try_from(intervals * interval).unwrap_or(u64::MAX);
        self.last_refill += Duration::from_nanos(advanced);
    }
}

/// Per-key token buckets.
///
/// Each key's read-modify-write happens under its map shard's write lock, so
/// concurrent callers sharing a key never double-spend a token while
/// unrelated keys proceed independently.
pub struct RateLimiter {
    config: RateLimiterConfig,
    buckets: DashMap<String, Bucket>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            buckets: DashMap::new(),
        })
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    pub fn refill_interval(&self) -> Duration {
        self.config.refill_interval
    }

    /// Take one token from `key`'s bucket. Never blocks and never fails.
    pub fn acquire(&self, key: &str) -> Decision {
        let now = Instant::now();
        let capacity = self.config.capacity;

        let mut bucket = match self.buckets.get_mut(key) {
            Some(bucket) => bucket,
            None => self
                .buckets
                .entry(key.to_owned())
                .or_insert_with(|| Bucket::full(capacity, now)),
        };

        bucket.refill(now, &self.config);
        bucket.last_seen = now;

        let decision = if bucket.tokens == 0 {
            Decision {
                allowed: false,
                remaining: 0,
            }
        } else {
            bucket.tokens -= 1;
            Decision {
                allowed: true,
                remaining: bucket.tokens,
            }
        };
        drop(bucket);

        metrics::record_rate_limit_decision(decision.allowed);
        decision
    }

    /// Tokens currently available to `key` without consuming any.
    pub fn available(&self, key: &str) -> u32 {
        let now = Instant::now();
        match self.buckets.get_mut(key) {
            Some(mut bucket) => {
                bucket.refill(now, &self.config);
                bucket.tokens
            }
            None => self.config.capacity,
        }
    }

    pub fn tracked_keys(&self) -> usize {
        self.buckets.len()
    }

    /// Drop buckets idle longer than the retention window. Returns how many were removed.
    pub fn evict_idle(&self) -> usize {
        let Some(retention) = self.config.idle_retention else {
            return 0;
        };
        let now = Instant::now();
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| now.saturating_duration_since(bucket.last_seen) < retention);
        before.saturating_sub(self.buckets.len())
    }

    /// Periodically evict idle buckets for the lifetime of the process.
    pub fn spawn_janitor(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                let evicted = limiter.evict_idle();
                if evicted > 0 {
                    debug!(evicted, "evicted idle rate limiter buckets");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(capacity: u32, interval: Duration) -> RateLimiter {
        RateLimiter::new(RateLimiterConfig::per_interval(capacity, interval)).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_key_allows_exactly_capacity_calls() {
        let limiter = limiter(3, Duration::from_secs(60));

        let remaining: Vec<u32> = (0..3)
            .map(|_| {
                let decision = limiter.acquire("alice");
                assert!(decision.allowed);
                decision.remaining
            })
            .collect();
        assert_eq!(remaining, vec![2, 1, 0]);

        let denied = limiter.acquire("alice");
        assert_eq!(
            denied,
            Decision {
                allowed: false,
                remaining: 0
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn refills_to_capacity_after_one_interval() {
        let limiter = limiter(3, Duration::from_secs(60));
        for _ in 0..4 {
            limiter.acquire("alice");
        }

        tokio::time::advance(Duration::from_secs(60)).await;

        let decision = limiter.acquire("alice");
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn long_idle_never_overflows_capacity() {
        let limiter = limiter(5, Duration::from_secs(1));
        limiter.acquire("alice");

        tokio::time::advance(Duration::from_secs(3600)).await;

        let decision = limiter.acquire("alice");
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn partial_interval_progress_is_kept() {
        let config = RateLimiterConfig {
            capacity: 2,
            refill_interval: Duration::from_secs(10),
            refill_amount: 1,
            idle_retention: None,
        };
        let limiter = RateLimiter::new(config).unwrap();
        limiter.acquire("k");
        limiter.acquire("k");

        // 15s: one refill, 5s carried toward the next.
        tokio::time::advance(Duration::from_secs(15)).await;
        assert!(limiter.acquire("k").allowed);
        assert!(!limiter.acquire("k").allowed);

        // 5 more seconds completes the carried interval.
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(limiter.acquire("k").allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn keys_do_not_share_buckets() {
        let limiter = limiter(2, Duration::from_secs(60));
        for _ in 0..5 {
            limiter.acquire("a");
        }
        assert_eq!(limiter.available("a"), 0);
        assert_eq!(limiter.available("b"), 2);
        assert_eq!(limiter.acquire("b").remaining, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn evicts_only_idle_buckets() {
        let config = RateLimiterConfig {
            idle_retention: Some(Duration::from_secs(30)),
            ..RateLimiterConfig::per_interval(2, Duration::from_secs(60))
        };
        let limiter = RateLimiter::new(config).unwrap();
        limiter.acquire("stale");
        tokio::time::advance(Duration::from_secs(31)).await;
        limiter.acquire("fresh");

        assert_eq!(limiter.evict_idle(), 1);
        assert_eq!(limiter.tracked_keys(), 1);
        // An evicted key comes back full.
        assert_eq!(limiter.acquire("stale").remaining, 1);
    }

    #[test]
    fn rejects_degenerate_config() {
        assert!(RateLimiter::new(RateLimiterConfig::per_interval(0, Duration::from_secs(1))).is_err());
        assert!(RateLimiter::new(RateLimiterConfig::per_interval(1, Duration::ZERO)).is_err());
    }
}
