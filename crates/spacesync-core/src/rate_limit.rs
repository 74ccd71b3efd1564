//! Patch rate limiting using a token bucket per entity
//!
//! Each entity may send one patch per interval, with an optional burst. A
//! limited update is not dropped: the caller keeps it queued and retries on a
//! later apply pass, so the newest staged state is what eventually goes out.

use crate::operation::EntityId;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Scale tokens by 1000 for sub-token precision
const TOKEN_SCALE: u64 = 1000;

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Time to refill one token
    pub interval: Duration,
    /// Burst capacity (max tokens)
    pub burst_size: u32,
    pub enabled: bool,
}

impl RateLimitConfig {
    pub fn new(interval: Duration, burst_size: u32) -> Self {
        Self {
            interval,
            burst_size: burst_size.max(1),
            enabled: true,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new(Duration::from_millis(90), 1)
    }
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    tokens: u64,
    last_refill: Instant,
}

/// Token buckets keyed by entity
#[derive(Debug)]
pub struct PatchRateLimiter {
    config: RateLimitConfig,
    buckets: HashMap<EntityId, Bucket>,
    max_tokens: u64,
}

impl PatchRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let max_tokens = u64::from(config.burst_size) * TOKEN_SCALE;
        Self {
            config,
            buckets: HashMap::new(),
            max_tokens,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Try to take a token for `entity` at `now`
    pub fn try_acquire(&mut self, entity: EntityId, now: Instant) -> bool {
        if !self.config.enabled {
            return true;
        }

        let max_tokens = self.max_tokens;
        let bucket = self.buckets.entry(entity).or_insert(Bucket {
            tokens: max_tokens,
            last_refill: now,
        });
        Self::refill(bucket, &self.config, max_tokens, now);

        if bucket.tokens < TOKEN_SCALE {
            return false;
        }
        bucket.tokens -= TOKEN_SCALE;
        true
    }

    /// Check if the next patch for `entity` would be limited (without consuming a token)
    pub fn would_limit(&mut self, entity: EntityId, now: Instant) -> bool {
        if !self.config.enabled {
            return false;
        }
        match self.buckets.get_mut(&entity) {
            Some(bucket) => {
                Self::refill(bucket, &self.config, self.max_tokens, now);
                bucket.tokens < TOKEN_SCALE
            }
            None => false,
        }
    }

    /// Forget an entity, e.g. after it was deleted
    pub fn remove(&mut self, entity: EntityId) {
        self.buckets.remove(&entity);
    }

    pub fn reset(&mut self) {
        self.buckets.clear();
    }

    fn refill(bucket: &mut Bucket, config: &RateLimitConfig, max_tokens: u64, now: Instant) {
        let elapsed = now.saturating_duration_since(bucket.last_refill);
        let interval_us = config.interval.as_micros().max(1) as u64;
        let new_tokens = (elapsed.as_micros() as u64).saturating_mul(TOKEN_SCALE) / interval_us;

        if new_tokens > 0 {
            bucket.last_refill = now;
            bucket.tokens = (bucket.tokens + new_tokens).min(max_tokens);
        }
    }
}
