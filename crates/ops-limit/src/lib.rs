//! Per-key token-bucket rate limiter.
//!
//! Each key holds a bucket of at most `capacity` tokens, refilled continuously
//! at `capacity / window` tokens per millisecond. A fresh key starts full, so
//! bursts up to the capacity are admitted before the sustained rate applies.
//!
//! State is process-local and not persisted across restarts: this is a soft
//! protection for shared resources, not an audit mechanism.

use std::time::Instant;

use dashmap::DashMap;

#[derive(Debug, Clone, Copy)]
struct Bucket {
    tokens: f64,
    updated_at: Instant,
}

/// Outcome of a `consume` call.
///
/// Rejection is an expected structured result, never an error: `retry_after_ms`
/// tells the caller how long until enough tokens have refilled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateDecision {
    pub allowed: bool,
    pub remaining: f64,
    pub retry_after_ms: Option<u64>,
}

/// Token-bucket limiter keyed by limiter subject (client identity, route, ...).
///
/// The per-key read-modify-write is serialized through the map's entry lock,
/// so concurrent consumers on the same key cannot over-admit.
pub struct TokenBucketLimiter {
    buckets: DashMap<String, Bucket>,
    capacity: f64,
    refill_per_ms: f64,
}

impl TokenBucketLimiter {
    /// `capacity` tokens per `window_ms` milliseconds.
    pub fn new(capacity: u32, window_ms: u64) -> Self {
        let capacity = f64::from(capacity);
        Self {
            buckets: DashMap::new(),
            capacity,
            refill_per_ms: capacity / window_ms as f64,
        }
    }

    /// Consumes `cost` tokens from `key`, refilling for elapsed time first.
    ///
    /// On rejection the refilled balance is persisted (never the negative
    /// remainder), so a rejected caller does not dig the bucket deeper.
    pub fn consume(&self, key: &str, cost: f64) -> RateDecision {
        let now = Instant::now();
        let mut bucket = self
            .buckets
            .entry(key.to_string())
            .or_insert(Bucket { tokens: self.capacity, updated_at: now });

        let elapsed_ms = now.duration_since(bucket.updated_at).as_secs_f64() * 1000.0;
        let refilled = (bucket.tokens + elapsed_ms * self.refill_per_ms).min(self.capacity);
        let remaining = refilled - cost;

        if remaining < 0.0 {
            *bucket = Bucket { tokens: refilled, updated_at: now };
            let retry_after_ms = ((-remaining) / self.refill_per_ms).ceil() as u64;
            RateDecision {
                allowed: false,
                remaining: 0.0,
                retry_after_ms: Some(retry_after_ms),
            }
        } else {
            *bucket = Bucket { tokens: remaining, updated_at: now };
            RateDecision {
                allowed: true,
                remaining,
                retry_after_ms: None,
            }
        }
    }

    /// `consume` with the default cost of one token.
    pub fn consume_one(&self, key: &str) -> RateDecision {
        self.consume(key, 1.0)
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.buckets.len()
    }
}
