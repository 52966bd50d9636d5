//! Rate Limiter (C6): an IP-keyed token bucket per endpoint class.
//!
//! Refill is continuous — `tokens = min(capacity, tokens + elapsed *
//! capacity / 60)` — rather than whole-bucket-at-minute-boundary; both
//! satisfy the contract and this crate documents which it picked.

use dashmap::DashMap;
use entitlement_config::{EndpointClass, RateLimitConfig};
use entitlement_metrics::RateLimiterMetrics;
use parking_lot::Mutex;
use std::net::IpAddr;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("rate limit exceeded: {capacity_per_minute} per minute for {class:?}")]
pub struct RateLimited {
    pub class: EndpointClass,
    pub capacity_per_minute: u32,
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(capacity: u32) -> Self {
        Self { tokens: capacity as f64, last_refill: Instant::now() }
    }

    fn try_consume(&mut self, capacity: u32) -> bool {
        let capacity = capacity as f64;
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.last_refill = now;
        self.tokens = (self.tokens + elapsed * capacity / 60.0).min(capacity);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Each `(ip, endpoint class)` pair gets its own bucket; a single
/// request touches exactly one.
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: DashMap<(IpAddr, EndpointClass), Mutex<Bucket>>,
    metrics: RateLimiterMetrics,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self { config, buckets: DashMap::new(), metrics: RateLimiterMetrics::default() }
    }

    pub fn check(&self, ip: IpAddr, class: EndpointClass) -> Result<(), RateLimited> {
        let capacity = self.config.capacity_per_minute(class);
        let key = (ip, class);

        let allowed = {
            let entry = self.buckets.entry(key).or_insert_with(|| Mutex::new(Bucket::new(capacity)));
            let result = entry.lock().try_consume(capacity);
            result
        };

        self.metrics.set_active_buckets(self.buckets.len());

        if allowed {
            Ok(())
        } else {
            self.metrics.inc_limited(class_label(class));
            Err(RateLimited { class, capacity_per_minute: capacity })
        }
    }

    /// Evicts buckets that have not been touched within `idle_for` —
    /// left to the implementer's discretion per spec.md §3.
    pub fn evict_idle(&self, idle_for: Duration) {
        let cutoff = Instant::now();
        self.buckets.retain(|_, bucket| cutoff.duration_since(bucket.lock().last_refill) < idle_for);
    }
}

fn class_label(class: EndpointClass) -> &'static str {
    match class {
        EndpointClass::Default => "default",
        EndpointClass::Auth => "auth",
        EndpointClass::Tarot => "tarot",
        EndpointClass::Chat => "chat",
        EndpointClass::Upload => "upload",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn localhost() -> IpAddr {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    }

    #[test]
    fn exhausts_bucket_then_rejects() {
        let mut config = RateLimitConfig::default();
        // force a tiny capacity for a fast, deterministic test
        std::env::set_var("RATE_LIMITS_AUTH", "2");
        config = RateLimitConfig::from_env().unwrap_or(config);
        std::env::remove_var("RATE_LIMITS_AUTH");

        let limiter = RateLimiter::new(config);
        let ip = localhost();
        assert!(limiter.check(ip, EndpointClass::Auth).is_ok());
        assert!(limiter.check(ip, EndpointClass::Auth).is_ok());
        assert!(limiter.check(ip, EndpointClass::Auth).is_err());
    }

    #[test]
    fn buckets_are_independent_per_class() {
        let limiter = RateLimiter::new(RateLimitConfig::default());
        let ip = localhost();
        for _ in 0..5 {
            assert!(limiter.check(ip, EndpointClass::Upload).is_ok());
        }
        assert!(limiter.check(ip, EndpointClass::Upload).is_err());
        // a different class for the same IP is untouched
        assert!(limiter.check(ip, EndpointClass::Tarot).is_ok());
    }

    #[test]
    fn buckets_are_independent_per_ip() {
        let limiter = RateLimiter::new(RateLimitConfig::default());
        let a = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let b = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));
        for _ in 0..5 {
            assert!(limiter.check(a, EndpointClass::Upload).is_ok());
        }
        assert!(limiter.check(a, EndpointClass::Upload).is_err());
        assert!(limiter.check(b, EndpointClass::Upload).is_ok());
    }
}
