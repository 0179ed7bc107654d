//! Rate Limiting
//!
//! Token-bucket throttle keyed by client address. Each key gets a bucket
//! holding `requests_per_second * burst_multiplier` tokens that refills
//! continuously; a request spends one token or gets a 429.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use std::time::Instant;
use thiserror::Error;

use sentinel_config::RateLimitConfig;

use crate::state::AppState;

/// Rate limit errors
#[derive(Error, Debug)]
pub enum RateLimitError {
    #[error("Rate limit exceeded")]
    Exceeded,
}

struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

/// Per-client token buckets
pub struct RateLimiter {
    buckets: DashMap<String, TokenBucket>,
    /// Tokens added per second
    rate: f64,
    /// Bucket size; also the initial balance for a new client
    capacity: f64,
    enabled: bool,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let rate = f64::from(config.requests_per_second).max(1.0);
        let capacity = (rate * f64::from(config.burst_multiplier)).max(1.0);
        Self {
            buckets: DashMap::new(),
            rate,
            capacity,
            enabled: config.enabled,
        }
    }

    /// Spend one token for `key`, refilling the bucket first
    pub fn check(&self, key: &str) -> Result<(), RateLimitError> {
        if !self.enabled {
            return Ok(());
        }

        let now = Instant::now();
        let mut bucket = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket {
                tokens: self.capacity,
                last_refill: now,
            });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Ok(())
        } else {
            Err(RateLimitError::Exceeded)
        }
    }

    /// Drop buckets idle long enough to have refilled completely
    pub fn prune(&self) {
        let now = Instant::now();
        let full_refill_secs = (self.capacity / self.rate) * 2.0;
        self.buckets.retain(|_, bucket| {
            now.duration_since(bucket.last_refill).as_secs_f64() < full_refill_secs
        });
    }

    pub fn tracked_clients(&self) -> usize {
        self.buckets.len()
    }
}

/// Throttling middleware; public paths (health, metrics) are never throttled
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    let public = {
        let config = state.get_config();
        config
            .server
            .auth
            .public_paths
            .iter()
            .any(|p| path.starts_with(p))
    };
    if public {
        return next.run(request).await;
    }

    let key = client_key(&request);
    match state.rate_limiter.check(&key) {
        Ok(()) => next.run(request).await,
        Err(RateLimitError::Exceeded) => {
            tracing::warn!(client = %key, path = %path, "Rate limit exceeded");
            crate::metrics::record_error("rate_limit");
            (StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded").into_response()
        },
    }
}

/// First hop of X-Forwarded-For when present, otherwise a shared bucket
/// for direct connections
fn client_key(request: &Request) -> String {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "direct".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(enabled: bool, rps: u32, burst: f32) -> RateLimitConfig {
        RateLimitConfig {
            enabled,
            requests_per_second: rps,
            burst_multiplier: burst,
        }
    }

    #[test]
    fn test_burst_allowed_then_rejected() {
        let limiter = RateLimiter::new(&config(true, 1, 3.0));

        for _ in 0..3 {
            assert!(limiter.check("10.0.0.1").is_ok());
        }
        assert!(limiter.check("10.0.0.1").is_err());
    }

    #[test]
    fn test_bucket_refills_over_time() {
        let limiter = RateLimiter::new(&config(true, 50, 1.0));

        while limiter.check("10.0.0.1").is_ok() {}
        std::thread::sleep(std::time::Duration::from_millis(100));
        assert!(limiter.check("10.0.0.1").is_ok());
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = RateLimiter::new(&config(true, 1, 1.0));

        assert!(limiter.check("10.0.0.1").is_ok());
        assert!(limiter.check("10.0.0.1").is_err());
        assert!(limiter.check("10.0.0.2").is_ok());
    }

    #[test]
    fn test_disabled_never_throttles() {
        let limiter = RateLimiter::new(&config(false, 1, 1.0));

        for _ in 0..100 {
            assert!(limiter.check("10.0.0.1").is_ok());
        }
    }

    #[test]
    fn test_prune_keeps_active_buckets() {
        let limiter = RateLimiter::new(&config(true, 10, 2.0));

        limiter.check("10.0.0.1").ok();
        limiter.check("10.0.0.2").ok();
        assert_eq!(limiter.tracked_clients(), 2);

        limiter.prune();
        assert_eq!(limiter.tracked_clients(), 2);
    }
}
