use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use domain::ErrorCode;
use moka::future::Cache;

use crate::errors::ServiceError;

const OPERATION_LIMIT_CACHE_MAX_CAPACITY: u64 = 50_000;

#[derive(Debug)]
struct Counter(AtomicU32);

impl Counter {
    fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    fn increment(&self) -> u32 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Per-(admin, operation) sliding-window rate limiter backed by a TTL cache:
/// a key's counter resets once it's been idle for `window`, which is an
/// approximation of a true sliding window but avoids a background sweep.
pub struct OperationRateLimiter {
    buckets: Cache<String, Arc<Counter>>,
    capacity: u32,
    window: Duration,
}

impl OperationRateLimiter {
    pub fn new(capacity: u32, window: Duration) -> Self {
        Self {
            buckets: Cache::builder()
                .time_to_live(window)
                .max_capacity(OPERATION_LIMIT_CACHE_MAX_CAPACITY)
                .build(),
            capacity,
            window,
        }
    }

    /// Returns `Ok(())` if `key` (typically `"{admin_id}:{operation}"`) is
    /// still within budget, incrementing its counter as a side effect.
    pub async fn check(&self, key: &str) -> Result<(), ServiceError> {
        let counter = self
            .buckets
            .get_with(key.to_string(), async { Arc::new(Counter::new()) })
            .await;

        if counter.increment() > self.capacity {
            return Err(ServiceError::new(
                ErrorCode::SystemRateLimited,
                format!("rate limit exceeded for '{key}'"),
            )
            .with_retry_after(self.window.as_secs()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_up_to_capacity_then_rejects() {
        let limiter = OperationRateLimiter::new(2, Duration::from_secs(60));
        assert!(limiter.check("admin-1:createSession").await.is_ok());
        assert!(limiter.check("admin-1:createSession").await.is_ok());
        let err = limiter.check("admin-1:createSession").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::SystemRateLimited);
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let limiter = OperationRateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.check("admin-1:createSession").await.is_ok());
        assert!(limiter.check("admin-2:createSession").await.is_ok());
    }
}
