use redis::AsyncCommands;

use crate::config::RateLimitSettings;
use crate::error::{AppError, Result};

/// Which quota a request draws against. Reads and writes are budgeted
/// separately per tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitBucket {
    Read,
    Write,
}

impl RateLimitBucket {
    fn key_segment(&self) -> &'static str {
        match self {
            RateLimitBucket::Read => "read",
            RateLimitBucket::Write => "write",
        }
    }
}

/// Redis-backed token bucket, one bucket per `(tenant_id, Read|Write)`.
/// Grounded on the teacher's connection-per-call Redis idiom
/// (`get_multiplexed_async_connection` per operation, no pipeline/Lua script).
pub struct RateLimiter {
    client: redis::Client,
    write_per_min: u32,
    read_per_min: u32,
}

impl RateLimiter {
    pub fn new(client: redis::Client, settings: &RateLimitSettings) -> Self {
        Self { client, write_per_min: settings.write_per_min, read_per_min: settings.read_per_min }
    }

    fn capacity(&self, bucket: RateLimitBucket) -> u32 {
        match bucket {
            RateLimitBucket::Read => self.read_per_min,
            RateLimitBucket::Write => self.write_per_min,
        }
    }

    fn key(&self, tenant_id: &str, bucket: RateLimitBucket) -> String {
        format!("ratelimit:{}:{}", tenant_id, bucket.key_segment())
    }

    /// Consumes one token from `tenant_id`'s `bucket`. Refills lazily based on
    /// elapsed time since the bucket was last touched, at `capacity` tokens
    /// per 60 seconds. Fails open (allows the request) on a Redis error, since
    /// rate limiting is an ambient guard, not a correctness requirement.
    pub async fn check(&self, tenant_id: &str, bucket: RateLimitBucket) -> Result<()> {
        let capacity = self.capacity(bucket) as f64;
        if capacity <= 0.0 {
            return Ok(());
        }

        let key = self.key(tenant_id, bucket);
        let mut conn = match self.client.get_multiplexed_async_connection().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!("redis connection error in rate limiter, failing open: {}", e);
                return Ok(());
            }
        };

        let now = chrono::Utc::now().timestamp();
        let state: (Option<f64>, Option<i64>) = match conn.hget(&key, &["tokens", "updated_at"]).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("redis read error in rate limiter, failing open: {}", e);
                return Ok(());
            }
        };

        let tokens = state.0.unwrap_or(capacity);
        let updated_at = state.1.unwrap_or(now);
        let elapsed = (now - updated_at).max(0) as f64;
        let refilled = (tokens + elapsed * (capacity / 60.0)).min(capacity);

        if refilled < 1.0 {
            let deficit = 1.0 - refilled;
            let retry_after_secs = (deficit / (capacity / 60.0)).ceil().max(1.0) as u64;
            return Err(AppError::RateLimited { retry_after_secs });
        }

        let remaining = refilled - 1.0;
        let result: std::result::Result<(), redis::RedisError> = redis::pipe()
            .hset(&key, "tokens", remaining)
            .ignore()
            .hset(&key, "updated_at", now)
            .ignore()
            .expire(&key, 120)
            .ignore()
            .query_async(&mut conn)
            .await;

        if let Err(e) = result {
            tracing::warn!("redis write error in rate limiter: {}", e);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_capacity_bucket_never_limits() {
        let limiter = RateLimiter::new(
            redis::Client::open("redis://localhost:6379").unwrap(),
            &RateLimitSettings { write_per_min: 0, read_per_min: 0 },
        );
        assert_eq!(limiter.capacity(RateLimitBucket::Write), 0);
    }

    #[test]
    fn key_is_namespaced_per_tenant_and_bucket() {
        let limiter = RateLimiter::new(
            redis::Client::open("redis://localhost:6379").unwrap(),
            &RateLimitSettings { write_per_min: 60, read_per_min: 120 },
        );
        assert_eq!(limiter.key("tenant-a", RateLimitBucket::Write), "ratelimit:tenant-a:write");
        assert_eq!(limiter.key("tenant-a", RateLimitBucket::Read), "ratelimit:tenant-a:read");
    }
}
