use crate::error::{AppError, Result};
use crate::idempotency::key_generator::composite_key;
use crate::idempotency::storage::{
    HybridIdempotencyStore, IdempotencyRecord, IdempotencyStatus, PostgresIdempotencyStore, RedisIdempotencyCache,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Metrics for idempotency handling.
#[derive(Debug, Default)]
pub struct IdempotencyMetrics {
    pub total_requests: AtomicU64,
    pub duplicate_requests: AtomicU64,
    pub new_requests: AtomicU64,
    pub completed_requests: AtomicU64,
    pub failed_requests: AtomicU64,
}

impl IdempotencyMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate(&self) {
        self.duplicate_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_new(&self) {
        self.new_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_completed(&self) {
        self.completed_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            duplicate_requests: self.duplicate_requests.load(Ordering::Relaxed),
            new_requests: self.new_requests.load(Ordering::Relaxed),
            completed_requests: self.completed_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub duplicate_requests: u64,
    pub new_requests: u64,
    pub completed_requests: u64,
    pub failed_requests: u64,
}

impl MetricsSnapshot {
    pub fn duplicate_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.duplicate_requests as f64 / self.total_requests as f64
        }
    }
}

/// Result of an idempotency check.
#[derive(Debug)]
pub enum IdempotencyCheckResult<T> {
    New,
    Duplicate(T),
    Processing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyHandlerConfig {
    pub ttl_seconds: i64,
}

impl Default for IdempotencyHandlerConfig {
    fn default() -> Self {
        Self { ttl_seconds: 86400 }
    }
}

/// Handler for idempotent request processing keyed by the composite
/// `idem:<tenant>:<op>:<resource>:<key>` string.
pub struct IdempotencyHandler {
    store: HybridIdempotencyStore,
    metrics: Arc<IdempotencyMetrics>,
    config: IdempotencyHandlerConfig,
}

impl IdempotencyHandler {
    pub fn new(pool: PgPool, redis_client: redis::Client, config: IdempotencyHandlerConfig) -> Self {
        let postgres_store = PostgresIdempotencyStore::new(pool);
        let redis_cache = RedisIdempotencyCache::new(redis_client);
        let store = HybridIdempotencyStore::new(postgres_store, redis_cache, config.ttl_seconds);

        Self {
            store,
            metrics: Arc::new(IdempotencyMetrics::new()),
            config,
        }
    }

    pub fn metrics(&self) -> Arc<IdempotencyMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn key(&self, tenant_id: &str, operation: &str, resource: &str, idempotency_key: &str) -> String {
        composite_key(tenant_id, operation, resource, idempotency_key)
    }

    /// Computes a hash of the request body, used to detect a key reused against
    /// a different payload.
    pub fn hash_request<T: Serialize>(&self, request: &T) -> String {
        let json = serde_json::to_string(request).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        hex::encode(hasher.finalize())
    }

    async fn check<T: for<'de> Deserialize<'de>>(
        &self,
        key: &str,
        tenant_id: &str,
        operation: &str,
        request_hash: &str,
    ) -> Result<IdempotencyCheckResult<T>> {
        self.metrics.record_request();

        if let Some(existing) = self.store.check_duplicate(key).await? {
            return self.classify(existing, request_hash);
        }

        let record = IdempotencyRecord::new(key.to_string(), tenant_id.to_string(), operation.to_string(), request_hash.to_string(), self.config.ttl_seconds);

        match self.store.try_acquire(&record).await? {
            Some(existing) => self.classify(existing, request_hash),
            None => {
                self.metrics.record_new();
                Ok(IdempotencyCheckResult::New)
            }
        }
    }

    fn classify<T: for<'de> Deserialize<'de>>(&self, existing: IdempotencyRecord, request_hash: &str) -> Result<IdempotencyCheckResult<T>> {
        self.metrics.record_duplicate();

        if existing.request_hash != request_hash {
            return Err(AppError::Conflict(
                "Idempotency-Key reused with a different request body".to_string(),
            ));
        }

        match existing.status {
            IdempotencyStatus::Completed => {
                let response_data = existing.response_data.ok_or_else(|| {
                    AppError::Internal(anyhow::anyhow!("completed idempotency record has no response data"))
                })?;
                let response: T = serde_json::from_value(response_data)
                    .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to deserialize cached response: {e}")))?;
                Ok(IdempotencyCheckResult::Duplicate(response))
            }
            IdempotencyStatus::Processing => Ok(IdempotencyCheckResult::Processing),
            IdempotencyStatus::Failed => {
                self.metrics.record_new();
                Ok(IdempotencyCheckResult::New)
            }
        }
    }

    async fn complete<T: Serialize>(&self, key: &str, response: &T) -> Result<()> {
        let response_data = serde_json::to_value(response)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to serialize response: {e}")))?;

        self.store.mark_completed(key, response_data).await?;
        self.metrics.record_completed();
        Ok(())
    }

    async fn fail(&self, key: &str, error_message: &str) -> Result<()> {
        self.store.mark_failed(key, error_message).await?;
        self.metrics.record_failed();
        Ok(())
    }

    /// Runs `operation` under idempotency protection for `idempotency_key`,
    /// returning the cached response on a verified duplicate and a conflict if
    /// the same key is reused with a different request body.
    pub async fn execute<T, F, Fut>(
        &self,
        tenant_id: &str,
        operation: &str,
        resource: &str,
        idempotency_key: &str,
        request_hash: &str,
        work: F,
    ) -> Result<T>
    where
        T: Serialize + for<'de> Deserialize<'de> + Clone,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let key = self.key(tenant_id, operation, resource, idempotency_key);

        match self.check::<T>(&key, tenant_id, operation, request_hash).await? {
            IdempotencyCheckResult::Duplicate(response) => return Ok(response),
            IdempotencyCheckResult::Processing => {
                return Err(AppError::Conflict(
                    "request with this Idempotency-Key is already being processed".to_string(),
                ));
            }
            IdempotencyCheckResult::New => {}
        }

        match work().await {
            Ok(response) => {
                if let Err(e) = self.complete(&key, &response).await {
                    tracing::error!(error = %e, "failed to mark idempotency key completed");
                }
                Ok(response)
            }
            Err(e) => {
                if let Err(mark_err) = self.fail(&key, &e.to_string()).await {
                    tracing::error!(error = %mark_err, "failed to mark idempotency key failed");
                }
                Err(e)
            }
        }
    }

    pub async fn cleanup_expired(&self) -> Result<u64> {
        self.store.cleanup_expired().await
    }
}

/// Background cleanup job for expired idempotency records.
pub struct IdempotencyCleanupJob {
    handler: Arc<IdempotencyHandler>,
    interval_seconds: u64,
}

impl IdempotencyCleanupJob {
    pub fn new(handler: Arc<IdempotencyHandler>, interval_seconds: u64) -> Self {
        Self { handler, interval_seconds }
    }

    pub async fn run_once(&self) -> Result<u64> {
        self.handler.cleanup_expired().await
    }

    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(self.interval_seconds));

            loop {
                interval.tick().await;

                match self.handler.cleanup_expired().await {
                    Ok(count) => {
                        if count > 0 {
                            tracing::info!(count, "cleaned up expired idempotency records");
                        }
                    }
                    Err(e) => tracing::error!(error = %e, "failed to clean up expired idempotency records"),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_snapshot_tracks_counts() {
        let metrics = IdempotencyMetrics::new();
        metrics.record_request();
        metrics.record_request();
        metrics.record_duplicate();
        metrics.record_new();
        metrics.record_completed();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_requests, 2);
        assert_eq!(snapshot.duplicate_requests, 1);
        assert_eq!(snapshot.duplicate_rate(), 0.5);
    }

    #[test]
    fn default_config_uses_24h_ttl() {
        assert_eq!(IdempotencyHandlerConfig::default().ttl_seconds, 86400);
    }
}
