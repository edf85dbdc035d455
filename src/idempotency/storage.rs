use crate::error::{AppError, Result};
use chrono::{DateTime, Duration, Utc};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Status of an idempotency record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "UPPERCASE")]
pub enum IdempotencyStatus {
    Processing,
    Completed,
    Failed,
}

/// Stored idempotency record, keyed by the composite `idem:<tenant>:<op>:<resource>:<key>`
/// string built by `key_generator::composite_key`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct IdempotencyRecord {
    pub id: Uuid,
    pub idempotency_key: String,
    pub tenant_id: String,
    pub operation: String,
    pub status: IdempotencyStatus,
    pub request_hash: String,
    pub response_data: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl IdempotencyRecord {
    pub fn new(idempotency_key: String, tenant_id: String, operation: String, request_hash: String, ttl_seconds: i64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            idempotency_key,
            tenant_id,
            operation,
            status: IdempotencyStatus::Processing,
            request_hash,
            response_data: None,
            error_message: None,
            created_at: now,
            expires_at: now + Duration::seconds(ttl_seconds),
            completed_at: None,
        }
    }
}

/// PostgreSQL-backed idempotency storage, the durable half of the hybrid store.
pub struct PostgresIdempotencyStore {
    pool: PgPool,
}

impl PostgresIdempotencyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a new record, or returns the existing one on key collision.
    pub async fn try_acquire(&self, record: &IdempotencyRecord) -> Result<Option<IdempotencyRecord>> {
        let existing = sqlx::query_as::<_, IdempotencyRecord>(
            r#"
            INSERT INTO idempotency_keys (id, idempotency_key, tenant_id, operation, status, request_hash, response_data, error_message, created_at, expires_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (idempotency_key) DO UPDATE SET idempotency_key = idempotency_keys.idempotency_key
            RETURNING id, idempotency_key, tenant_id, operation, status, request_hash, response_data, error_message, created_at, expires_at, completed_at
            "#,
        )
        .bind(record.id)
        .bind(&record.idempotency_key)
        .bind(&record.tenant_id)
        .bind(&record.operation)
        .bind(record.status)
        .bind(&record.request_hash)
        .bind(&record.response_data)
        .bind(&record.error_message)
        .bind(record.created_at)
        .bind(record.expires_at)
        .bind(record.completed_at)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        if existing.id == record.id {
            Ok(None)
        } else {
            Ok(Some(existing))
        }
    }

    pub async fn find_by_key(&self, key: &str) -> Result<Option<IdempotencyRecord>> {
        let record = sqlx::query_as::<_, IdempotencyRecord>(
            r#"
            SELECT id, idempotency_key, tenant_id, operation, status, request_hash, response_data, error_message, created_at, expires_at, completed_at
            FROM idempotency_keys
            WHERE idempotency_key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(record)
    }

    pub async fn mark_completed(&self, key: &str, response_data: serde_json::Value) -> Result<Option<IdempotencyRecord>> {
        let record = sqlx::query_as::<_, IdempotencyRecord>(
            r#"
            UPDATE idempotency_keys
            SET status = 'COMPLETED', response_data = $2, completed_at = NOW()
            WHERE idempotency_key = $1
            RETURNING id, idempotency_key, tenant_id, operation, status, request_hash, response_data, error_message, created_at, expires_at, completed_at
            "#,
        )
        .bind(key)
        .bind(response_data)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(record)
    }

    pub async fn mark_failed(&self, key: &str, error_message: &str) -> Result<Option<IdempotencyRecord>> {
        let record = sqlx::query_as::<_, IdempotencyRecord>(
            r#"
            UPDATE idempotency_keys
            SET status = 'FAILED', error_message = $2, completed_at = NOW()
            WHERE idempotency_key = $1
            RETURNING id, idempotency_key, tenant_id, operation, status, request_hash, response_data, error_message, created_at, expires_at, completed_at
            "#,
        )
        .bind(key)
        .bind(error_message)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(record)
    }

    pub async fn cleanup_expired(&self) -> Result<u64> {
        let result = sqlx::query(r#"DELETE FROM idempotency_keys WHERE expires_at < NOW()"#)
            .execute(&self.pool)
            .await
            .map_err(AppError::Database)?;

        Ok(result.rows_affected())
    }
}

/// Redis-backed fast path for the idempotency check, ahead of the durable
/// Postgres store.
pub struct RedisIdempotencyCache {
    client: redis::Client,
}

impl RedisIdempotencyCache {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    /// Sets the key with `NX` semantics; returns true if this call created it.
    pub async fn try_set(&self, idempotency_key: &str, ttl_seconds: i64) -> Result<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(AppError::Redis)?;

        let result: Option<String> = conn
            .set_options(
                idempotency_key,
                "processing",
                redis::SetOptions::default()
                    .conditional_set(redis::ExistenceCheck::NX)
                    .with_expiration(redis::SetExpiry::EX(ttl_seconds as usize)),
            )
            .await
            .map_err(AppError::Redis)?;

        Ok(result.is_some())
    }

    pub async fn exists(&self, idempotency_key: &str) -> Result<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(AppError::Redis)?;
        let exists: bool = conn.exists(idempotency_key).await.map_err(AppError::Redis)?;
        Ok(exists)
    }

    pub async fn set_response(&self, idempotency_key: &str, response: &str, ttl_seconds: i64) -> Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(AppError::Redis)?;
        let _: () = conn.set_ex(idempotency_key, response, ttl_seconds as u64).await.map_err(AppError::Redis)?;
        Ok(())
    }

    pub async fn delete(&self, idempotency_key: &str) -> Result<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(AppError::Redis)?;
        let deleted: i64 = conn.del(idempotency_key).await.map_err(AppError::Redis)?;
        Ok(deleted > 0)
    }
}

/// Combined store: Redis for cheap existence checks, Postgres for the durable
/// record and response payload.
pub struct HybridIdempotencyStore {
    postgres: PostgresIdempotencyStore,
    redis: RedisIdempotencyCache,
    ttl_seconds: i64,
}

impl HybridIdempotencyStore {
    pub fn new(postgres: PostgresIdempotencyStore, redis: RedisIdempotencyCache, ttl_seconds: i64) -> Self {
        Self { postgres, redis, ttl_seconds }
    }

    pub async fn check_duplicate(&self, idempotency_key: &str) -> Result<Option<IdempotencyRecord>> {
        if self.redis.exists(idempotency_key).await? {
            return self.postgres.find_by_key(idempotency_key).await;
        }
        self.postgres.find_by_key(idempotency_key).await
    }

    pub async fn try_acquire(&self, record: &IdempotencyRecord) -> Result<Option<IdempotencyRecord>> {
        let is_new = self.redis.try_set(&record.idempotency_key, self.ttl_seconds).await?;

        if !is_new {
            return self.postgres.find_by_key(&record.idempotency_key).await;
        }

        match self.postgres.try_acquire(record).await {
            Ok(existing) => {
                if existing.is_some() {
                    self.redis.set_response(&record.idempotency_key, "processing", self.ttl_seconds).await?;
                }
                Ok(existing)
            }
            Err(e) => {
                self.redis.delete(&record.idempotency_key).await.ok();
                Err(e)
            }
        }
    }

    pub async fn mark_completed(&self, idempotency_key: &str, response_data: serde_json::Value) -> Result<Option<IdempotencyRecord>> {
        let record = self.postgres.mark_completed(idempotency_key, response_data.clone()).await?;

        if record.is_some() {
            let response_str = serde_json::to_string(&response_data).unwrap_or_default();
            self.redis.set_response(idempotency_key, &response_str, self.ttl_seconds).await?;
        }

        Ok(record)
    }

    pub async fn mark_failed(&self, idempotency_key: &str, error_message: &str) -> Result<Option<IdempotencyRecord>> {
        let record = self.postgres.mark_failed(idempotency_key, error_message).await?;
        self.redis.delete(idempotency_key).await.ok();
        Ok(record)
    }

    pub async fn cleanup_expired(&self) -> Result<u64> {
        self.postgres.cleanup_expired().await
    }
}
