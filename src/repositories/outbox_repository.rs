use crate::clock::{Clock, SystemClock};
use crate::error::{AppError, Result};
use crate::models::outbox::{backoff_seconds, DEFAULT_CLAIM_LIMIT, DEFAULT_LOCK_TIMEOUT_SECONDS, DEFAULT_MAX_ATTEMPTS};
use crate::models::{OutboxEvent, OutboxStatus};
use std::sync::Arc;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

pub struct OutboxRepository {
    clock: Arc<dyn Clock>,
}

impl OutboxRepository {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    pub async fn insert(&self, tx: &mut Transaction<'_, Postgres>, event: &OutboxEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO outbox_events
                (id, tenant_id, event_type, aggregate_type, aggregate_id, payload, status, attempts, available_at, locked_at, locked_by, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(event.id)
        .bind(&event.tenant_id)
        .bind(&event.event_type)
        .bind(&event.aggregate_type)
        .bind(&event.aggregate_id)
        .bind(&event.payload)
        .bind(event.status)
        .bind(event.attempts)
        .bind(event.available_at)
        .bind(event.locked_at)
        .bind(&event.locked_by)
        .bind(event.created_at)
        .execute(&mut **tx)
        .await
        .map_err(AppError::Database)?;

        Ok(())
    }

    /// Claims up to `limit` (default 50) PENDING rows whose lease is free, locking
    /// them to `worker_id`.
    pub async fn claim_batch(&self, pool: &PgPool, worker_id: &str, limit: Option<i64>) -> Result<Vec<OutboxEvent>> {
        let limit = limit.unwrap_or(DEFAULT_CLAIM_LIMIT);
        let now = self.clock.now();
        let lock_cutoff = now - chrono::Duration::seconds(DEFAULT_LOCK_TIMEOUT_SECONDS);

        let mut tx = pool.begin().await.map_err(AppError::Database)?;

        let claimed = sqlx::query_as::<_, OutboxEvent>(
            r#"
            SELECT id, tenant_id, event_type, aggregate_type, aggregate_id, payload, status, attempts, available_at, locked_at, locked_by, created_at
            FROM outbox_events
            WHERE status = 'PENDING'
              AND available_at <= $1
              AND (locked_at IS NULL OR locked_at < $2)
            ORDER BY created_at ASC
            LIMIT $3
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(now)
        .bind(lock_cutoff)
        .bind(limit)
        .fetch_all(&mut *tx)
        .await
        .map_err(AppError::Database)?;

        let ids: Vec<Uuid> = claimed.iter().map(|e| e.id).collect();
        if !ids.is_empty() {
            sqlx::query(
                r#"UPDATE outbox_events SET locked_at = $1, locked_by = $2 WHERE id = ANY($3)"#,
            )
            .bind(now)
            .bind(worker_id)
            .bind(&ids)
            .execute(&mut *tx)
            .await
            .map_err(AppError::Database)?;
        }

        tx.commit().await.map_err(AppError::Database)?;

        Ok(claimed
            .into_iter()
            .map(|mut e| {
                e.locked_at = Some(now);
                e.locked_by = Some(worker_id.to_string());
                e
            })
            .collect())
    }

    pub async fn mark_sent(&self, pool: &PgPool, id: Uuid) -> Result<()> {
        sqlx::query(
            r#"UPDATE outbox_events SET status = 'SENT', locked_at = NULL, locked_by = NULL WHERE id = $1"#,
        )
        .bind(id)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(())
    }

    /// Increments `attempts`, clears the lease, and either dead-letters the event
    /// (`attempts >= max_attempts`, default 7) or schedules the next attempt using
    /// the exponential-backoff-with-jitter delay.
    pub async fn mark_failed(&self, pool: &PgPool, id: Uuid, attempts: i32, max_attempts: Option<i32>) -> Result<()> {
        let max_attempts = max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS);
        let new_attempts = attempts + 1;

        if new_attempts >= max_attempts {
            sqlx::query(
                r#"UPDATE outbox_events SET status = 'DEAD', attempts = $1, locked_at = NULL, locked_by = NULL WHERE id = $2"#,
            )
            .bind(new_attempts)
            .bind(id)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;
        } else {
            let delay = backoff_seconds(new_attempts);
            let available_at = self.clock.now() + chrono::Duration::milliseconds((delay * 1000.0) as i64);
            sqlx::query(
                r#"UPDATE outbox_events SET attempts = $1, available_at = $2, locked_at = NULL, locked_by = NULL WHERE id = $3"#,
            )
            .bind(new_attempts)
            .bind(available_at)
            .bind(id)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;
        }

        Ok(())
    }

    pub async fn find_dead(&self, pool: &PgPool, tenant_id: &str, limit: i64) -> Result<Vec<OutboxEvent>> {
        let rows = sqlx::query_as::<_, OutboxEvent>(
            r#"
            SELECT id, tenant_id, event_type, aggregate_type, aggregate_id, payload, status, attempts, available_at, locked_at, locked_by, created_at
            FROM outbox_events
            WHERE tenant_id = $1 AND status = $2
            ORDER BY created_at DESC
            LIMIT $3
            "#,
        )
        .bind(tenant_id)
        .bind(OutboxStatus::Dead)
        .bind(limit)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    pub async fn find_by_id(&self, pool: &PgPool, id: Uuid) -> Result<Option<OutboxEvent>> {
        let row = sqlx::query_as::<_, OutboxEvent>(
            r#"
            SELECT id, tenant_id, event_type, aggregate_type, aggregate_id, payload, status, attempts, available_at, locked_at, locked_by, created_at
            FROM outbox_events
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }
}

impl Default for OutboxRepository {
    fn default() -> Self {
        Self::new()
    }
}
