use crate::clock::{Clock, SystemClock};
use crate::error::{AppError, Result};
use crate::models::{DeliveryStatus, WebhookDelivery, WebhookEndpoint};
use std::sync::Arc;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

pub struct WebhookRepository {
    clock: Arc<dyn Clock>,
}

impl WebhookRepository {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    pub async fn insert_endpoint(&self, pool: &PgPool, endpoint: &WebhookEndpoint) -> Result<WebhookEndpoint> {
        let row = sqlx::query_as::<_, WebhookEndpoint>(
            r#"
            INSERT INTO webhook_endpoints (id, tenant_id, url, secret, events, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, tenant_id, url, secret, events, is_active, created_at
            "#,
        )
        .bind(endpoint.id)
        .bind(&endpoint.tenant_id)
        .bind(&endpoint.url)
        .bind(&endpoint.secret)
        .bind(&endpoint.events)
        .bind(endpoint.is_active)
        .bind(endpoint.created_at)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn list_endpoints(&self, pool: &PgPool, tenant_id: &str) -> Result<Vec<WebhookEndpoint>> {
        let rows = sqlx::query_as::<_, WebhookEndpoint>(
            r#"
            SELECT id, tenant_id, url, secret, events, is_active, created_at
            FROM webhook_endpoints
            WHERE tenant_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(tenant_id)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    pub async fn delete_endpoint(&self, pool: &PgPool, tenant_id: &str, id: Uuid) -> Result<bool> {
        let result = sqlx::query(r#"DELETE FROM webhook_endpoints WHERE tenant_id = $1 AND id = $2"#)
            .bind(tenant_id)
            .bind(id)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn find_active_endpoints(&self, pool: &PgPool, tenant_id: &str) -> Result<Vec<WebhookEndpoint>> {
        let rows = sqlx::query_as::<_, WebhookEndpoint>(
            r#"
            SELECT id, tenant_id, url, secret, events, is_active, created_at
            FROM webhook_endpoints
            WHERE tenant_id = $1 AND is_active = true
            "#,
        )
        .bind(tenant_id)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    pub async fn insert_delivery(&self, tx: &mut Transaction<'_, Postgres>, delivery: &WebhookDelivery) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO webhook_deliveries
                (id, endpoint_id, tenant_id, event_type, payload, status, attempts, last_attempt_at, response_code, next_retry_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(delivery.id)
        .bind(delivery.endpoint_id)
        .bind(&delivery.tenant_id)
        .bind(&delivery.event_type)
        .bind(&delivery.payload)
        .bind(delivery.status)
        .bind(delivery.attempts)
        .bind(delivery.last_attempt_at)
        .bind(delivery.response_code)
        .bind(delivery.next_retry_at)
        .bind(delivery.created_at)
        .execute(&mut **tx)
        .await
        .map_err(AppError::Database)?;

        Ok(())
    }

    /// Claims deliveries due for (re)attempt, mirroring the outbox claim shape but
    /// against the fixed `[60, 300, 1800]` retry ladder instead of a lease.
    pub async fn claim_due(&self, pool: &PgPool, limit: i64) -> Result<Vec<WebhookDelivery>> {
        let rows = sqlx::query_as::<_, WebhookDelivery>(
            r#"
            SELECT id, endpoint_id, tenant_id, event_type, payload, status, attempts, last_attempt_at, response_code, next_retry_at, created_at
            FROM webhook_deliveries
            WHERE status IN ('PENDING', 'RETRYING') AND next_retry_at <= $1
            ORDER BY created_at ASC
            LIMIT $2
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(self.clock.now())
        .bind(limit)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    pub async fn update_after_attempt(&self, pool: &PgPool, delivery: &WebhookDelivery) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE webhook_deliveries
            SET status = $1, attempts = $2, last_attempt_at = $3, response_code = $4, next_retry_at = $5
            WHERE id = $6
            "#,
        )
        .bind(delivery.status)
        .bind(delivery.attempts)
        .bind(delivery.last_attempt_at)
        .bind(delivery.response_code)
        .bind(delivery.next_retry_at)
        .bind(delivery.id)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(())
    }

    pub async fn find_by_id(&self, pool: &PgPool, id: Uuid) -> Result<Option<WebhookDelivery>> {
        let row = sqlx::query_as::<_, WebhookDelivery>(
            r#"
            SELECT id, endpoint_id, tenant_id, event_type, payload, status, attempts, last_attempt_at, response_code, next_retry_at, created_at
            FROM webhook_deliveries
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn find_failed(&self, pool: &PgPool, tenant_id: &str, limit: i64) -> Result<Vec<WebhookDelivery>> {
        let rows = sqlx::query_as::<_, WebhookDelivery>(
            r#"
            SELECT id, endpoint_id, tenant_id, event_type, payload, status, attempts, last_attempt_at, response_code, next_retry_at, created_at
            FROM webhook_deliveries
            WHERE tenant_id = $1 AND status = $2
            ORDER BY created_at DESC
            LIMIT $3
            "#,
        )
        .bind(tenant_id)
        .bind(DeliveryStatus::Failed)
        .bind(limit)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }
}

impl Default for WebhookRepository {
    fn default() -> Self {
        Self::new()
    }
}
