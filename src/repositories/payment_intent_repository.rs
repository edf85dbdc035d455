use crate::error::{AppError, Result};
use crate::models::PaymentIntent;
use chrono::{DateTime, Utc};
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

fn map_customer_ref_conflict(err: sqlx::Error, tenant_id: &str, customer_ref: &str) -> AppError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.constraint() == Some("uq_payment_intents_tenant_customer_ref") {
            return AppError::Conflict(format!(
                "payment intent for tenant {tenant_id} and customer_ref {customer_ref} already exists"
            ));
        }
    }
    AppError::Database(err)
}

/// Repository for PaymentIntent rows. Transition-bearing operations take a live
/// transaction so they can compose with outbox inserts and ledger postings.
pub struct PaymentIntentRepository;

impl PaymentIntentRepository {
    pub fn new() -> Self {
        Self
    }

    /// Inserts a new intent. A `(tenant_id, customer_ref)` collision (guarded by
    /// `uq_payment_intents_tenant_customer_ref`) is surfaced as `AppError::Conflict`
    /// rather than a raw database error, since callers that check-then-insert
    /// (e.g. the inbound consumer) lose that race under concurrent instances.
    pub async fn insert(&self, tx: &mut Transaction<'_, Postgres>, intent: &PaymentIntent) -> Result<PaymentIntent> {
        let row = sqlx::query_as::<_, PaymentIntent>(
            r#"
            INSERT INTO payment_intents
                (id, tenant_id, amount, currency, status, customer_ref, gateway_ref, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id, tenant_id, amount, currency, status, customer_ref, gateway_ref, created_at, updated_at
            "#,
        )
        .bind(intent.id)
        .bind(&intent.tenant_id)
        .bind(intent.amount)
        .bind(intent.currency)
        .bind(intent.status)
        .bind(&intent.customer_ref)
        .bind(&intent.gateway_ref)
        .bind(intent.created_at)
        .bind(intent.updated_at)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| map_customer_ref_conflict(e, &intent.tenant_id, &intent.customer_ref))?;

        Ok(row)
    }

    pub async fn find_by_id(&self, tx: &mut Transaction<'_, Postgres>, tenant_id: &str, id: Uuid) -> Result<Option<PaymentIntent>> {
        let row = sqlx::query_as::<_, PaymentIntent>(
            r#"
            SELECT id, tenant_id, amount, currency, status, customer_ref, gateway_ref, created_at, updated_at
            FROM payment_intents
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Locks the row for the duration of the caller's transaction, serializing
    /// concurrent confirm/settle/refund calls against the same intent.
    pub async fn find_by_id_for_update(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        tenant_id: &str,
        id: Uuid,
    ) -> Result<Option<PaymentIntent>> {
        let row = sqlx::query_as::<_, PaymentIntent>(
            r#"
            SELECT id, tenant_id, amount, currency, status, customer_ref, gateway_ref, created_at, updated_at
            FROM payment_intents
            WHERE tenant_id = $1 AND id = $2
            FOR UPDATE
            "#,
        )
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Pool-based read for handlers that don't need a row lock (plain `GET`s).
    pub async fn find_by_id_pool(&self, pool: &sqlx::PgPool, tenant_id: &str, id: Uuid) -> Result<Option<PaymentIntent>> {
        let row = sqlx::query_as::<_, PaymentIntent>(
            r#"
            SELECT id, tenant_id, amount, currency, status, customer_ref, gateway_ref, created_at, updated_at
            FROM payment_intents
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn find_by_gateway_ref(&self, tenant_id: &str, gateway_ref: &str, pool: &sqlx::PgPool) -> Result<Option<PaymentIntent>> {
        let row = sqlx::query_as::<_, PaymentIntent>(
            r#"
            SELECT id, tenant_id, amount, currency, status, customer_ref, gateway_ref, created_at, updated_at
            FROM payment_intents
            WHERE tenant_id = $1 AND gateway_ref = $2
            "#,
        )
        .bind(tenant_id)
        .bind(gateway_ref)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn find_by_customer_ref(&self, tenant_id: &str, customer_ref: &str, pool: &sqlx::PgPool) -> Result<Option<PaymentIntent>> {
        let row = sqlx::query_as::<_, PaymentIntent>(
            r#"
            SELECT id, tenant_id, amount, currency, status, customer_ref, gateway_ref, created_at, updated_at
            FROM payment_intents
            WHERE tenant_id = $1 AND customer_ref = $2
            "#,
        )
        .bind(tenant_id)
        .bind(customer_ref)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn update_status(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        status: crate::models::payment_intent::PaymentIntentStatus,
        gateway_ref: Option<&str>,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE payment_intents
            SET status = $1, gateway_ref = COALESCE($2, gateway_ref), updated_at = $3
            WHERE id = $4
            "#,
        )
        .bind(status)
        .bind(gateway_ref)
        .bind(updated_at)
        .bind(id)
        .execute(&mut **tx)
        .await
        .map_err(AppError::Database)?;

        Ok(())
    }

    pub async fn find_with_gateway_ref_for_tenant(&self, tenant_id: &str, pool: &sqlx::PgPool) -> Result<Vec<PaymentIntent>> {
        let rows = sqlx::query_as::<_, PaymentIntent>(
            r#"
            SELECT id, tenant_id, amount, currency, status, customer_ref, gateway_ref, created_at, updated_at
            FROM payment_intents
            WHERE tenant_id = $1 AND gateway_ref IS NOT NULL
            "#,
        )
        .bind(tenant_id)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }
}

impl Default for PaymentIntentRepository {
    fn default() -> Self {
        Self::new()
    }
}
