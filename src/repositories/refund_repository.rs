use crate::error::{AppError, Result};
use crate::models::{Refund, RefundStatus};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

pub struct RefundRepository;

impl RefundRepository {
    pub fn new() -> Self {
        Self
    }

    pub async fn insert(&self, tx: &mut Transaction<'_, Postgres>, refund: &Refund) -> Result<Refund> {
        let row = sqlx::query_as::<_, Refund>(
            r#"
            INSERT INTO refunds (id, tenant_id, payment_intent_id, amount, reason, status, gateway_ref, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, tenant_id, payment_intent_id, amount, reason, status, gateway_ref, created_at
            "#,
        )
        .bind(refund.id)
        .bind(&refund.tenant_id)
        .bind(refund.payment_intent_id)
        .bind(refund.amount)
        .bind(&refund.reason)
        .bind(refund.status)
        .bind(&refund.gateway_ref)
        .bind(refund.created_at)
        .fetch_one(&mut **tx)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn update_status(&self, tx: &mut Transaction<'_, Postgres>, id: Uuid, status: RefundStatus) -> Result<()> {
        sqlx::query(r#"UPDATE refunds SET status = $1 WHERE id = $2"#)
            .bind(status)
            .bind(id)
            .execute(&mut **tx)
            .await
            .map_err(AppError::Database)?;

        Ok(())
    }

    /// Sum of non-FAILED refunds already recorded against an intent, used to
    /// enforce the refund-saturation invariant.
    pub async fn sum_non_failed(&self, tx: &mut Transaction<'_, Postgres>, payment_intent_id: Uuid) -> Result<Decimal> {
        let row: (Option<Decimal>,) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(amount), 0)
            FROM refunds
            WHERE payment_intent_id = $1 AND status != 'FAILED'
            "#,
        )
        .bind(payment_intent_id)
        .fetch_one(&mut **tx)
        .await
        .map_err(AppError::Database)?;

        Ok(row.0.unwrap_or(Decimal::ZERO))
    }

    pub async fn find_by_payment_intent(&self, pool: &PgPool, tenant_id: &str, payment_intent_id: Uuid) -> Result<Vec<Refund>> {
        let rows = sqlx::query_as::<_, Refund>(
            r#"
            SELECT id, tenant_id, payment_intent_id, amount, reason, status, gateway_ref, created_at
            FROM refunds
            WHERE tenant_id = $1 AND payment_intent_id = $2
            ORDER BY created_at ASC
            "#,
        )
        .bind(tenant_id)
        .bind(payment_intent_id)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }
}

impl Default for RefundRepository {
    fn default() -> Self {
        Self::new()
    }
}
