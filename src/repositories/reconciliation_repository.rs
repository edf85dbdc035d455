use crate::error::{AppError, Result};
use crate::models::ReconciliationDiscrepancy;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

pub struct ReconciliationRepository;

impl ReconciliationRepository {
    pub fn new() -> Self {
        Self
    }

    pub async fn insert(&self, tx: &mut Transaction<'_, Postgres>, disc: &ReconciliationDiscrepancy) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO reconciliation_discrepancies
                (id, tenant_id, payment_intent_id, discrepancy_type, gateway_ref, expected_amount, actual_amount, expected_status, actual_status, resolved, details, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(disc.id)
        .bind(&disc.tenant_id)
        .bind(disc.payment_intent_id)
        .bind(disc.discrepancy_type)
        .bind(&disc.gateway_ref)
        .bind(disc.expected_amount)
        .bind(disc.actual_amount)
        .bind(&disc.expected_status)
        .bind(&disc.actual_status)
        .bind(disc.resolved)
        .bind(&disc.details)
        .bind(disc.created_at)
        .execute(&mut **tx)
        .await
        .map_err(AppError::Database)?;

        Ok(())
    }

    pub async fn list(&self, pool: &PgPool, tenant_id: &str, resolved: Option<bool>, limit: i64) -> Result<Vec<ReconciliationDiscrepancy>> {
        let rows = match resolved {
            Some(resolved) => {
                sqlx::query_as::<_, ReconciliationDiscrepancy>(
                    r#"
                    SELECT id, tenant_id, payment_intent_id, discrepancy_type, gateway_ref, expected_amount, actual_amount, expected_status, actual_status, resolved, details, created_at
                    FROM reconciliation_discrepancies
                    WHERE tenant_id = $1 AND resolved = $2
                    ORDER BY created_at DESC
                    LIMIT $3
                    "#,
                )
                .bind(tenant_id)
                .bind(resolved)
                .bind(limit)
                .fetch_all(pool)
                .await
            }
            None => {
                sqlx::query_as::<_, ReconciliationDiscrepancy>(
                    r#"
                    SELECT id, tenant_id, payment_intent_id, discrepancy_type, gateway_ref, expected_amount, actual_amount, expected_status, actual_status, resolved, details, created_at
                    FROM reconciliation_discrepancies
                    WHERE tenant_id = $1
                    ORDER BY created_at DESC
                    LIMIT $2
                    "#,
                )
                .bind(tenant_id)
                .bind(limit)
                .fetch_all(pool)
                .await
            }
        }
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    pub async fn resolve(&self, pool: &PgPool, tenant_id: &str, id: Uuid) -> Result<Option<ReconciliationDiscrepancy>> {
        let row = sqlx::query_as::<_, ReconciliationDiscrepancy>(
            r#"
            UPDATE reconciliation_discrepancies
            SET resolved = true
            WHERE tenant_id = $1 AND id = $2
            RETURNING id, tenant_id, payment_intent_id, discrepancy_type, gateway_ref, expected_amount, actual_amount, expected_status, actual_status, resolved, details, created_at
            "#,
        )
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }
}

impl Default for ReconciliationRepository {
    fn default() -> Self {
        Self::new()
    }
}
