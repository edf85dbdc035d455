use crate::error::{AppError, Result};
use crate::models::{Currency, LedgerEntry, LedgerLine};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashMap;
use uuid::Uuid;

/// Repository for LedgerEntry headers and their LedgerLine rows.
pub struct LedgerRepository;

impl LedgerRepository {
    pub fn new() -> Self {
        Self
    }

    /// Inserts the entry header and both lines of a `BalancedPair` in one transaction.
    pub async fn post_pair(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        tenant_id: &str,
        payment_intent_id: Uuid,
        pair: &crate::models::BalancedPair,
    ) -> Result<LedgerEntry> {
        let entry = LedgerEntry {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.to_string(),
            payment_intent_id,
            posted_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO ledger_entries (id, tenant_id, payment_intent_id, posted_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(entry.id)
        .bind(&entry.tenant_id)
        .bind(entry.payment_intent_id)
        .bind(entry.posted_at)
        .execute(&mut **tx)
        .await
        .map_err(AppError::Database)?;

        for line in [&pair.debit, &pair.credit] {
            self.insert_line(tx, entry.id, line).await?;
        }

        Ok(entry)
    }

    async fn insert_line(&self, tx: &mut Transaction<'_, Postgres>, entry_id: Uuid, line: &LedgerLine) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO ledger_lines (id, tenant_id, entry_id, side, account, amount, currency)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(line.id)
        .bind(&line.tenant_id)
        .bind(entry_id)
        .bind(line.side)
        .bind(&line.account)
        .bind(line.amount)
        .bind(line.currency)
        .execute(&mut **tx)
        .await
        .map_err(AppError::Database)?;

        Ok(())
    }

    pub async fn find_entries_in_range(
        &self,
        pool: &PgPool,
        tenant_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<LedgerEntry>> {
        let rows = sqlx::query_as::<_, LedgerEntry>(
            r#"
            SELECT id, tenant_id, payment_intent_id, posted_at
            FROM ledger_entries
            WHERE tenant_id = $1 AND posted_at >= $2 AND posted_at < $3
            ORDER BY posted_at ASC
            LIMIT $4
            "#,
        )
        .bind(tenant_id)
        .bind(from)
        .bind(to)
        .bind(limit)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    pub async fn find_lines_for_entry(&self, pool: &PgPool, entry_id: Uuid) -> Result<Vec<LedgerLine>> {
        let rows = sqlx::query_as::<_, LedgerLine>(
            r#"
            SELECT id, tenant_id, entry_id, side, account, amount, currency
            FROM ledger_lines
            WHERE entry_id = $1
            "#,
        )
        .bind(entry_id)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    /// Per-(account, currency) debit/credit totals for a period, backing the
    /// `GET /reports/account-balances` report.
    pub async fn account_balance_totals(
        &self,
        pool: &PgPool,
        tenant_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<HashMap<(String, Currency), (Decimal, Decimal)>> {
        let rows: Vec<(String, Currency, Decimal, Decimal)> = sqlx::query_as(
            r#"
            SELECT
                l.account,
                l.currency,
                COALESCE(SUM(CASE WHEN l.side = 'DEBIT' THEN l.amount ELSE 0 END), 0) AS debits,
                COALESCE(SUM(CASE WHEN l.side = 'CREDIT' THEN l.amount ELSE 0 END), 0) AS credits
            FROM ledger_lines l
            JOIN ledger_entries e ON e.id = l.entry_id
            WHERE l.tenant_id = $1 AND e.posted_at >= $2 AND e.posted_at < $3
            GROUP BY l.account, l.currency
            "#,
        )
        .bind(tenant_id)
        .bind(from)
        .bind(to)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows
            .into_iter()
            .map(|(account, currency, debits, credits)| ((account, currency), (debits, credits)))
            .collect())
    }

    /// Sum of `REVENUE` credits bucketed by calendar period, for the
    /// `GET /reports/revenue` report's `granularity` parameter. `granularity`
    /// must be one of `"day"`, `"week"`, `"month"` (validated by the caller).
    pub async fn revenue_by_currency_bucketed(
        &self,
        pool: &PgPool,
        tenant_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        granularity: &str,
    ) -> Result<Vec<(DateTime<Utc>, Currency, Decimal)>> {
        let rows: Vec<(DateTime<Utc>, Currency, Decimal)> = sqlx::query_as(
            r#"
            SELECT date_trunc($4, e.posted_at) AS period, l.currency, COALESCE(SUM(l.amount), 0)
            FROM ledger_lines l
            JOIN ledger_entries e ON e.id = l.entry_id
            WHERE l.tenant_id = $1
              AND l.account = 'REVENUE'
              AND l.side = 'CREDIT'
              AND e.posted_at >= $2 AND e.posted_at < $3
            GROUP BY period, l.currency
            ORDER BY period ASC
            "#,
        )
        .bind(tenant_id)
        .bind(from)
        .bind(to)
        .bind(granularity)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    /// Sum of `REVENUE` credits, for the `GET /reports/revenue` report.
    pub async fn revenue_by_currency(
        &self,
        pool: &PgPool,
        tenant_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<(Currency, Decimal)>> {
        let rows: Vec<(Currency, Decimal)> = sqlx::query_as(
            r#"
            SELECT l.currency, COALESCE(SUM(l.amount), 0)
            FROM ledger_lines l
            JOIN ledger_entries e ON e.id = l.entry_id
            WHERE l.tenant_id = $1
              AND l.account = 'REVENUE'
              AND l.side = 'CREDIT'
              AND e.posted_at >= $2 AND e.posted_at < $3
            GROUP BY l.currency
            "#,
        )
        .bind(tenant_id)
        .bind(from)
        .bind(to)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }
}

impl Default for LedgerRepository {
    fn default() -> Self {
        Self::new()
    }
}
