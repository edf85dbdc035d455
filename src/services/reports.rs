use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;

use crate::error::Result;
use crate::models::Currency;
use crate::repositories::LedgerRepository;

/// Ad-hoc aggregate reporting over the ledger. Deliberately not a streaming or
/// analytical query engine.
pub struct ReportService {
    pool: PgPool,
    ledger: LedgerRepository,
}

#[derive(Debug, Clone, Serialize)]
pub struct RevenueByCurrency {
    pub currency: Currency,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct RevenueBucket {
    pub period: DateTime<Utc>,
    pub currency: Currency,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountBalance {
    pub account: String,
    pub currency: Currency,
    pub debits: Decimal,
    pub credits: Decimal,
    pub net: Decimal,
}

impl ReportService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool, ledger: LedgerRepository::new() }
    }

    pub async fn revenue(&self, tenant_id: &str, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<RevenueByCurrency>> {
        let rows = self.ledger.revenue_by_currency(&self.pool, tenant_id, from, to).await?;
        Ok(rows.into_iter().map(|(currency, amount)| RevenueByCurrency { currency, amount }).collect())
    }

    /// Revenue by currency bucketed into `granularity` periods (`"day"`, `"week"`
    /// or `"month"`). Rejects any other value.
    pub async fn revenue_bucketed(&self, tenant_id: &str, from: DateTime<Utc>, to: DateTime<Utc>, granularity: &str) -> Result<Vec<RevenueBucket>> {
        if !matches!(granularity, "day" | "week" | "month") {
            return Err(crate::error::AppError::InvalidArgument(format!(
                "granularity must be one of day, week, month (got {granularity})"
            )));
        }
        let rows = self.ledger.revenue_by_currency_bucketed(&self.pool, tenant_id, from, to, granularity).await?;
        Ok(rows.into_iter().map(|(period, currency, amount)| RevenueBucket { period, currency, amount }).collect())
    }

    pub async fn account_balances(&self, tenant_id: &str, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<AccountBalance>> {
        let totals = self.ledger.account_balance_totals(&self.pool, tenant_id, from, to).await?;
        let mut balances: Vec<AccountBalance> = totals
            .into_iter()
            .map(|((account, currency), (debits, credits))| AccountBalance {
                account,
                currency,
                debits,
                credits,
                net: debits - credits,
            })
            .collect();
        balances.sort_by(|a, b| a.account.cmp(&b.account).then(a.currency.to_string().cmp(&b.currency.to_string())));
        Ok(balances)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn account_balance_net_is_debits_minus_credits() {
        let balance = AccountBalance { account: "CASH".into(), currency: Currency::USD, debits: dec!(100), credits: dec!(40), net: dec!(60) };
        assert_eq!(balance.debits - balance.credits, balance.net);
    }
}
