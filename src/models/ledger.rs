use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::Currency;

/// Which side of a double-entry line a `LedgerLine` sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Debit,
    Credit,
}

impl Side {
    pub fn opposite(&self) -> Self {
        match self {
            Side::Debit => Side::Credit,
            Side::Credit => Side::Debit,
        }
    }
}

/// Header row of a posted ledger entry. Owns its lines (cascade delete).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub tenant_id: String,
    pub payment_intent_id: Uuid,
    pub posted_at: DateTime<Utc>,
}

/// A single debit or credit line against an account, scoped to one entry.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LedgerLine {
    pub id: Uuid,
    pub tenant_id: String,
    pub entry_id: Uuid,
    pub side: Side,
    pub account: String,
    pub amount: Decimal,
    pub currency: Currency,
}

impl LedgerLine {
    pub fn new(
        tenant_id: impl Into<String>,
        entry_id: Uuid,
        side: Side,
        account: impl Into<String>,
        amount: Decimal,
        currency: Currency,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.into(),
            entry_id,
            side,
            account: account.into(),
            amount,
            currency,
        }
    }

    pub fn signed_amount(&self) -> Decimal {
        match self.side {
            Side::Debit => self.amount,
            Side::Credit => -self.amount,
        }
    }
}

/// A balanced debit/credit pair ready to be posted inside one ledger entry.
/// Construction enforces the double-entry invariant: same amount, same currency,
/// opposite sides.
#[derive(Debug, Clone)]
pub struct BalancedPair {
    pub debit: LedgerLine,
    pub credit: LedgerLine,
}

impl BalancedPair {
    pub fn new(
        tenant_id: &str,
        entry_id: Uuid,
        debit_account: &str,
        credit_account: &str,
        amount: Decimal,
        currency: Currency,
    ) -> Result<Self> {
        if amount <= Decimal::ZERO {
            return Err(AppError::InvalidArgument("ledger amount must be positive".into()));
        }
        Ok(Self {
            debit: LedgerLine::new(tenant_id, entry_id, Side::Debit, debit_account, amount, currency),
            credit: LedgerLine::new(tenant_id, entry_id, Side::Credit, credit_account, amount, currency),
        })
    }

    pub fn amount(&self) -> Decimal {
        self.debit.amount
    }
}

/// Verifies the universal invariant: for a set of lines belonging to one entry,
/// sum(debits) == sum(credits) per currency.
pub fn lines_are_balanced(lines: &[LedgerLine]) -> bool {
    use std::collections::HashMap;

    let mut totals: HashMap<Currency, Decimal> = HashMap::new();
    for line in lines {
        let entry = totals.entry(line.currency).or_insert(Decimal::ZERO);
        *entry += line.signed_amount();
    }
    totals.values().all(|total| total.is_zero())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn balanced_pair_rejects_non_positive_amount() {
        let err = BalancedPair::new("t1", Uuid::new_v4(), "CASH", "REVENUE", dec!(0), Currency::BRL)
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument(_)));
    }

    #[test]
    fn balanced_pair_lines_net_to_zero() {
        let pair =
            BalancedPair::new("t1", Uuid::new_v4(), "CASH", "REVENUE", dec!(100), Currency::BRL).unwrap();
        assert!(lines_are_balanced(&[pair.debit, pair.credit]));
    }

    #[test]
    fn unbalanced_lines_are_detected() {
        let entry_id = Uuid::new_v4();
        let debit = LedgerLine::new("t1", entry_id, Side::Debit, "CASH", dec!(100), Currency::BRL);
        let credit = LedgerLine::new("t1", entry_id, Side::Credit, "REVENUE", dec!(99), Currency::BRL);
        assert!(!lines_are_balanced(&[debit, credit]));
    }

    #[test]
    fn side_opposite_roundtrips() {
        assert_eq!(Side::Debit.opposite(), Side::Credit);
        assert_eq!(Side::Credit.opposite(), Side::Debit);
    }
}
