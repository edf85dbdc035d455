use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Refund {
    pub id: Uuid,
    pub tenant_id: String,
    pub payment_intent_id: Uuid,
    pub amount: Decimal,
    pub reason: Option<String>,
    pub status: RefundStatus,
    pub gateway_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Refund {
    pub fn new(
        tenant_id: impl Into<String>,
        payment_intent_id: Uuid,
        amount: Decimal,
        reason: Option<String>,
    ) -> Result<Self> {
        if amount <= Decimal::ZERO {
            return Err(AppError::InvalidArgument("refund amount must be greater than zero".into()));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.into(),
            payment_intent_id,
            amount,
            reason,
            status: RefundStatus::Pending,
            gateway_ref: None,
            created_at: Utc::now(),
        })
    }

    pub fn complete(&mut self) {
        self.status = RefundStatus::Completed;
    }

    pub fn fail(&mut self) {
        self.status = RefundStatus::Failed;
    }
}

/// Checks whether `amount` can be refunded on top of `already_refunded`, given the
/// intent's total `amount`.
pub fn check_refund_amount(intent_amount: Decimal, already_refunded: Decimal, amount: Decimal) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(AppError::InvalidArgument("refund amount must be greater than zero".into()));
    }
    if already_refunded + amount > intent_amount {
        return Err(AppError::Unprocessable(format!(
            "refund of {} would exceed intent amount {} (already refunded {})",
            amount, intent_amount, already_refunded
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn new_rejects_non_positive_amount() {
        let err = Refund::new("t1", Uuid::new_v4(), dec!(0), None).unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument(_)));
    }

    #[test]
    fn check_refund_amount_allows_exact_saturation() {
        assert!(check_refund_amount(dec!(50), dec!(20), dec!(30)).is_ok());
    }

    #[test]
    fn check_refund_amount_rejects_overage() {
        let err = check_refund_amount(dec!(50), dec!(49.99), dec!(0.02)).unwrap_err();
        assert!(matches!(err, AppError::Unprocessable(_)));
    }
}
