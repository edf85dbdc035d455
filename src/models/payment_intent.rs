use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::Currency;

/// Status of a PaymentIntent. `CREATED -> AUTHORIZED -> SETTLED`, with
/// `SETTLED`/`PARTIALLY_REFUNDED` further transitioning on refund.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentIntentStatus {
    Created,
    Authorized,
    Settled,
    Failed,
    PartiallyRefunded,
    Refunded,
}

impl PaymentIntentStatus {
    /// Terminal with respect to `confirm`: a second confirm is either idempotent
    /// (Settled/Failed) or a conflict (anything else that isn't Created).
    pub fn is_terminal_for_confirm(&self) -> bool {
        matches!(self, PaymentIntentStatus::Settled | PaymentIntentStatus::Failed)
    }

    pub fn can_be_refunded(&self) -> bool {
        matches!(
            self,
            PaymentIntentStatus::Settled | PaymentIntentStatus::PartiallyRefunded
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PaymentIntent {
    pub id: Uuid,
    pub tenant_id: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub status: PaymentIntentStatus,
    pub customer_ref: String,
    pub gateway_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentIntent {
    pub fn new(
        tenant_id: impl Into<String>,
        amount: Decimal,
        currency: Currency,
        customer_ref: impl Into<String>,
    ) -> Result<Self> {
        if amount <= Decimal::ZERO {
            return Err(AppError::InvalidArgument("amount must be greater than zero".into()));
        }
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.into(),
            amount,
            currency,
            status: PaymentIntentStatus::Created,
            customer_ref: customer_ref.into(),
            gateway_ref: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Constructs an intent that arrives already-authorized, as the inbound charge
    /// handler does (the upstream gateway has already authorized the charge).
    pub fn new_authorized(
        tenant_id: impl Into<String>,
        amount: Decimal,
        currency: Currency,
        customer_ref: impl Into<String>,
    ) -> Result<Self> {
        let mut intent = Self::new(tenant_id, amount, currency, customer_ref)?;
        intent.status = PaymentIntentStatus::Authorized;
        Ok(intent)
    }

    /// `CREATED -> AUTHORIZED`. Idempotent on Settled/Failed; conflict otherwise.
    pub fn confirm(&mut self) -> Result<bool> {
        if self.status.is_terminal_for_confirm() {
            return Ok(false);
        }
        if self.status != PaymentIntentStatus::Created {
            return Err(AppError::Conflict(format!(
                "cannot confirm payment intent in status {:?}",
                self.status
            )));
        }
        self.status = PaymentIntentStatus::Authorized;
        self.updated_at = Utc::now();
        Ok(true)
    }

    /// `AUTHORIZED -> SETTLED`. No-op (returns false) unless currently Authorized.
    pub fn settle(&mut self, gateway_ref: Option<String>) -> bool {
        if self.status != PaymentIntentStatus::Authorized {
            return false;
        }
        self.status = PaymentIntentStatus::Settled;
        if gateway_ref.is_some() {
            self.gateway_ref = gateway_ref;
        }
        self.updated_at = Utc::now();
        true
    }

    /// Applies a refund of `amount`, transitioning to `PARTIALLY_REFUNDED` or
    /// `REFUNDED` depending on whether cumulative refunds now equal the intent amount.
    pub fn apply_refund(&mut self, total_refunded: Decimal) -> Result<()> {
        if !self.status.can_be_refunded() {
            return Err(AppError::Conflict(format!(
                "cannot refund payment intent in status {:?}",
                self.status
            )));
        }
        self.status = if total_refunded >= self.amount {
            PaymentIntentStatus::Refunded
        } else {
            PaymentIntentStatus::PartiallyRefunded
        };
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn order_id(&self) -> Option<&str> {
        self.customer_ref.strip_prefix("order:")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn new_rejects_non_positive_amount() {
        let err = PaymentIntent::new("t1", dec!(0), Currency::BRL, "CUST-1").unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument(_)));
    }

    #[test]
    fn confirm_transitions_created_to_authorized() {
        let mut intent = PaymentIntent::new("t1", dec!(100), Currency::BRL, "CUST-1").unwrap();
        assert!(intent.confirm().unwrap());
        assert_eq!(intent.status, PaymentIntentStatus::Authorized);
    }

    #[test]
    fn confirm_is_idempotent_on_settled() {
        let mut intent = PaymentIntent::new("t1", dec!(100), Currency::BRL, "CUST-1").unwrap();
        intent.confirm().unwrap();
        intent.settle(None);
        assert!(!intent.confirm().unwrap());
        assert_eq!(intent.status, PaymentIntentStatus::Settled);
    }

    #[test]
    fn confirm_conflicts_on_authorized_twice() {
        let mut intent = PaymentIntent::new("t1", dec!(100), Currency::BRL, "CUST-1").unwrap();
        intent.confirm().unwrap();
        let err = intent.confirm().unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn settle_is_noop_unless_authorized() {
        let mut intent = PaymentIntent::new("t1", dec!(100), Currency::BRL, "CUST-1").unwrap();
        assert!(!intent.settle(None));
        assert_eq!(intent.status, PaymentIntentStatus::Created);
    }

    #[test]
    fn apply_refund_saturates_to_refunded() {
        let mut intent = PaymentIntent::new("t1", dec!(50), Currency::BRL, "CUST-1").unwrap();
        intent.confirm().unwrap();
        intent.settle(None);

        intent.apply_refund(dec!(20)).unwrap();
        assert_eq!(intent.status, PaymentIntentStatus::PartiallyRefunded);

        intent.apply_refund(dec!(50)).unwrap();
        assert_eq!(intent.status, PaymentIntentStatus::Refunded);
    }

    #[test]
    fn order_id_parses_customer_ref_prefix() {
        let intent = PaymentIntent::new("t1", dec!(10), Currency::BRL, "order:ord-9").unwrap();
        assert_eq!(intent.order_id(), Some("ord-9"));

        let intent = PaymentIntent::new("t1", dec!(10), Currency::BRL, "CUST-1").unwrap();
        assert_eq!(intent.order_id(), None);
    }
}
