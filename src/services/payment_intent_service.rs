use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::context;
use crate::error::{AppError, Result};
use crate::events::types::{
    self, PAYMENT_AUTHORIZED, PAYMENT_INTENT_CREATED, PAYMENT_REFUNDED, PAYMENT_SETTLED,
};
use crate::models::account_config::{
    DEFAULT_CASH_ACCOUNT, DEFAULT_REFUND_EXPENSE_ACCOUNT, DEFAULT_REVENUE_ACCOUNT,
};
use crate::models::refund::check_refund_amount;
use crate::models::{BalancedPair, Currency, OutboxEvent, PaymentIntent, PaymentIntentStatus, Refund, RefundStatus};
use crate::repositories::{
    AccountConfigRepository, LedgerRepository, OutboxRepository, PaymentIntentRepository, RefundRepository,
};

/// Owns the payment-intent state machine and its coupling to double-entry
/// ledger posting. Every transition and its ledger/outbox effects are
/// committed in one transaction; a partial failure leaves no event visible
/// and no ledger row.
pub struct PaymentIntentService {
    pool: PgPool,
    payment_intents: PaymentIntentRepository,
    ledger: LedgerRepository,
    accounts: AccountConfigRepository,
    refunds: RefundRepository,
    outbox: OutboxRepository,
}

impl PaymentIntentService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            payment_intents: PaymentIntentRepository::new(),
            ledger: LedgerRepository::new(),
            accounts: AccountConfigRepository::new(),
            refunds: RefundRepository::new(),
            outbox: OutboxRepository::new(),
        }
    }

    pub async fn create(
        &self,
        tenant_id: &str,
        amount: Decimal,
        currency: Currency,
        customer_ref: &str,
    ) -> Result<PaymentIntent> {
        let intent = PaymentIntent::new(tenant_id, amount, currency, customer_ref)?;
        let correlation_id = context::correlation_id();

        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        let saved = self.payment_intents.insert(&mut tx, &intent).await?;

        let payload = serde_json::to_value(types::PaymentIntentCreatedPayload {
            payment_intent_id: saved.id,
            amount: saved.amount,
            currency: saved.currency,
            customer_ref: saved.customer_ref.clone(),
            correlation_id,
        })
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;

        let event = OutboxEvent::new(tenant_id, PAYMENT_INTENT_CREATED, "payment_intent", saved.id.to_string(), payload);
        self.outbox.insert(&mut tx, &event).await?;

        tx.commit().await.map_err(AppError::Database)?;
        Ok(saved)
    }

    /// `CREATED -> AUTHORIZED`. Idempotent (returns current state) if already
    /// SETTLED/FAILED; conflict for any other non-CREATED status.
    pub async fn confirm(&self, tenant_id: &str, id: Uuid) -> Result<PaymentIntent> {
        let correlation_id = context::correlation_id();
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;

        let mut intent = self
            .payment_intents
            .find_by_id_for_update(&mut tx, tenant_id, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("payment intent {id} not found")))?;

        let transitioned = intent.confirm()?;
        if !transitioned {
            tx.commit().await.map_err(AppError::Database)?;
            return Ok(intent);
        }

        self.payment_intents
            .update_status(&mut tx, intent.id, intent.status, None, intent.updated_at)
            .await?;

        let payload = serde_json::to_value(types::PaymentAuthorizedPayload {
            payment_intent_id: intent.id,
            amount: intent.amount,
            currency: intent.currency,
            order_id: intent.order_id().map(str::to_string),
            customer_ref: Some(intent.customer_ref.clone()),
            correlation_id,
        })
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;

        let event = OutboxEvent::new(tenant_id, PAYMENT_AUTHORIZED, "payment_intent", intent.id.to_string(), payload);
        self.outbox.insert(&mut tx, &event).await?;

        tx.commit().await.map_err(AppError::Database)?;
        Ok(intent)
    }

    /// Invoked by the inbound consumer on `payment.authorized`. No-op unless
    /// the intent is currently AUTHORIZED.
    pub async fn post_ledger_for_authorized(&self, tenant_id: &str, id: Uuid) -> Result<Option<PaymentIntent>> {
        let correlation_id = context::correlation_id();
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;

        let mut intent = match self.payment_intents.find_by_id_for_update(&mut tx, tenant_id, id).await? {
            Some(intent) => intent,
            None => {
                tx.commit().await.map_err(AppError::Database)?;
                return Ok(None);
            }
        };

        if intent.status != PaymentIntentStatus::Authorized {
            tx.commit().await.map_err(AppError::Database)?;
            return Ok(None);
        }

        let cash_account = self.accounts.resolve_code(&self.pool, tenant_id, DEFAULT_CASH_ACCOUNT).await?;
        let revenue_account = self.accounts.resolve_code(&self.pool, tenant_id, DEFAULT_REVENUE_ACCOUNT).await?;

        let pair = BalancedPair::new(
            tenant_id,
            Uuid::new_v4(),
            &cash_account,
            &revenue_account,
            intent.amount,
            intent.currency,
        )?;
        self.ledger.post_pair(&mut tx, tenant_id, intent.id, &pair).await?;

        intent.settle(None);
        self.payment_intents
            .update_status(&mut tx, intent.id, intent.status, None, intent.updated_at)
            .await?;

        let payload = serde_json::to_value(types::PaymentSettledPayload {
            order_id: intent.order_id().map(str::to_string),
            tenant_id: tenant_id.to_string(),
            payment_intent_id: intent.id,
            status: "SETTLED".to_string(),
            amount: intent.amount,
            currency: intent.currency,
            correlation_id,
        })
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;

        let event = OutboxEvent::new(tenant_id, PAYMENT_SETTLED, "payment_intent", intent.id.to_string(), payload);
        self.outbox.insert(&mut tx, &event).await?;

        tx.commit().await.map_err(AppError::Database)?;
        Ok(Some(intent))
    }

    /// Preconditions: status in {SETTLED, PARTIALLY_REFUNDED}; `amount > 0`;
    /// cumulative non-FAILED refunds plus `amount` must not exceed the intent
    /// amount.
    pub async fn refund(&self, tenant_id: &str, id: Uuid, amount: Decimal, reason: Option<String>) -> Result<Refund> {
        let correlation_id = context::correlation_id();
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;

        let mut intent = self
            .payment_intents
            .find_by_id_for_update(&mut tx, tenant_id, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("payment intent {id} not found")))?;

        if !intent.status.can_be_refunded() {
            return Err(AppError::Conflict(format!(
                "cannot refund payment intent in status {:?}",
                intent.status
            )));
        }

        let already_refunded = self.refunds.sum_non_failed(&mut tx, intent.id).await?;
        check_refund_amount(intent.amount, already_refunded, amount)?;

        let refund_account = self.accounts.resolve_code(&self.pool, tenant_id, DEFAULT_REFUND_EXPENSE_ACCOUNT).await?;
        let cash_account = self.accounts.resolve_code(&self.pool, tenant_id, DEFAULT_CASH_ACCOUNT).await?;

        let refund = Refund::new(tenant_id, intent.id, amount, reason.clone())?;
        let pair = BalancedPair::new(tenant_id, Uuid::new_v4(), &refund_account, &cash_account, amount, intent.currency)?;

        let mut saved_refund = self.refunds.insert(&mut tx, &refund).await?;
        self.ledger.post_pair(&mut tx, tenant_id, intent.id, &pair).await?;

        intent.apply_refund(already_refunded + amount)?;
        self.payment_intents
            .update_status(&mut tx, intent.id, intent.status, None, intent.updated_at)
            .await?;

        self.refunds.update_status(&mut tx, saved_refund.id, RefundStatus::Completed).await?;
        saved_refund.status = RefundStatus::Completed;

        let payment_status = serde_json::to_value(intent.status)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();

        let payload = serde_json::to_value(types::PaymentRefundedPayload {
            payment_intent_id: intent.id,
            refund_id: saved_refund.id,
            amount,
            currency: intent.currency,
            reason,
            payment_status,
            correlation_id,
        })
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;

        let event = OutboxEvent::new(tenant_id, PAYMENT_REFUNDED, "payment_intent", intent.id.to_string(), payload);
        self.outbox.insert(&mut tx, &event).await?;

        tx.commit().await.map_err(AppError::Database)?;
        Ok(saved_refund)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refund_payload_status_is_screaming_snake_case() {
        let value = serde_json::to_value(PaymentIntentStatus::PartiallyRefunded).unwrap();
        assert_eq!(value.as_str().unwrap(), "PARTIALLY_REFUNDED");
    }
}
