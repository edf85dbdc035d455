use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Currency;

/// `event_type` discriminants written to `OutboxEvent` rows and used as the
/// broker routing key.
pub const PAYMENT_INTENT_CREATED: &str = "payment.intent.created";
pub const PAYMENT_AUTHORIZED: &str = "payment.authorized";
pub const PAYMENT_SETTLED: &str = "payment.settled";
pub const PAYMENT_REFUNDED: &str = "payment.refunded";
pub const RECONCILIATION_DISCREPANCY_FOUND: &str = "reconciliation.discrepancy_found";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntentCreatedPayload {
    pub payment_intent_id: Uuid,
    pub amount: Decimal,
    pub currency: Currency,
    pub customer_ref: String,
    pub correlation_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentAuthorizedPayload {
    pub payment_intent_id: Uuid,
    pub amount: Decimal,
    pub currency: Currency,
    pub order_id: Option<String>,
    pub customer_ref: Option<String>,
    pub correlation_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSettledPayload {
    pub order_id: Option<String>,
    pub tenant_id: String,
    pub payment_intent_id: Uuid,
    pub status: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub correlation_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRefundedPayload {
    pub payment_intent_id: Uuid,
    pub refund_id: Uuid,
    pub amount: Decimal,
    pub currency: Currency,
    pub reason: Option<String>,
    pub payment_status: String,
    pub correlation_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationDiscrepancyFoundPayload {
    pub tenant_id: String,
    pub discrepancy_count: usize,
    pub types: Vec<String>,
    pub correlation_id: String,
}
