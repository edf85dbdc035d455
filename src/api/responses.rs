use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::api::auth::Principal;
use crate::api::chaos::ChaosConfig;
use crate::models::{
    Currency, LedgerEntry, PaymentIntent, PaymentIntentStatus, ReconciliationDiscrepancy, Refund, RefundStatus,
    WebhookEndpoint,
};
use crate::services::{AccountBalance, RevenueBucket};

#[derive(Debug, Clone, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrincipalResponse {
    pub subject: String,
    pub tenant_id: String,
    pub roles: Vec<String>,
    pub plan: String,
    pub region: String,
}

impl From<&Principal> for PrincipalResponse {
    fn from(p: &Principal) -> Self {
        Self {
            subject: p.subject.clone(),
            tenant_id: p.tenant_id.clone(),
            roles: p.roles.clone(),
            plan: serde_json::to_value(p.plan).ok().and_then(|v| v.as_str().map(str::to_string)).unwrap_or_default(),
            region: p.region.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentIntentResponse {
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

impl From<PaymentIntent> for PaymentIntentResponse {
    fn from(intent: PaymentIntent) -> Self {
        Self {
            id: intent.id,
            tenant_id: intent.tenant_id,
            amount: intent.amount,
            currency: intent.currency,
            status: intent.status,
            customer_ref: intent.customer_ref,
            gateway_ref: intent.gateway_ref,
            created_at: intent.created_at,
            updated_at: intent.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RefundResponse {
    pub id: Uuid,
    pub tenant_id: String,
    pub payment_intent_id: Uuid,
    pub amount: Decimal,
    pub reason: Option<String>,
    pub status: RefundStatus,
    pub gateway_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Refund> for RefundResponse {
    fn from(refund: Refund) -> Self {
        Self {
            id: refund.id,
            tenant_id: refund.tenant_id,
            payment_intent_id: refund.payment_intent_id,
            amount: refund.amount,
            reason: refund.reason,
            status: refund.status,
            gateway_ref: refund.gateway_ref,
            created_at: refund.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LedgerEntryResponse {
    pub id: Uuid,
    pub tenant_id: String,
    pub payment_intent_id: Uuid,
    pub posted_at: DateTime<Utc>,
}

impl From<LedgerEntry> for LedgerEntryResponse {
    fn from(entry: LedgerEntry) -> Self {
        Self {
            id: entry.id,
            tenant_id: entry.tenant_id,
            payment_intent_id: entry.payment_intent_id,
            posted_at: entry.posted_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RevenueBucketResponse {
    pub period: DateTime<Utc>,
    pub currency: Currency,
    pub amount: Decimal,
}

impl From<RevenueBucket> for RevenueBucketResponse {
    fn from(bucket: RevenueBucket) -> Self {
        Self { period: bucket.period, currency: bucket.currency, amount: bucket.amount }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountBalanceResponse {
    pub account: String,
    pub currency: Currency,
    pub debits: Decimal,
    pub credits: Decimal,
    pub net: Decimal,
}

impl From<AccountBalance> for AccountBalanceResponse {
    fn from(balance: AccountBalance) -> Self {
        Self {
            account: balance.account,
            currency: balance.currency,
            debits: balance.debits,
            credits: balance.credits,
            net: balance.net,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WebhookEndpointResponse {
    pub id: Uuid,
    pub tenant_id: String,
    pub url: String,
    pub events: Vec<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<WebhookEndpoint> for WebhookEndpointResponse {
    fn from(endpoint: WebhookEndpoint) -> Self {
        Self {
            id: endpoint.id,
            tenant_id: endpoint.tenant_id,
            url: endpoint.url,
            events: endpoint.events,
            is_active: endpoint.is_active,
            created_at: endpoint.created_at,
        }
    }
}

/// Returned only from `POST /webhooks`; the secret is never exposed again after this.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookEndpointCreatedResponse {
    #[serde(flatten)]
    pub endpoint: WebhookEndpointResponse,
    pub secret: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationDiscrepancyResponse {
    pub id: Uuid,
    pub tenant_id: String,
    pub payment_intent_id: Option<Uuid>,
    pub discrepancy_type: crate::models::DiscrepancyType,
    pub gateway_ref: Option<String>,
    pub expected_amount: Option<Decimal>,
    pub actual_amount: Option<Decimal>,
    pub expected_status: Option<String>,
    pub actual_status: Option<String>,
    pub resolved: bool,
    pub created_at: DateTime<Utc>,
}

impl From<ReconciliationDiscrepancy> for ReconciliationDiscrepancyResponse {
    fn from(d: ReconciliationDiscrepancy) -> Self {
        Self {
            id: d.id,
            tenant_id: d.tenant_id,
            payment_intent_id: d.payment_intent_id,
            discrepancy_type: d.discrepancy_type,
            gateway_ref: d.gateway_ref,
            expected_amount: d.expected_amount,
            actual_amount: d.actual_amount,
            expected_status: d.expected_status,
            actual_status: d.actual_status,
            resolved: d.resolved,
            created_at: d.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChaosConfigResponse {
    pub tenant_id: String,
    pub fail_percent: u8,
    pub latency_ms: u64,
}

impl From<ChaosConfig> for ChaosConfigResponse {
    fn from(c: ChaosConfig) -> Self {
        Self { tenant_id: c.tenant_id, fail_percent: c.fail_percent, latency_ms: c.latency_ms }
    }
}
