use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::Currency;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePaymentIntentRequest {
    pub amount: Decimal,
    pub currency: Currency,
    pub customer_ref: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundRequest {
    pub amount: Decimal,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LedgerEntriesQuery {
    pub from: chrono::DateTime<chrono::Utc>,
    pub to: chrono::DateTime<chrono::Utc>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ReportRangeQuery {
    pub from: chrono::DateTime<chrono::Utc>,
    pub to: chrono::DateTime<chrono::Utc>,
}

fn default_granularity() -> String {
    "day".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevenueReportQuery {
    pub from: chrono::DateTime<chrono::Utc>,
    pub to: chrono::DateTime<chrono::Utc>,
    #[serde(default = "default_granularity")]
    pub granularity: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateWebhookEndpointRequest {
    pub url: String,
    pub events: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ReconciliationDiscrepanciesQuery {
    pub resolved: Option<bool>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChaosConfigRequest {
    pub fail_percent: u8,
    pub latency_ms: u64,
}
