use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Classes of discrepancy surfaced by the three-pass diff against gateway
/// transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscrepancyType {
    MissingLocal,
    MissingRemote,
    AmountMismatch,
    StatusMismatch,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ReconciliationDiscrepancy {
    pub id: Uuid,
    pub tenant_id: String,
    pub payment_intent_id: Option<Uuid>,
    pub discrepancy_type: DiscrepancyType,
    pub gateway_ref: Option<String>,
    pub expected_amount: Option<Decimal>,
    pub actual_amount: Option<Decimal>,
    pub expected_status: Option<String>,
    pub actual_status: Option<String>,
    pub resolved: bool,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl ReconciliationDiscrepancy {
    pub fn missing_local(tenant_id: impl Into<String>, gateway_ref: impl Into<String>, actual_amount: Decimal, actual_status: impl Into<String>, details: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.into(),
            payment_intent_id: None,
            discrepancy_type: DiscrepancyType::MissingLocal,
            gateway_ref: Some(gateway_ref.into()),
            expected_amount: None,
            actual_amount: Some(actual_amount),
            expected_status: None,
            actual_status: Some(actual_status.into()),
            resolved: false,
            details,
            created_at: Utc::now(),
        }
    }

    pub fn amount_mismatch(
        tenant_id: impl Into<String>,
        payment_intent_id: Uuid,
        gateway_ref: impl Into<String>,
        expected_amount: Decimal,
        actual_amount: Decimal,
        details: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.into(),
            payment_intent_id: Some(payment_intent_id),
            discrepancy_type: DiscrepancyType::AmountMismatch,
            gateway_ref: Some(gateway_ref.into()),
            expected_amount: Some(expected_amount),
            actual_amount: Some(actual_amount),
            expected_status: None,
            actual_status: None,
            resolved: false,
            details,
            created_at: Utc::now(),
        }
    }

    pub fn status_mismatch(
        tenant_id: impl Into<String>,
        payment_intent_id: Uuid,
        gateway_ref: impl Into<String>,
        expected_status: impl Into<String>,
        actual_status: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.into(),
            payment_intent_id: Some(payment_intent_id),
            discrepancy_type: DiscrepancyType::StatusMismatch,
            gateway_ref: Some(gateway_ref.into()),
            expected_amount: None,
            actual_amount: None,
            expected_status: Some(expected_status.into()),
            actual_status: Some(actual_status.into()),
            resolved: false,
            details,
            created_at: Utc::now(),
        }
    }

    pub fn missing_remote(tenant_id: impl Into<String>, payment_intent_id: Uuid, gateway_ref: impl Into<String>, expected_amount: Decimal, expected_status: impl Into<String>, details: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.into(),
            payment_intent_id: Some(payment_intent_id),
            discrepancy_type: DiscrepancyType::MissingRemote,
            gateway_ref: Some(gateway_ref.into()),
            expected_amount: Some(expected_amount),
            actual_amount: None,
            expected_status: Some(expected_status.into()),
            actual_status: None,
            resolved: false,
            details,
            created_at: Utc::now(),
        }
    }

    pub fn resolve(&mut self) {
        self.resolved = true;
    }
}

/// Gateway statuses expected for a local `PaymentIntentStatus`. An empty
/// slice means no status check applies for that local status.
pub fn expected_gateway_statuses(local_status: &str) -> &'static [&'static str] {
    match local_status {
        "AUTHORIZED" => &["requires_capture", "requires_confirmation"],
        "SETTLED" => &["succeeded"],
        "FAILED" => &["canceled", "requires_payment_method"],
        _ => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn expected_gateway_statuses_for_known_local_statuses() {
        assert_eq!(expected_gateway_statuses("SETTLED"), &["succeeded"]);
        assert_eq!(
            expected_gateway_statuses("AUTHORIZED"),
            &["requires_capture", "requires_confirmation"]
        );
    }

    #[test]
    fn expected_gateway_statuses_empty_for_unmapped_status() {
        assert!(expected_gateway_statuses("REFUNDED").is_empty());
    }

    #[test]
    fn missing_local_discrepancy_has_no_payment_intent() {
        let d = ReconciliationDiscrepancy::missing_local("t1", "gw_123", dec!(10), "succeeded", serde_json::json!({}));
        assert!(d.payment_intent_id.is_none());
        assert_eq!(d.discrepancy_type, DiscrepancyType::MissingLocal);
        assert!(!d.resolved);
    }

    #[test]
    fn amount_mismatch_carries_both_amounts() {
        let d = ReconciliationDiscrepancy::amount_mismatch("t1", Uuid::new_v4(), "gw_1", dec!(10), dec!(12), serde_json::json!({}));
        assert_eq!(d.expected_amount, Some(dec!(10)));
        assert_eq!(d.actual_amount, Some(dec!(12)));
    }

    #[test]
    fn resolve_flips_resolved_flag() {
        let mut d = ReconciliationDiscrepancy::missing_local("t1", "gw_1", dec!(10), "succeeded", serde_json::json!({}));
        d.resolve();
        assert!(d.resolved);
    }
}
