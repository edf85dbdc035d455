use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Status of an `OutboxEvent`. Mutated only by the dispatcher after insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum OutboxStatus {
    Pending,
    Sent,
    Dead,
}

/// Default dispatcher tunables.
pub const DEFAULT_MAX_ATTEMPTS: i32 = 7;
pub const DEFAULT_LOCK_TIMEOUT_SECONDS: i64 = 60;
pub const DEFAULT_CLAIM_LIMIT: i64 = 50;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OutboxEvent {
    pub id: Uuid,
    pub tenant_id: String,
    pub event_type: String,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub payload: serde_json::Value,
    pub status: OutboxStatus,
    pub attempts: i32,
    pub available_at: DateTime<Utc>,
    pub locked_at: Option<DateTime<Utc>>,
    pub locked_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl OutboxEvent {
    pub fn new(
        tenant_id: impl Into<String>,
        event_type: impl Into<String>,
        aggregate_type: impl Into<String>,
        aggregate_id: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.into(),
            event_type: event_type.into(),
            aggregate_type: aggregate_type.into(),
            aggregate_id: aggregate_id.into(),
            payload,
            status: OutboxStatus::Pending,
            attempts: 0,
            available_at: now,
            locked_at: None,
            locked_by: None,
            created_at: now,
        }
    }
}

/// Computes the next `available_at` delay (seconds) after a failed publish attempt:
/// `base = min(60, 2^min(6, attempts))` plus `jitter ~ Uniform[0, 1)`.
pub fn backoff_seconds(attempts: i32) -> f64 {
    let exponent = attempts.clamp(0, 6);
    let base = (2_f64.powi(exponent)).min(60.0);
    let jitter: f64 = rand::thread_rng().gen_range(0.0..1.0);
    base + jitter
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_event_starts_pending_with_zero_attempts() {
        let event = OutboxEvent::new("t1", "payment.authorized", "payment_intent", "pi-1", serde_json::json!({}));
        assert_eq!(event.status, OutboxStatus::Pending);
        assert_eq!(event.attempts, 0);
        assert!(event.locked_at.is_none());
    }

    #[test]
    fn backoff_seconds_is_bounded_and_grows_with_attempts() {
        let d1 = backoff_seconds(1);
        let d6 = backoff_seconds(6);
        let d20 = backoff_seconds(20);
        assert!(d1 >= 2.0 && d1 < 3.0);
        // 2^6 = 64, capped to 60 by the min(60, ...) clause.
        assert!(d6 >= 60.0 && d6 < 61.0);
        // attempts beyond 6 clamp to the same exponent as 6.
        assert!(d20 >= 60.0 && d20 < 61.0);
    }
}
