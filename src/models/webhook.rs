use crate::clock::Clock;
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Bounded retry ladder for webhook delivery.
pub const RETRY_DELAYS_SECONDS: [i64; 3] = [60, 300, 1800];

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WebhookEndpoint {
    pub id: Uuid,
    pub tenant_id: String,
    pub url: String,
    pub secret: String,
    pub events: Vec<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl WebhookEndpoint {
    pub fn new(tenant_id: impl Into<String>, url: impl Into<String>, events: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.into(),
            url: url.into(),
            secret: generate_secret(),
            events,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    /// An event type is eligible iff it's named explicitly or the endpoint subscribes to `"*"`.
    pub fn matches(&self, event_type: &str) -> bool {
        self.is_active && (self.events.iter().any(|e| e == event_type) || self.events.iter().any(|e| e == "*"))
    }
}

/// 32-byte hex secret used to HMAC-sign outbound webhook payloads.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum DeliveryStatus {
    Pending,
    Retrying,
    Delivered,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WebhookDelivery {
    pub id: Uuid,
    pub endpoint_id: Uuid,
    pub tenant_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub status: DeliveryStatus,
    pub attempts: i32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub response_code: Option<i32>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl WebhookDelivery {
    pub fn new(
        endpoint_id: Uuid,
        tenant_id: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            endpoint_id,
            tenant_id: tenant_id.into(),
            event_type: event_type.into(),
            payload,
            status: DeliveryStatus::Pending,
            attempts: 0,
            last_attempt_at: None,
            response_code: None,
            next_retry_at: Some(now),
            created_at: now,
        }
    }

    pub fn mark_success(&mut self, response_code: i32, clock: &dyn Clock) {
        self.attempts += 1;
        self.last_attempt_at = Some(clock.now());
        self.response_code = Some(response_code);
        self.status = DeliveryStatus::Delivered;
        self.next_retry_at = None;
    }

    /// Records a failed delivery attempt, transitioning to `FAILED` once the retry
    /// ladder is exhausted or to `RETRYING` with the next scheduled delay otherwise.
    pub fn mark_failure(&mut self, response_code: Option<i32>, clock: &dyn Clock) {
        self.attempts += 1;
        let now = clock.now();
        self.last_attempt_at = Some(now);
        self.response_code = response_code;

        if self.attempts as usize >= RETRY_DELAYS_SECONDS.len() {
            self.status = DeliveryStatus::Failed;
            self.next_retry_at = None;
        } else {
            self.status = DeliveryStatus::Retrying;
            let delay = RETRY_DELAYS_SECONDS[(self.attempts - 1) as usize];
            self.next_retry_at = Some(now + chrono::Duration::seconds(delay));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_explicit_event_type() {
        let endpoint = WebhookEndpoint::new("t1", "https://example.com/hook", vec!["payment.settled".into()]);
        assert!(endpoint.matches("payment.settled"));
        assert!(!endpoint.matches("payment.refunded"));
    }

    #[test]
    fn matches_wildcard_subscription() {
        let endpoint = WebhookEndpoint::new("t1", "https://example.com/hook", vec!["*".into()]);
        assert!(endpoint.matches("anything"));
    }

    #[test]
    fn inactive_endpoint_never_matches() {
        let mut endpoint = WebhookEndpoint::new("t1", "https://example.com/hook", vec!["*".into()]);
        endpoint.is_active = false;
        assert!(!endpoint.matches("payment.settled"));
    }

    #[test]
    fn secret_is_32_bytes_hex_encoded() {
        let secret = generate_secret();
        assert_eq!(secret.len(), 64);
    }

    #[test]
    fn mark_failure_follows_retry_ladder_then_fails() {
        let clock = crate::clock::SystemClock;
        let mut delivery = WebhookDelivery::new(Uuid::new_v4(), "t1", "payment.settled", serde_json::json!({}));

        delivery.mark_failure(Some(500), &clock);
        assert_eq!(delivery.status, DeliveryStatus::Retrying);
        assert_eq!(delivery.attempts, 1);

        delivery.mark_failure(Some(500), &clock);
        assert_eq!(delivery.status, DeliveryStatus::Retrying);
        assert_eq!(delivery.attempts, 2);

        delivery.mark_failure(Some(500), &clock);
        assert_eq!(delivery.status, DeliveryStatus::Failed);
        assert_eq!(delivery.attempts, 3);
        assert!(delivery.next_retry_at.is_none());
    }

    #[test]
    fn mark_failure_schedules_next_retry_using_the_injected_clock() {
        let start = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z").unwrap().with_timezone(&Utc);
        let clock = crate::clock::FakeClock::new(start);
        let mut delivery = WebhookDelivery::new(Uuid::new_v4(), "t1", "payment.settled", serde_json::json!({}));

        delivery.mark_failure(Some(500), &clock);
        assert_eq!(delivery.last_attempt_at, Some(start));
        assert_eq!(delivery.next_retry_at, Some(start + chrono::Duration::seconds(RETRY_DELAYS_SECONDS[0])));
    }

    #[test]
    fn mark_success_clears_retry_schedule() {
        let clock = crate::clock::SystemClock;
        let mut delivery = WebhookDelivery::new(Uuid::new_v4(), "t1", "payment.settled", serde_json::json!({}));
        delivery.mark_success(200, &clock);
        assert_eq!(delivery.status, DeliveryStatus::Delivered);
        assert!(delivery.next_retry_at.is_none());
    }
}
