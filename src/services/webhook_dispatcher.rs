use std::sync::Arc;
use std::time::Duration;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::WebhookSettings;
use crate::error::{AppError, Result};
use crate::models::WebhookDelivery;
use crate::repositories::WebhookRepository;

type HmacSha256 = Hmac<Sha256>;

fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts keys of any length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

const CLAIM_LIMIT: i64 = 50;

/// Enqueues and delivers webhook notifications. `enqueue` is typically called
/// right after an outbox event is published, not inside the originating
/// business transaction.
pub struct WebhookDispatcher {
    pool: PgPool,
    webhooks: WebhookRepository,
    client: reqwest::Client,
    delivery_enabled: bool,
    poll_interval: Duration,
    clock: Arc<dyn Clock>,
}

impl WebhookDispatcher {
    pub fn new(pool: PgPool, settings: &WebhookSettings) -> Self {
        Self::with_clock(pool, settings, Arc::new(SystemClock))
    }

    pub fn with_clock(pool: PgPool, settings: &WebhookSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            pool,
            webhooks: WebhookRepository::with_clock(clock.clone()),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(settings.http_timeout_seconds))
                .build()
                .expect("reqwest client builds with a fixed timeout"),
            delivery_enabled: settings.delivery_enabled,
            poll_interval: Duration::from_millis(500),
            clock,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Finds active endpoints subscribed to `event_type` (or `"*"`) and inserts
    /// one PENDING `WebhookDelivery` per match. Returns the number enqueued.
    pub async fn enqueue(&self, tenant_id: &str, event_type: &str, payload: serde_json::Value) -> Result<usize> {
        let endpoints = self.webhooks.find_active_endpoints(&self.pool, tenant_id).await?;
        let matching: Vec<_> = endpoints.into_iter().filter(|e| e.matches(event_type)).collect();

        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        for endpoint in &matching {
            let delivery = WebhookDelivery::new(endpoint.id, tenant_id, event_type, payload.clone());
            self.webhooks.insert_delivery(&mut tx, &delivery).await?;
        }
        tx.commit().await.map_err(AppError::Database)?;

        Ok(matching.len())
    }

    /// Claims due deliveries and attempts each once, returning the number claimed.
    pub async fn run_once(&self) -> Result<usize> {
        let due = self.webhooks.claim_due(&self.pool, CLAIM_LIMIT).await?;
        let claimed = due.len();

        for delivery in due {
            self.attempt(delivery).await;
        }

        Ok(claimed)
    }

    async fn attempt(&self, mut delivery: WebhookDelivery) {
        if !self.delivery_enabled {
            return;
        }

        let endpoints = match self.webhooks.find_active_endpoints(&self.pool, &delivery.tenant_id).await {
            Ok(endpoints) => endpoints,
            Err(e) => {
                error!(error = %e, delivery_id = %delivery.id, "failed to load endpoint for webhook delivery");
                return;
            }
        };
        let Some(endpoint) = endpoints.into_iter().find(|e| e.id == delivery.endpoint_id) else {
            warn!(delivery_id = %delivery.id, "webhook endpoint no longer active, marking failed");
            delivery.mark_failure(None, self.clock.as_ref());
            let _ = self.webhooks.update_after_attempt(&self.pool, &delivery).await;
            return;
        };

        let body = match serde_json::to_vec(&delivery.payload) {
            Ok(body) => body,
            Err(e) => {
                error!(error = %e, delivery_id = %delivery.id, "failed to serialize webhook payload");
                return;
            }
        };
        let signature = sign(&endpoint.secret, &body);

        let response = self
            .client
            .post(&endpoint.url)
            .header("X-Signature", signature)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await;

        match response {
            Ok(response) if response.status().is_success() => {
                delivery.mark_success(response.status().as_u16() as i32, self.clock.as_ref());
                debug!(delivery_id = %delivery.id, "webhook delivered");
            }
            Ok(response) => {
                delivery.mark_failure(Some(response.status().as_u16() as i32), self.clock.as_ref());
                warn!(delivery_id = %delivery.id, status = %response.status(), "webhook delivery failed");
            }
            Err(e) => {
                delivery.mark_failure(None, self.clock.as_ref());
                warn!(error = %e, delivery_id = %delivery.id, "webhook delivery errored");
            }
        }

        if let Err(e) = self.webhooks.update_after_attempt(&self.pool, &delivery).await {
            error!(error = %e, delivery_id = %delivery.id, "failed to record webhook delivery attempt");
        }
    }

    pub async fn run(self: Arc<Self>, cancellation: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancellation.cancelled() => break,
                result = self.run_once() => {
                    match result {
                        Ok(0) => tokio::time::sleep(self.poll_interval).await,
                        Ok(_) => {}
                        Err(e) => {
                            error!(error = %e, "webhook dispatch cycle failed");
                            tokio::time::sleep(self.poll_interval).await;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_is_deterministic_hex_sha256() {
        let a = sign("secret", b"body");
        let b = sign("secret", b"body");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn sign_differs_per_secret() {
        assert_ne!(sign("secret-a", b"body"), sign("secret-b", b"body"));
    }
}
