use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::Result;
use crate::events::broker::BrokerPort;
use crate::models::outbox::{DEFAULT_CLAIM_LIMIT, DEFAULT_MAX_ATTEMPTS};
use crate::models::OutboxEvent;
use crate::repositories::OutboxRepository;

/// Background worker implementing the transactional outbox's claim/publish/settle
/// cycle. Runs continuously; each cycle claims a lease batch, publishes every
/// claimed event to the broker, and marks it SENT or schedules the next
/// backoff attempt (eventually DEAD).
pub struct OutboxDispatcher {
    pool: PgPool,
    outbox: OutboxRepository,
    broker: Arc<BrokerPort>,
    worker_id: String,
    claim_limit: i64,
    max_attempts: i32,
    poll_interval: Duration,
}

impl OutboxDispatcher {
    pub fn new(pool: PgPool, broker: Arc<BrokerPort>, worker_id: impl Into<String>) -> Self {
        Self {
            pool,
            outbox: OutboxRepository::new(),
            broker,
            worker_id: worker_id.into(),
            claim_limit: DEFAULT_CLAIM_LIMIT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            poll_interval: Duration::from_millis(500),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Runs one claim-publish-settle cycle, returning the number of events claimed.
    pub async fn run_once(&self) -> Result<usize> {
        let claimed = self.outbox.claim_batch(&self.pool, &self.worker_id, Some(self.claim_limit)).await?;
        let claimed_count = claimed.len();

        for event in claimed {
            self.dispatch_one(event).await;
        }

        Ok(claimed_count)
    }

    async fn dispatch_one(&self, event: OutboxEvent) {
        match self.publish(&event).await {
            Ok(()) => {
                if let Err(e) = self.outbox.mark_sent(&self.pool, event.id).await {
                    error!(error = %e, event_id = %event.id, "failed to mark outbox event sent");
                }
            }
            Err(e) => {
                warn!(error = %e, event_id = %event.id, attempts = event.attempts, "outbox publish failed");
                if let Err(e) = self
                    .outbox
                    .mark_failed(&self.pool, event.id, event.attempts, Some(self.max_attempts))
                    .await
                {
                    error!(error = %e, event_id = %event.id, "failed to record outbox publish failure");
                }
            }
        }
    }

    /// Publishes with routing key `event_type` and body `payload ∪ {tenant_id}`,
    /// with `X-Correlation-Id`/`X-Tenant-Id` attached as record headers.
    async fn publish(&self, event: &OutboxEvent) -> Result<()> {
        let mut body = event.payload.clone();
        if let serde_json::Value::Object(ref mut map) = body {
            map.insert("tenant_id".to_string(), serde_json::Value::String(event.tenant_id.clone()));
        }

        let correlation_id = body
            .get("correlation_id")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default();

        self.broker
            .publish_with_context(&event.event_type, &body, correlation_id, &event.tenant_id)
            .await?;
        debug!(event_type = %event.event_type, event_id = %event.id, "published outbox event");
        Ok(())
    }

    /// Runs the dispatch loop until `cancellation` fires.
    pub async fn run(self: Arc<Self>, cancellation: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancellation.cancelled() => break,
                result = self.run_once() => {
                    match result {
                        Ok(0) => tokio::time::sleep(self.poll_interval).await,
                        Ok(_) => {}
                        Err(e) => {
                            error!(error = %e, "outbox dispatch cycle failed");
                            tokio::time::sleep(self.poll_interval).await;
                        }
                    }
                }
            }
        }
    }
}
