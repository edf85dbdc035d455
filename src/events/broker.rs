use crate::error::Result;
use crate::events::consumer::{ConsumedMessage, ConsumerConfig, EventConsumer, MessageHandler};
use crate::events::producer::{EventProducer, ProducerConfig};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Header name carrying the originating request/worker correlation id.
pub const HEADER_CORRELATION_ID: &str = "X-Correlation-Id";
/// Header name carrying the owning tenant id.
pub const HEADER_TENANT_ID: &str = "X-Tenant-Id";

/// Logical topology: one durable topic carries every event, routed by
/// `event_type`; anything the consumer can't process lands on the DLQ topic.
/// Mirrors the `payments.x` topic exchange / `payments.events` queue /
/// `payments.dlq` dead-letter queue used by the reference broker, adapted to
/// a Kafka-backed transport where the routing key becomes the record key.
pub const EXCHANGE: &str = "payments.x";
pub const QUEUE_EVENTS: &str = "payments.events";
pub const QUEUE_DLQ: &str = "payments.dlq";
pub const ROUTING_KEY_ALL: &str = "#";

/// Thin wrapper over `EventProducer`/`EventConsumer` that speaks in
/// exchange/routing-key terms rather than raw topic names, so callers don't
/// need to know the broker is Kafka underneath.
pub struct BrokerPort {
    producer: EventProducer,
}

impl BrokerPort {
    pub fn new(brokers: Vec<String>) -> Self {
        let producer = EventProducer::new(ProducerConfig {
            brokers,
            default_topic: QUEUE_EVENTS.to_string(),
            ..ProducerConfig::default()
        });
        Self { producer }
    }

    pub async fn connect(&mut self) -> Result<()> {
        self.producer.connect().await
    }

    /// Publishes `payload` under `routing_key` (the event's `event_type`).
    /// The routing key becomes the record key so consumers and DLQ replay
    /// tooling can recover which event type a dead-lettered record was.
    pub async fn publish<T: Serialize>(&self, routing_key: &str, payload: &T) -> Result<i64> {
        self.producer.send(QUEUE_EVENTS, Some(routing_key), payload).await
    }

    /// Publishes like [`BrokerPort::publish`], additionally attaching
    /// `X-Correlation-Id`/`X-Tenant-Id` record headers so a consumer can
    /// recover them without needing to parse the payload.
    pub async fn publish_with_context<T: Serialize>(
        &self,
        routing_key: &str,
        payload: &T,
        correlation_id: &str,
        tenant_id: &str,
    ) -> Result<i64> {
        let mut headers = BTreeMap::new();
        headers.insert(HEADER_CORRELATION_ID.to_string(), correlation_id.as_bytes().to_vec());
        headers.insert(HEADER_TENANT_ID.to_string(), tenant_id.as_bytes().to_vec());
        self.producer.send_with_headers(QUEUE_EVENTS, Some(routing_key), payload, headers).await
    }

    pub fn is_connected(&self) -> bool {
        self.producer.is_connected()
    }
}

/// Builds the consumer side of the topology: subscribes to `QUEUE_EVENTS`
/// and dead-letters failed deliveries onto `QUEUE_DLQ`, matching the
/// reference broker's reject-without-requeue behavior.
pub fn consumer_config(brokers: Vec<String>, group_id: impl Into<String>) -> ConsumerConfig {
    ConsumerConfig {
        brokers,
        topics: vec![QUEUE_EVENTS.to_string()],
        group_id: group_id.into(),
        dead_letter_topic: Some(QUEUE_DLQ.to_string()),
        ..ConsumerConfig::default()
    }
}

pub async fn run_consumer<H: MessageHandler + 'static>(mut consumer: EventConsumer, handler: Arc<H>) -> Result<()> {
    consumer.connect().await?;
    consumer.start(handler).await
}

pub fn routing_key(message: &ConsumedMessage) -> Option<String> {
    message.key_str()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consumer_config_subscribes_to_events_queue_and_dlqs() {
        let cfg = consumer_config(vec!["localhost:9092".to_string()], "payments-ledger-core");
        assert_eq!(cfg.topics, vec![QUEUE_EVENTS.to_string()]);
        assert_eq!(cfg.dead_letter_topic, Some(QUEUE_DLQ.to_string()));
        assert_eq!(cfg.group_id, "payments-ledger-core");
    }

    #[test]
    fn broker_port_not_connected_before_connect() {
        let port = BrokerPort::new(vec!["localhost:9092".to_string()]);
        assert!(!port.is_connected());
    }
}
