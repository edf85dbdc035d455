pub mod broker;
pub mod consumer;
pub mod producer;
pub mod types;

pub use broker::{consumer_config, run_consumer, BrokerPort, EXCHANGE, QUEUE_DLQ, QUEUE_EVENTS, ROUTING_KEY_ALL};
pub use consumer::{ConsumedMessage, ConsumerConfig, EventConsumer, MessageHandler};
pub use producer::{EventProducer, ProducerConfig};
pub use types::{
    PaymentAuthorizedPayload, PaymentIntentCreatedPayload, PaymentRefundedPayload,
    PaymentSettledPayload, ReconciliationDiscrepancyFoundPayload, PAYMENT_AUTHORIZED,
    PAYMENT_INTENT_CREATED, PAYMENT_REFUNDED, PAYMENT_SETTLED, RECONCILIATION_DISCREPANCY_FOUND,
};
