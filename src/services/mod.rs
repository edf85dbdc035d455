pub mod gateway;
pub mod inbound_consumer;
pub mod outbox_dispatcher;
pub mod payment_intent_service;
pub mod reconciliation_service;
pub mod reports;
pub mod webhook_dispatcher;

pub use gateway::{create_gateway, CircuitBreaker, FakeGateway, GatewayError, GatewayPort, GatewayResult, GatewayStatus, ReqwestGateway};
pub use inbound_consumer::InboundConsumer;
pub use outbox_dispatcher::OutboxDispatcher;
pub use payment_intent_service::PaymentIntentService;
pub use reconciliation_service::{GatewayTransaction, ReconciliationScheduler, ReconciliationService};
pub use reports::{AccountBalance, ReportService, RevenueBucket, RevenueByCurrency};
pub use webhook_dispatcher::WebhookDispatcher;
