pub mod account_config_repository;
pub mod ledger_repository;
pub mod outbox_repository;
pub mod payment_intent_repository;
pub mod reconciliation_repository;
pub mod refund_repository;
pub mod tenant_repository;
pub mod webhook_repository;

pub use account_config_repository::AccountConfigRepository;
pub use ledger_repository::LedgerRepository;
pub use outbox_repository::OutboxRepository;
pub use payment_intent_repository::PaymentIntentRepository;
pub use reconciliation_repository::ReconciliationRepository;
pub use refund_repository::RefundRepository;
pub use tenant_repository::TenantRepository;
pub use webhook_repository::WebhookRepository;

use sqlx::PgPool;

/// Database connection pool type alias.
pub type DbPool = PgPool;
