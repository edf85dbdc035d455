pub mod account_config;
pub mod currency;
pub mod ledger;
pub mod outbox;
pub mod payment_intent;
pub mod reconciliation;
pub mod refund;
pub mod tenant;
pub mod webhook;

pub use account_config::{AccountConfig, AccountType};
pub use currency::Currency;
pub use ledger::{BalancedPair, LedgerEntry, LedgerLine, Side};
pub use outbox::{OutboxEvent, OutboxStatus};
pub use payment_intent::{PaymentIntent, PaymentIntentStatus};
pub use reconciliation::{DiscrepancyType, ReconciliationDiscrepancy};
pub use refund::{Refund, RefundStatus};
pub use tenant::{Plan, Tenant};
pub use webhook::{DeliveryStatus, WebhookDelivery, WebhookEndpoint};
