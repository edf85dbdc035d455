use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::PgPool;

use crate::api::chaos::ChaosStore;
use crate::api::handlers;
use crate::cache::RateLimiter;
use crate::config::{AuthSettings, IdempotencySettings};
use crate::idempotency::{IdempotencyHandler, IdempotencyHandlerConfig};
use crate::observability::HealthChecker;
use crate::repositories::{LedgerRepository, RefundRepository, TenantRepository, WebhookRepository};
use crate::services::{PaymentIntentService, ReconciliationService, ReportService, WebhookDispatcher};

/// Shared application state, cloned once per request handler. Service and
/// repository fields hold their own `PgPool`/`redis::Client` clones rather
/// than sharing a single `Arc`, matching the teacher's per-collaborator
/// construction in `AppState::new`.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub redis_client: redis::Client,
    pub payment_intents: Arc<PaymentIntentService>,
    pub refunds: Arc<RefundRepository>,
    pub ledger: Arc<LedgerRepository>,
    pub reports: Arc<ReportService>,
    pub webhooks: Arc<WebhookRepository>,
    pub webhook_dispatcher: Arc<WebhookDispatcher>,
    pub reconciliation: Arc<ReconciliationService>,
    pub tenants: Arc<TenantRepository>,
    pub idempotency: Arc<IdempotencyHandler>,
    pub rate_limiter: Arc<RateLimiter>,
    pub chaos: Arc<ChaosStore>,
    pub auth_settings: Arc<AuthSettings>,
    pub metrics_handle: Option<PrometheusHandle>,
    pub health_checker: Option<Arc<HealthChecker>>,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        redis_client: redis::Client,
        rate_limiter: RateLimiter,
        auth_settings: AuthSettings,
        idempotency_settings: &IdempotencySettings,
        webhook_dispatcher: WebhookDispatcher,
    ) -> Self {
        Self {
            payment_intents: Arc::new(PaymentIntentService::new(pool.clone())),
            refunds: Arc::new(RefundRepository::new()),
            ledger: Arc::new(LedgerRepository::new()),
            reports: Arc::new(ReportService::new(pool.clone())),
            webhooks: Arc::new(WebhookRepository::new()),
            webhook_dispatcher: Arc::new(webhook_dispatcher),
            reconciliation: Arc::new(ReconciliationService::new(pool.clone())),
            tenants: Arc::new(TenantRepository::new(pool.clone())),
            idempotency: Arc::new(IdempotencyHandler::new(
                pool.clone(),
                redis_client.clone(),
                IdempotencyHandlerConfig { ttl_seconds: idempotency_settings.ttl_seconds },
            )),
            rate_limiter: Arc::new(rate_limiter),
            chaos: Arc::new(ChaosStore::new(redis_client.clone())),
            auth_settings: Arc::new(auth_settings),
            metrics_handle: None,
            health_checker: None,
            pool,
            redis_client,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }

    pub fn with_health_checker(mut self, checker: Arc<HealthChecker>) -> Self {
        self.health_checker = Some(checker);
        self
    }
}

/// Builds the full route table, versioned under `/v1` save for the
/// unversioned operational endpoints.
pub fn create_router(state: AppState) -> Router {
    let v1 = Router::new()
        .route("/auth/token", post(handlers::issue_token))
        .route("/me", get(handlers::me))
        .route("/payment-intents", post(handlers::create_payment_intent))
        .route("/payment-intents/:id", get(handlers::get_payment_intent))
        .route("/payment-intents/:id/confirm", post(handlers::confirm_payment_intent))
        .route("/payment-intents/:id/refund", post(handlers::refund_payment_intent))
        .route("/payment-intents/:id/refunds", get(handlers::list_refunds))
        .route("/ledger/entries", get(handlers::list_ledger_entries))
        .route("/reports/revenue", get(handlers::revenue_report))
        .route("/reports/account-balances", get(handlers::account_balances_report))
        .route(
            "/webhooks",
            post(handlers::create_webhook).get(handlers::list_webhooks),
        )
        .route("/webhooks/:id", axum::routing::delete(handlers::delete_webhook))
        .route("/reconciliation/discrepancies", get(handlers::list_discrepancies))
        .route("/reconciliation/discrepancies/:id/resolve", post(handlers::resolve_discrepancy))
        .route("/admin/chaos", get(handlers::get_chaos_config).put(handlers::put_chaos_config));

    Router::new()
        .nest("/v1", v1)
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        .route("/metrics", get(handlers::metrics))
        .with_state(state)
}
