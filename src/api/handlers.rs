use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use uuid::Uuid;

use crate::api::auth::Principal;
use crate::api::chaos::ChaosConfig;
use crate::api::requests::{
    ChaosConfigRequest, CreatePaymentIntentRequest, CreateWebhookEndpointRequest, LedgerEntriesQuery,
    ReconciliationDiscrepanciesQuery, RefundRequest, ReportRangeQuery, RevenueReportQuery, TokenRequest,
};
use crate::api::responses::{
    AccountBalanceResponse, ChaosConfigResponse, LedgerEntryResponse, PaymentIntentResponse, PrincipalResponse,
    ReconciliationDiscrepancyResponse, RefundResponse, RevenueBucketResponse, TokenResponse,
    WebhookEndpointCreatedResponse, WebhookEndpointResponse,
};
use crate::api::routes::AppState;
use crate::cache::RateLimitBucket;
use crate::error::{AppError, Result};
use crate::models::WebhookEndpoint;

const MAX_LEDGER_ENTRIES: i64 = 200;

fn tenant_header(headers: &HeaderMap) -> Result<String> {
    headers
        .get("X-Tenant-Id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| AppError::InvalidArgument("missing X-Tenant-Id header".into()))
}

fn idempotency_key_header(headers: &HeaderMap) -> Result<String> {
    headers
        .get("Idempotency-Key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| AppError::InvalidArgument("missing Idempotency-Key header".into()))
}

pub async fn issue_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<TokenRequest>,
) -> Result<Json<TokenResponse>> {
    if request.email.is_empty() || request.password.is_empty() {
        return Err(AppError::InvalidArgument("email and password are required".into()));
    }

    let tenant_id = tenant_header(&headers)?;
    let tenant = state
        .tenants
        .find_by_id(&tenant_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("tenant {tenant_id} not found")))?;

    let principal = Principal {
        subject: request.email,
        tenant_id: tenant.id,
        roles: vec!["user".to_string()],
        plan: tenant.plan,
        region: tenant.region,
    };

    Ok(Json(TokenResponse {
        access_token: principal.encode()?,
        token_type: "Bearer",
        expires_in: state.auth_settings.token_expires_seconds as i64,
    }))
}

pub async fn me(principal: Principal) -> Json<PrincipalResponse> {
    Json(PrincipalResponse::from(&principal))
}

pub async fn create_payment_intent(
    State(state): State<AppState>,
    principal: Principal,
    headers: HeaderMap,
    Json(request): Json<CreatePaymentIntentRequest>,
) -> Result<Json<PaymentIntentResponse>> {
    principal.require("payments:write")?;
    let tenant_id = tenant_header(&headers)?;
    principal.require_tenant(&tenant_id)?;
    state.rate_limiter.check(&tenant_id, RateLimitBucket::Write).await?;

    let intent = state
        .payment_intents
        .create(&tenant_id, request.amount, request.currency, &request.customer_ref)
        .await?;

    Ok(Json(intent.into()))
}

pub async fn get_payment_intent(
    State(state): State<AppState>,
    principal: Principal,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<PaymentIntentResponse>> {
    principal.require("payments:read")?;
    let tenant_id = tenant_header(&headers)?;
    principal.require_tenant(&tenant_id)?;
    state.rate_limiter.check(&tenant_id, RateLimitBucket::Read).await?;

    let intent = crate::repositories::PaymentIntentRepository::new()
        .find_by_id_pool(&state.pool, &tenant_id, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("payment intent {id} not found")))?;

    Ok(Json(intent.into()))
}

pub async fn confirm_payment_intent(
    State(state): State<AppState>,
    principal: Principal,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<PaymentIntentResponse>> {
    principal.require("payments:write")?;
    let tenant_id = tenant_header(&headers)?;
    principal.require_tenant(&tenant_id)?;
    state.rate_limiter.check(&tenant_id, RateLimitBucket::Write).await?;
    let idempotency_key = idempotency_key_header(&headers)?;

    let request_hash = state.idempotency.hash_request(&id);
    let intent = state
        .idempotency
        .execute(&tenant_id, "confirm", &id.to_string(), &idempotency_key, &request_hash, || async {
            state.payment_intents.confirm(&tenant_id, id).await
        })
        .await?;

    Ok(Json(intent.into()))
}

pub async fn refund_payment_intent(
    State(state): State<AppState>,
    principal: Principal,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(request): Json<RefundRequest>,
) -> Result<Json<RefundResponse>> {
    principal.require("payments:write")?;
    let tenant_id = tenant_header(&headers)?;
    principal.require_tenant(&tenant_id)?;
    state.rate_limiter.check(&tenant_id, RateLimitBucket::Write).await?;
    let idempotency_key = idempotency_key_header(&headers)?;

    let request_hash = state.idempotency.hash_request(&request);
    let refund = state
        .idempotency
        .execute(&tenant_id, "refund", &id.to_string(), &idempotency_key, &request_hash, || async {
            state.payment_intents.refund(&tenant_id, id, request.amount, request.reason.clone()).await
        })
        .await?;

    Ok(Json(refund.into()))
}

pub async fn list_refunds(
    State(state): State<AppState>,
    principal: Principal,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<RefundResponse>>> {
    principal.require("payments:read")?;
    let tenant_id = tenant_header(&headers)?;
    principal.require_tenant(&tenant_id)?;
    state.rate_limiter.check(&tenant_id, RateLimitBucket::Read).await?;

    let refunds = state.refunds.find_by_payment_intent(&state.pool, &tenant_id, id).await?;
    Ok(Json(refunds.into_iter().map(Into::into).collect()))
}

pub async fn list_ledger_entries(
    State(state): State<AppState>,
    principal: Principal,
    headers: HeaderMap,
    Query(query): Query<LedgerEntriesQuery>,
) -> Result<Json<Vec<LedgerEntryResponse>>> {
    principal.require("payments:read")?;
    let tenant_id = tenant_header(&headers)?;
    principal.require_tenant(&tenant_id)?;
    state.rate_limiter.check(&tenant_id, RateLimitBucket::Read).await?;

    let limit = query.limit.unwrap_or(MAX_LEDGER_ENTRIES).clamp(1, MAX_LEDGER_ENTRIES);
    let entries = state.ledger.find_entries_in_range(&state.pool, &tenant_id, query.from, query.to, limit).await?;
    Ok(Json(entries.into_iter().map(Into::into).collect()))
}

pub async fn revenue_report(
    State(state): State<AppState>,
    principal: Principal,
    headers: HeaderMap,
    Query(query): Query<RevenueReportQuery>,
) -> Result<Json<Vec<RevenueBucketResponse>>> {
    principal.require("payments:read")?;
    let tenant_id = tenant_header(&headers)?;
    principal.require_tenant(&tenant_id)?;
    state.rate_limiter.check(&tenant_id, RateLimitBucket::Read).await?;

    let buckets = state.reports.revenue_bucketed(&tenant_id, query.from, query.to, &query.granularity).await?;
    Ok(Json(buckets.into_iter().map(Into::into).collect()))
}

pub async fn account_balances_report(
    State(state): State<AppState>,
    principal: Principal,
    headers: HeaderMap,
    Query(query): Query<ReportRangeQuery>,
) -> Result<Json<Vec<AccountBalanceResponse>>> {
    principal.require("payments:read")?;
    let tenant_id = tenant_header(&headers)?;
    principal.require_tenant(&tenant_id)?;
    state.rate_limiter.check(&tenant_id, RateLimitBucket::Read).await?;

    let balances = state.reports.account_balances(&tenant_id, query.from, query.to).await?;
    Ok(Json(balances.into_iter().map(Into::into).collect()))
}

pub async fn create_webhook(
    State(state): State<AppState>,
    principal: Principal,
    headers: HeaderMap,
    Json(request): Json<CreateWebhookEndpointRequest>,
) -> Result<Json<WebhookEndpointCreatedResponse>> {
    principal.require("admin:write")?;
    let tenant_id = tenant_header(&headers)?;
    principal.require_tenant(&tenant_id)?;
    state.rate_limiter.check(&tenant_id, RateLimitBucket::Write).await?;

    let endpoint = WebhookEndpoint::new(&tenant_id, request.url, request.events);
    let saved = state.webhooks.insert_endpoint(&state.pool, &endpoint).await?;
    let secret = saved.secret.clone();

    Ok(Json(WebhookEndpointCreatedResponse { endpoint: saved.into(), secret }))
}

pub async fn list_webhooks(
    State(state): State<AppState>,
    principal: Principal,
    headers: HeaderMap,
) -> Result<Json<Vec<WebhookEndpointResponse>>> {
    principal.require("admin:write")?;
    let tenant_id = tenant_header(&headers)?;
    principal.require_tenant(&tenant_id)?;
    state.rate_limiter.check(&tenant_id, RateLimitBucket::Read).await?;

    let endpoints = state.webhooks.list_endpoints(&state.pool, &tenant_id).await?;
    Ok(Json(endpoints.into_iter().map(Into::into).collect()))
}

pub async fn delete_webhook(
    State(state): State<AppState>,
    principal: Principal,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    principal.require("admin:write")?;
    let tenant_id = tenant_header(&headers)?;
    principal.require_tenant(&tenant_id)?;
    state.rate_limiter.check(&tenant_id, RateLimitBucket::Write).await?;

    let deleted = state.webhooks.delete_endpoint(&state.pool, &tenant_id, id).await?;
    if !deleted {
        return Err(AppError::NotFound(format!("webhook endpoint {id} not found")));
    }
    Ok(axum::http::StatusCode::NO_CONTENT)
}

pub async fn list_discrepancies(
    State(state): State<AppState>,
    principal: Principal,
    headers: HeaderMap,
    Query(query): Query<ReconciliationDiscrepanciesQuery>,
) -> Result<Json<Vec<ReconciliationDiscrepancyResponse>>> {
    principal.require("payments:read")?;
    let tenant_id = tenant_header(&headers)?;
    principal.require_tenant(&tenant_id)?;
    state.rate_limiter.check(&tenant_id, RateLimitBucket::Read).await?;

    let limit = query.limit.unwrap_or(100).clamp(1, 500);
    let discrepancies = state.reconciliation.list(&tenant_id, query.resolved, limit).await?;
    Ok(Json(discrepancies.into_iter().map(Into::into).collect()))
}

pub async fn resolve_discrepancy(
    State(state): State<AppState>,
    principal: Principal,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<ReconciliationDiscrepancyResponse>> {
    principal.require("payments:write")?;
    let tenant_id = tenant_header(&headers)?;
    principal.require_tenant(&tenant_id)?;
    state.rate_limiter.check(&tenant_id, RateLimitBucket::Write).await?;

    let discrepancy = state.reconciliation.resolve(&tenant_id, id).await?;
    Ok(Json(discrepancy.into()))
}

pub async fn get_chaos_config(
    State(state): State<AppState>,
    principal: Principal,
    headers: HeaderMap,
) -> Result<Json<ChaosConfigResponse>> {
    principal.require("admin:write")?;
    let tenant_id = tenant_header(&headers)?;
    principal.require_tenant(&tenant_id)?;

    let config = state.chaos.get(&tenant_id).await?;
    Ok(Json(config.into()))
}

pub async fn put_chaos_config(
    State(state): State<AppState>,
    principal: Principal,
    headers: HeaderMap,
    Json(request): Json<ChaosConfigRequest>,
) -> Result<Json<ChaosConfigResponse>> {
    principal.require("admin:write")?;
    let tenant_id = tenant_header(&headers)?;
    principal.require_tenant(&tenant_id)?;

    let config: ChaosConfig = state.chaos.set(&tenant_id, request.fail_percent, request.latency_ms).await?;
    Ok(Json(config.into()))
}

pub async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    match &state.health_checker {
        Some(checker) if checker.is_alive() => axum::http::StatusCode::OK,
        Some(_) => axum::http::StatusCode::SERVICE_UNAVAILABLE,
        None => axum::http::StatusCode::OK,
    }
}

pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    match &state.health_checker {
        Some(checker) => {
            let health = checker.check_all().await;
            let status = if checker.is_ready().await {
                axum::http::StatusCode::OK
            } else {
                axum::http::StatusCode::SERVICE_UNAVAILABLE
            };
            (status, Json(serde_json::to_value(health).unwrap_or_default()))
        }
        None => (axum::http::StatusCode::OK, Json(serde_json::json!({"status": "unknown"}))),
    }
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics_handle {
        Some(handle) => handle.render(),
        None => String::new(),
    }
}
