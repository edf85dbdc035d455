use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::config::GatewaySettings;
use crate::error::{AppError, Result};
use crate::models::Currency;

/// Error codes the circuit breaker treats as transient. Anything else is
/// raised on the first attempt instead of retried. Mirrors the Stripe
/// adapter's `RETRYABLE_ERRORS` set.
const RETRYABLE_ERROR_CODES: &[&str] = &["rate_limit", "api_connection_error", "api_error", "timeout"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GatewayStatus {
    Authorized,
    Captured,
    Failed,
    Refunded,
    PartiallyRefunded,
    NotFound,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct GatewayResult {
    pub success: bool,
    pub gateway_ref: String,
    pub status: GatewayStatus,
    pub error_code: String,
    pub error_message: String,
    pub is_retryable: bool,
}

impl GatewayResult {
    pub fn ok(gateway_ref: impl Into<String>, status: GatewayStatus) -> Self {
        Self {
            success: true,
            gateway_ref: gateway_ref.into(),
            status,
            error_code: String::new(),
            error_message: String::new(),
            is_retryable: false,
        }
    }

    pub fn not_found(gateway_ref: impl Into<String>) -> Self {
        Self {
            success: false,
            gateway_ref: gateway_ref.into(),
            status: GatewayStatus::NotFound,
            error_code: "not_found".to_string(),
            error_message: "gateway ref not found".to_string(),
            is_retryable: false,
        }
    }

    fn circuit_open() -> Self {
        Self {
            success: false,
            gateway_ref: String::new(),
            status: GatewayStatus::Failed,
            error_code: "circuit_open".to_string(),
            error_message: "circuit breaker is open, gateway temporarily unavailable".to_string(),
            is_retryable: true,
        }
    }

    fn exhausted(message: impl Into<String>) -> Self {
        Self {
            success: false,
            gateway_ref: String::new(),
            status: GatewayStatus::Failed,
            error_code: "max_retries".to_string(),
            error_message: message.into(),
            is_retryable: true,
        }
    }
}

/// A failure from a provider call. `code` drives whether the breaker retries
/// it or raises it immediately (see `RETRYABLE_ERROR_CODES`).
#[derive(Debug, Clone)]
pub struct GatewayError {
    pub code: String,
    pub message: String,
}

impl GatewayError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self { code: code.into(), message: message.into() }
    }

    fn is_retryable(&self) -> bool {
        RETRYABLE_ERROR_CODES.contains(&self.code.as_str())
    }
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for GatewayError {}

struct CircuitState {
    failure_count: u32,
    last_failure_time: Option<DateTime<Utc>>,
    is_open: bool,
}

/// Per-adapter circuit breaker. Opens after `failure_threshold` consecutive
/// failures; half-opens lazily the first time `is_open` is checked after
/// `recovery_timeout` has elapsed, rather than on a timer.
pub struct CircuitBreaker {
    failure_threshold: u32,
    recovery_timeout: Duration,
    state: Mutex<CircuitState>,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self::with_clock(failure_threshold, recovery_timeout, Arc::new(SystemClock))
    }

    pub fn with_clock(failure_threshold: u32, recovery_timeout: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            failure_threshold,
            recovery_timeout,
            state: Mutex::new(CircuitState { failure_count: 0, last_failure_time: None, is_open: false }),
            clock,
        }
    }

    pub fn is_open(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.is_open {
            if let Some(last) = state.last_failure_time {
                let elapsed = self.clock.now() - last;
                if elapsed > chrono::Duration::from_std(self.recovery_timeout).unwrap_or(chrono::Duration::zero()) {
                    state.is_open = false;
                    state.failure_count = 0;
                }
            }
        }
        state.is_open
    }

    pub fn record_success(&self) {
        let mut state = self.state.lock().unwrap();
        state.failure_count = 0;
        state.is_open = false;
    }

    pub fn record_failure(&self) {
        let mut state = self.state.lock().unwrap();
        state.failure_count += 1;
        state.last_failure_time = Some(self.clock.now());
        if state.failure_count >= self.failure_threshold {
            state.is_open = true;
        }
    }

    /// Runs `op` under the breaker with the Stripe-adapter retry ladder:
    /// short-circuits while the breaker is open, raises non-retryable errors
    /// immediately on the first attempt (still counted as a failure), and
    /// otherwise backs off `min(base * 2^attempt + jitter, max_delay)` seconds
    /// between attempts.
    pub async fn call_with_retry<F, Fut>(
        &self,
        max_retries: u32,
        base_delay_seconds: f64,
        max_delay_seconds: f64,
        mut op: F,
    ) -> Result<GatewayResult>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<GatewayResult, GatewayError>>,
    {
        if self.is_open() {
            return Ok(GatewayResult::circuit_open());
        }

        let mut last_error: Option<GatewayError> = None;
        for attempt in 0..=max_retries {
            match op().await {
                Ok(result) => {
                    self.record_success();
                    return Ok(result);
                }
                Err(err) => {
                    if !err.is_retryable() && attempt == 0 {
                        self.record_failure();
                        return Err(AppError::Transient(err.to_string()));
                    }
                    if attempt < max_retries {
                        let backoff = (base_delay_seconds * 2f64.powi(attempt as i32) + jitter())
                            .min(max_delay_seconds);
                        tokio::time::sleep(Duration::from_secs_f64(backoff)).await;
                    } else {
                        self.record_failure();
                    }
                    last_error = Some(err);
                }
            }
        }

        Ok(GatewayResult::exhausted(
            last_error.map(|e| e.to_string()).unwrap_or_else(|| "max retries exceeded".to_string()),
        ))
    }
}

fn jitter() -> f64 {
    rand::thread_rng().gen_range(0.0..1.0)
}

/// Port a payment intent's gateway calls are made through. `FakeGateway` backs
/// local development and tests; `ReqwestGateway` is the HTTP-backed provider
/// used when `gateway.provider = "stripe"`.
#[async_trait]
pub trait GatewayPort: Send + Sync {
    async fn authorize(
        &self,
        tenant_id: &str,
        amount: Decimal,
        currency: Currency,
        customer_ref: &str,
        idempotency_key: &str,
    ) -> Result<GatewayResult>;

    async fn capture(&self, gateway_ref: &str, amount: Decimal, idempotency_key: &str) -> Result<GatewayResult>;

    async fn refund(&self, gateway_ref: &str, amount: Decimal, idempotency_key: &str) -> Result<GatewayResult>;

    async fn get_status(&self, gateway_ref: &str) -> Result<GatewayResult>;
}

#[derive(Debug, Clone, Default)]
struct FakeGatewayEntry {
    status: GatewayStatus,
    captured_amount: Decimal,
    refunded_amount: Decimal,
}

impl Default for GatewayStatus {
    fn default() -> Self {
        GatewayStatus::Authorized
    }
}

/// In-memory gateway used for local development and tests. Never fails by
/// default; `with_fail_rate` can simulate declines for retry-path tests.
pub struct FakeGateway {
    fail_rate: f64,
    store: AsyncMutex<std::collections::HashMap<String, FakeGatewayEntry>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self { fail_rate: 0.0, store: AsyncMutex::new(std::collections::HashMap::new()) }
    }

    pub fn with_fail_rate(fail_rate: f64) -> Self {
        Self { fail_rate, store: AsyncMutex::new(std::collections::HashMap::new()) }
    }
}

impl Default for FakeGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GatewayPort for FakeGateway {
    async fn authorize(
        &self,
        _tenant_id: &str,
        _amount: Decimal,
        _currency: Currency,
        _customer_ref: &str,
        _idempotency_key: &str,
    ) -> Result<GatewayResult> {
        if self.fail_rate > 0.0 && rand::thread_rng().gen_range(0.0..1.0) < self.fail_rate {
            return Ok(GatewayResult {
                success: false,
                gateway_ref: String::new(),
                status: GatewayStatus::Failed,
                error_code: "card_declined".to_string(),
                error_message: "simulated decline".to_string(),
                is_retryable: false,
            });
        }

        let gateway_ref = format!("fake_{}", Uuid::new_v4().simple());
        let mut store = self.store.lock().await;
        store.insert(
            gateway_ref.clone(),
            FakeGatewayEntry { status: GatewayStatus::Authorized, captured_amount: Decimal::ZERO, refunded_amount: Decimal::ZERO },
        );
        Ok(GatewayResult::ok(gateway_ref, GatewayStatus::Authorized))
    }

    async fn capture(&self, gateway_ref: &str, amount: Decimal, _idempotency_key: &str) -> Result<GatewayResult> {
        let mut store = self.store.lock().await;
        let Some(entry) = store.get_mut(gateway_ref) else {
            return Ok(GatewayResult::not_found(gateway_ref));
        };
        entry.status = GatewayStatus::Captured;
        entry.captured_amount = amount;
        Ok(GatewayResult::ok(gateway_ref, GatewayStatus::Captured))
    }

    async fn refund(&self, gateway_ref: &str, amount: Decimal, _idempotency_key: &str) -> Result<GatewayResult> {
        let mut store = self.store.lock().await;
        let Some(entry) = store.get_mut(gateway_ref) else {
            return Ok(GatewayResult::not_found(gateway_ref));
        };
        entry.refunded_amount += amount;
        entry.status = if entry.refunded_amount >= entry.captured_amount {
            GatewayStatus::Refunded
        } else {
            GatewayStatus::PartiallyRefunded
        };
        Ok(GatewayResult::ok(gateway_ref, entry.status))
    }

    async fn get_status(&self, gateway_ref: &str) -> Result<GatewayResult> {
        let store = self.store.lock().await;
        match store.get(gateway_ref) {
            Some(entry) => Ok(GatewayResult::ok(gateway_ref, entry.status)),
            None => Ok(GatewayResult::not_found(gateway_ref)),
        }
    }
}

/// HTTP-backed gateway adapter wrapped in the retry/circuit-breaker ladder.
/// Stands in for a provider SDK binding: requests are built directly against
/// the provider's REST API with `reqwest`.
pub struct ReqwestGateway {
    client: reqwest::Client,
    api_key: String,
    breaker: CircuitBreaker,
    max_retries: u32,
    base_delay_seconds: f64,
    max_delay_seconds: f64,
}

impl ReqwestGateway {
    pub fn new(api_key: impl Into<String>, settings: &GatewaySettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            breaker: CircuitBreaker::new(
                settings.circuit_failure_threshold,
                Duration::from_secs_f64(settings.circuit_recovery_timeout_seconds),
            ),
            max_retries: settings.max_retries,
            base_delay_seconds: settings.retry_base_delay_seconds,
            max_delay_seconds: settings.retry_max_delay_seconds,
        }
    }

    fn to_minor_units(amount: Decimal, currency: Currency) -> i64 {
        use rust_decimal::prelude::ToPrimitive;
        let scale = Decimal::from(10i64.pow(currency.decimal_places() as u32));
        (amount * scale).round().to_i64().unwrap_or(0)
    }

    async fn post(&self, path: &str, form: &[(&str, String)], idempotency_key: &str) -> std::result::Result<serde_json::Value, GatewayError> {
        let response = self
            .client
            .post(format!("https://api.stripe.com/v1/{path}"))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .header("Idempotency-Key", idempotency_key)
            .form(form)
            .send()
            .await
            .map_err(|e| GatewayError::new("api_connection_error", e.to_string()))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(GatewayError::new("rate_limit", "rate limited by gateway"));
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::new("api_error", format!("gateway returned {status}: {body}")));
        }

        response.json().await.map_err(|e| GatewayError::new("api_error", e.to_string()))
    }
}

#[async_trait]
impl GatewayPort for ReqwestGateway {
    async fn authorize(
        &self,
        tenant_id: &str,
        amount: Decimal,
        currency: Currency,
        customer_ref: &str,
        idempotency_key: &str,
    ) -> Result<GatewayResult> {
        let minor_units = Self::to_minor_units(amount, currency);
        self.breaker
            .call_with_retry(self.max_retries, self.base_delay_seconds, self.max_delay_seconds, || async {
                let form = [
                    ("amount", minor_units.to_string()),
                    ("currency", currency.to_string().to_lowercase()),
                    ("capture_method", "manual".to_string()),
                    ("metadata[tenant_id]", tenant_id.to_string()),
                    ("metadata[customer_ref]", customer_ref.to_string()),
                ];
                let body = self.post("payment_intents", &form, idempotency_key).await?;
                let gateway_ref = body.get("id").and_then(|v| v.as_str()).unwrap_or_default().to_string();
                Ok(GatewayResult::ok(gateway_ref, GatewayStatus::Authorized))
            })
            .await
    }

    async fn capture(&self, gateway_ref: &str, amount: Decimal, idempotency_key: &str) -> Result<GatewayResult> {
        let minor_units = Self::to_minor_units(amount, Currency::USD).to_string();
        self.breaker
            .call_with_retry(self.max_retries, self.base_delay_seconds, self.max_delay_seconds, || async {
                let form = [("amount_to_capture", minor_units.clone())];
                let body = self.post(&format!("payment_intents/{gateway_ref}/capture"), &form, idempotency_key).await?;
                let gateway_ref = body.get("id").and_then(|v| v.as_str()).unwrap_or(gateway_ref).to_string();
                Ok(GatewayResult::ok(gateway_ref, GatewayStatus::Captured))
            })
            .await
    }

    async fn refund(&self, gateway_ref: &str, amount: Decimal, idempotency_key: &str) -> Result<GatewayResult> {
        // capture/refund take no currency parameter; all supported currencies share scale 2.
        let minor_units = Self::to_minor_units(amount, Currency::USD).to_string();
        self.breaker
            .call_with_retry(self.max_retries, self.base_delay_seconds, self.max_delay_seconds, || async {
                let form = [("payment_intent", gateway_ref.to_string()), ("amount", minor_units.clone())];
                let body = self.post("refunds", &form, idempotency_key).await?;
                let status = if body.get("status").and_then(|v| v.as_str()) == Some("succeeded") {
                    GatewayStatus::Refunded
                } else {
                    GatewayStatus::Failed
                };
                Ok(GatewayResult::ok(gateway_ref.to_string(), status))
            })
            .await
    }

    async fn get_status(&self, gateway_ref: &str) -> Result<GatewayResult> {
        self.breaker
            .call_with_retry(self.max_retries, self.base_delay_seconds, self.max_delay_seconds, || async {
                let response = self
                    .client
                    .get(format!("https://api.stripe.com/v1/payment_intents/{gateway_ref}"))
                    .basic_auth(&self.api_key, Option::<&str>::None)
                    .send()
                    .await
                    .map_err(|e| GatewayError::new("api_connection_error", e.to_string()))?;

                if response.status() == reqwest::StatusCode::NOT_FOUND {
                    return Err(GatewayError::new("not_found", "gateway ref not found"));
                }
                let body: serde_json::Value =
                    response.json().await.map_err(|e| GatewayError::new("api_error", e.to_string()))?;
                let status = match body.get("status").and_then(|v| v.as_str()) {
                    Some("requires_capture") => GatewayStatus::Authorized,
                    Some("succeeded") => GatewayStatus::Captured,
                    Some("canceled") => GatewayStatus::Failed,
                    _ => GatewayStatus::Failed,
                };
                Ok(GatewayResult::ok(gateway_ref.to_string(), status))
            })
            .await
    }
}

/// Selects the gateway adapter per `gateway.provider`, falling back to the
/// fake adapter (with a warning) if stripe is selected without an API key.
pub fn create_gateway(settings: &GatewaySettings) -> Box<dyn GatewayPort> {
    if settings.provider == "stripe" && !settings.stripe_api_key.is_empty() {
        return Box::new(ReqwestGateway::new(settings.stripe_api_key.clone(), settings));
    }
    if settings.provider == "stripe" {
        tracing::warn!("gateway.provider is \"stripe\" but no api key is configured, falling back to fake gateway");
    }
    Box::new(FakeGateway::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_gateway_round_trips_authorize_capture_refund() {
        let gateway = FakeGateway::new();
        let auth = gateway.authorize("tenant-a", Decimal::from(100), Currency::USD, "cust-1", "idem-1").await.unwrap();
        assert!(auth.success);
        assert_eq!(auth.status, GatewayStatus::Authorized);

        let captured = gateway.capture(&auth.gateway_ref, Decimal::from(100), "idem-2").await.unwrap();
        assert_eq!(captured.status, GatewayStatus::Captured);

        let refunded = gateway.refund(&auth.gateway_ref, Decimal::from(40), "idem-3").await.unwrap();
        assert_eq!(refunded.status, GatewayStatus::PartiallyRefunded);

        let refunded_fully = gateway.refund(&auth.gateway_ref, Decimal::from(60), "idem-4").await.unwrap();
        assert_eq!(refunded_fully.status, GatewayStatus::Refunded);
    }

    #[tokio::test]
    async fn fake_gateway_unknown_ref_is_not_found() {
        let gateway = FakeGateway::new();
        let result = gateway.get_status("missing").await.unwrap();
        assert_eq!(result.status, GatewayStatus::NotFound);
        assert!(!result.success);
    }

    #[test]
    fn circuit_breaker_opens_after_threshold_and_recovers() {
        let clock = Arc::new(crate::clock::FakeClock::new(Utc::now()));
        let breaker = CircuitBreaker::with_clock(2, Duration::from_millis(20), clock.clone());
        assert!(!breaker.is_open());
        breaker.record_failure();
        assert!(!breaker.is_open());
        breaker.record_failure();
        assert!(breaker.is_open());

        clock.advance(chrono::Duration::milliseconds(30));
        assert!(!breaker.is_open());
    }

    #[test]
    fn circuit_breaker_success_resets_failure_count() {
        let breaker = CircuitBreaker::new(2, Duration::from_secs(30));
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        assert!(!breaker.is_open());
    }

    #[tokio::test]
    async fn call_with_retry_short_circuits_when_open() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(30));
        breaker.record_failure();
        assert!(breaker.is_open());

        let result = breaker
            .call_with_retry(3, 0.01, 0.05, || async { Ok(GatewayResult::ok("ref", GatewayStatus::Authorized)) })
            .await
            .unwrap();
        assert_eq!(result.error_code, "circuit_open");
        assert!(!result.success);
    }

    #[tokio::test]
    async fn call_with_retry_raises_non_retryable_immediately() {
        let breaker = CircuitBreaker::new(5, Duration::from_secs(30));
        let attempts = AsyncMutex::new(0u32);

        let result = breaker
            .call_with_retry(3, 0.01, 0.05, || async {
                *attempts.lock().await += 1;
                Err(GatewayError::new("card_declined", "declined"))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(*attempts.lock().await, 1);
    }

    #[tokio::test]
    async fn call_with_retry_retries_retryable_errors_then_succeeds() {
        let breaker = CircuitBreaker::new(5, Duration::from_secs(30));
        let attempts = AsyncMutex::new(0u32);

        let result = breaker
            .call_with_retry(3, 0.001, 0.01, || async {
                let mut count = attempts.lock().await;
                *count += 1;
                if *count < 3 {
                    Err(GatewayError::new("timeout", "slow"))
                } else {
                    Ok(GatewayResult::ok("ref", GatewayStatus::Authorized))
                }
            })
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(*attempts.lock().await, 3);
    }
}
