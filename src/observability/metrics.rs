use metrics::{counter, gauge, histogram, describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Global metrics instance.
pub static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Metrics collector for the payments ledger core.
#[derive(Debug, Clone)]
pub struct Metrics {
    initialized: bool,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self { initialized: true }
    }

    pub fn record_payment_intent_created(&self, currency: &str) {
        counter!("payment_intents_created_total", "currency" => currency.to_string()).increment(1);
    }

    pub fn record_payment_intent_authorized(&self, currency: &str) {
        counter!("payment_intents_authorized_total", "currency" => currency.to_string()).increment(1);
    }

    pub fn record_payment_intent_captured(&self, currency: &str) {
        counter!("payment_intents_captured_total", "currency" => currency.to_string()).increment(1);
    }

    pub fn record_payment_intent_failed(&self, reason: &str) {
        counter!("payment_intents_failed_total", "reason" => reason.to_string()).increment(1);
    }

    pub fn record_refund_created(&self, currency: &str) {
        counter!("refunds_created_total", "currency" => currency.to_string()).increment(1);
    }

    pub fn record_ledger_write_latency(&self, duration_ms: f64) {
        histogram!("ledger_write_duration_ms").record(duration_ms);
    }

    pub fn record_outbox_events_claimed(&self, count: u64) {
        counter!("outbox_events_claimed_total").increment(count);
    }

    pub fn record_outbox_event_published(&self, event_type: &str) {
        counter!("outbox_events_published_total", "event_type" => event_type.to_string()).increment(1);
    }

    pub fn record_outbox_event_dead(&self, event_type: &str) {
        counter!("outbox_events_dead_total", "event_type" => event_type.to_string()).increment(1);
    }

    pub fn record_outbox_dispatch_latency(&self, duration_ms: f64) {
        histogram!("outbox_dispatch_duration_ms").record(duration_ms);
    }

    pub fn record_webhook_delivery(&self, status: &str) {
        counter!("webhook_deliveries_total", "status" => status.to_string()).increment(1);
    }

    pub fn record_gateway_call(&self, operation: &str, success: bool) {
        counter!("gateway_calls_total", "operation" => operation.to_string(), "success" => success.to_string()).increment(1);
    }

    pub fn record_gateway_circuit_open(&self) {
        counter!("gateway_circuit_open_total").increment(1);
    }

    pub fn record_gateway_retry(&self, operation: &str) {
        counter!("gateway_retries_total", "operation" => operation.to_string()).increment(1);
    }

    pub fn record_reconciliation_run(&self, discrepancy_count: u64) {
        counter!("reconciliation_runs_total").increment(1);
        histogram!("reconciliation_discrepancies_per_run").record(discrepancy_count as f64);
    }

    pub fn record_reconciliation_discrepancy(&self, discrepancy_type: &str) {
        counter!("reconciliation_discrepancies_total", "type" => discrepancy_type.to_string()).increment(1);
    }

    pub fn record_idempotency_hit(&self, outcome: &str) {
        counter!("idempotency_hits_total", "outcome" => outcome.to_string()).increment(1);
    }

    pub fn set_active_tenants(&self, count: i64) {
        gauge!("active_tenants").set(count as f64);
    }

    pub fn set_pending_outbox_events(&self, count: i64) {
        gauge!("pending_outbox_events").set(count as f64);
    }

    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_ms: f64) {
        counter!("http_requests_total", "method" => method.to_string(), "path" => path.to_string(), "status" => status.to_string()).increment(1);
        histogram!("http_request_duration_ms", "method" => method.to_string(), "path" => path.to_string()).record(duration_ms);
    }

    pub fn record_db_query(&self, query_type: &str, duration_ms: f64, success: bool) {
        counter!("db_queries_total", "type" => query_type.to_string(), "success" => success.to_string()).increment(1);
        histogram!("db_query_duration_ms", "type" => query_type.to_string()).record(duration_ms);
    }

    pub fn record_redis_operation(&self, operation: &str, duration_ms: f64, success: bool) {
        counter!("redis_operations_total", "operation" => operation.to_string(), "success" => success.to_string()).increment(1);
        histogram!("redis_operation_duration_ms", "operation" => operation.to_string()).record(duration_ms);
    }

    pub fn record_rate_limit_rejected(&self, bucket: &str) {
        counter!("rate_limit_rejected_total", "bucket" => bucket.to_string()).increment(1);
    }

    pub fn record_kafka_message(&self, topic: &str, success: bool) {
        counter!("kafka_messages_total", "topic" => topic.to_string(), "success" => success.to_string()).increment(1);
    }
}

/// Timer for measuring operation latency.
pub struct LatencyTimer {
    start: Instant,
}

impl LatencyTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for LatencyTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Initializes the metrics system and returns the Prometheus handle.
pub fn init_metrics() -> PrometheusHandle {
    let handle = METRICS_HANDLE.get_or_init(|| {
        let builder = PrometheusBuilder::new();
        let handle = builder
            .install_recorder()
            .expect("Failed to install Prometheus recorder");

        describe_metrics();
        handle
    });

    METRICS.get_or_init(Metrics::new);

    handle.clone()
}

/// Describes all metrics for Prometheus.
fn describe_metrics() {
    describe_counter!("payment_intents_created_total", Unit::Count, "Total number of payment intents created");
    describe_counter!("payment_intents_authorized_total", Unit::Count, "Total number of payment intents authorized");
    describe_counter!("payment_intents_captured_total", Unit::Count, "Total number of payment intents captured");
    describe_counter!("payment_intents_failed_total", Unit::Count, "Total number of failed payment intents");
    describe_counter!("refunds_created_total", Unit::Count, "Total number of refunds created");

    describe_histogram!("ledger_write_duration_ms", Unit::Milliseconds, "Ledger write latency in milliseconds");

    describe_counter!("outbox_events_claimed_total", Unit::Count, "Total number of outbox events claimed for dispatch");
    describe_counter!("outbox_events_published_total", Unit::Count, "Total number of outbox events published to the broker");
    describe_counter!("outbox_events_dead_total", Unit::Count, "Total number of outbox events moved to dead status");
    describe_histogram!("outbox_dispatch_duration_ms", Unit::Milliseconds, "Outbox dispatch cycle latency in milliseconds");

    describe_counter!("webhook_deliveries_total", Unit::Count, "Total number of webhook delivery attempts by status");

    describe_counter!("gateway_calls_total", Unit::Count, "Total number of gateway calls by operation and outcome");
    describe_counter!("gateway_circuit_open_total", Unit::Count, "Total number of gateway calls short-circuited by an open breaker");
    describe_counter!("gateway_retries_total", Unit::Count, "Total number of gateway call retries");

    describe_counter!("reconciliation_runs_total", Unit::Count, "Total number of reconciliation runs");
    describe_histogram!("reconciliation_discrepancies_per_run", Unit::Count, "Number of discrepancies found per reconciliation run");
    describe_counter!("reconciliation_discrepancies_total", Unit::Count, "Total number of reconciliation discrepancies by type");

    describe_counter!("idempotency_hits_total", Unit::Count, "Total number of idempotency key lookups by outcome");

    describe_gauge!("active_tenants", Unit::Count, "Number of active tenants");
    describe_gauge!("pending_outbox_events", Unit::Count, "Number of pending outbox events");

    describe_counter!("http_requests_total", Unit::Count, "Total HTTP requests");
    describe_histogram!("http_request_duration_ms", Unit::Milliseconds, "HTTP request latency in milliseconds");

    describe_counter!("db_queries_total", Unit::Count, "Total database queries");
    describe_histogram!("db_query_duration_ms", Unit::Milliseconds, "Database query latency in milliseconds");

    describe_counter!("redis_operations_total", Unit::Count, "Total Redis operations");
    describe_histogram!("redis_operation_duration_ms", Unit::Milliseconds, "Redis operation latency in milliseconds");

    describe_counter!("rate_limit_rejected_total", Unit::Count, "Total number of requests rejected by the rate limiter");

    describe_counter!("kafka_messages_total", Unit::Count, "Total Kafka messages");
}

/// Returns the global metrics instance.
pub fn get_metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_timer() {
        let timer = LatencyTimer::new();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let elapsed = timer.elapsed_ms();
        assert!(elapsed >= 10.0);
    }

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new();
        assert!(metrics.initialized);
    }
}
