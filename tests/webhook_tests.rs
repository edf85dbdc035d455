mod common;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::Router;
use common::{cleanup_test_data, seed_tenant, setup_test_db};
use hmac::{Hmac, Mac};
use payments_ledger_core::config::WebhookSettings;
use payments_ledger_core::models::{DeliveryStatus, WebhookEndpoint};
use payments_ledger_core::repositories::WebhookRepository;
use payments_ledger_core::services::WebhookDispatcher;
use sha2::Sha256;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

#[derive(Default)]
struct Captured {
    body: Option<Vec<u8>>,
    signature: Option<String>,
}

async fn capture_hook(State(state): State<Arc<Mutex<Captured>>>, headers: HeaderMap, body: axum::body::Bytes) -> &'static str {
    let mut captured = state.lock().unwrap();
    captured.body = Some(body.to_vec());
    captured.signature = headers.get("X-Signature").and_then(|v| v.to_str().ok()).map(str::to_string);
    "ok"
}

async fn spawn_capture_server() -> (std::net::SocketAddr, Arc<Mutex<Captured>>) {
    let state = Arc::new(Mutex::new(Captured::default()));
    let app = Router::new().route("/hook", post(capture_hook)).with_state(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    (addr, state)
}

#[tokio::test]
async fn enqueue_then_dispatch_delivers_a_correctly_signed_payload() {
    let pool = setup_test_db().await;
    cleanup_test_data(&pool).await;
    let tenant_id = format!("tenant-{}", Uuid::new_v4());
    seed_tenant(&pool, &tenant_id).await;

    let (addr, captured) = spawn_capture_server().await;

    let webhooks = WebhookRepository::new();
    let endpoint = WebhookEndpoint::new(&tenant_id, format!("http://{addr}/hook"), vec!["payment.settled".to_string()]);
    let endpoint = webhooks.insert_endpoint(&pool, &endpoint).await.unwrap();

    let dispatcher = WebhookDispatcher::new(
        pool.clone(),
        &WebhookSettings { delivery_enabled: true, http_timeout_seconds: 5 },
    );

    let payload = serde_json::json!({"payment_intent_id": "pi_1", "status": "SETTLED"});
    let enqueued = dispatcher.enqueue(&tenant_id, "payment.settled", payload.clone()).await.unwrap();
    assert_eq!(enqueued, 1);

    let claimed = dispatcher.run_once().await.unwrap();
    assert_eq!(claimed, 1);

    tokio::time::sleep(Duration::from_millis(200)).await;

    let deliveries = webhooks.find_failed(&pool, &tenant_id, 10).await.unwrap();
    assert!(deliveries.is_empty(), "delivery should have succeeded, not failed");

    let captured = captured.lock().unwrap();
    let body = captured.body.as_ref().expect("server should have received a request");
    assert_eq!(serde_json::from_slice::<serde_json::Value>(body).unwrap(), payload);

    let mut mac = HmacSha256::new_from_slice(endpoint.secret.as_bytes()).unwrap();
    mac.update(body);
    let expected_signature = hex::encode(mac.finalize().into_bytes());
    assert_eq!(captured.signature.as_deref(), Some(expected_signature.as_str()));
}

#[tokio::test]
async fn enqueue_only_matches_subscribed_or_wildcard_endpoints() {
    let pool = setup_test_db().await;
    cleanup_test_data(&pool).await;
    let tenant_id = format!("tenant-{}", Uuid::new_v4());
    seed_tenant(&pool, &tenant_id).await;

    let webhooks = WebhookRepository::new();
    webhooks
        .insert_endpoint(&pool, &WebhookEndpoint::new(&tenant_id, "https://example.com/a", vec!["payment.refunded".to_string()]))
        .await
        .unwrap();
    webhooks
        .insert_endpoint(&pool, &WebhookEndpoint::new(&tenant_id, "https://example.com/b", vec!["*".to_string()]))
        .await
        .unwrap();

    let dispatcher = WebhookDispatcher::new(pool.clone(), &WebhookSettings { delivery_enabled: false, http_timeout_seconds: 5 });
    let enqueued = dispatcher.enqueue(&tenant_id, "payment.settled", serde_json::json!({})).await.unwrap();

    // only the wildcard endpoint subscribes to payment.settled.
    assert_eq!(enqueued, 1);
}

#[tokio::test]
async fn an_inactive_endpoint_is_marked_failed_without_an_http_attempt() {
    let pool = setup_test_db().await;
    cleanup_test_data(&pool).await;
    let tenant_id = format!("tenant-{}", Uuid::new_v4());
    seed_tenant(&pool, &tenant_id).await;

    let webhooks = WebhookRepository::new();
    let mut endpoint = WebhookEndpoint::new(&tenant_id, "https://example.com/hook", vec!["*".to_string()]);
    let saved = webhooks.insert_endpoint(&pool, &endpoint).await.unwrap();
    endpoint.id = saved.id;

    let dispatcher = WebhookDispatcher::new(pool.clone(), &WebhookSettings { delivery_enabled: true, http_timeout_seconds: 5 });
    dispatcher.enqueue(&tenant_id, "payment.settled", serde_json::json!({})).await.unwrap();

    webhooks.delete_endpoint(&pool, &tenant_id, endpoint.id).await.unwrap();

    dispatcher.run_once().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let failed = webhooks.find_failed(&pool, &tenant_id, 10).await.unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].status, DeliveryStatus::Failed);
}
