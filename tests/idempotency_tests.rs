mod common;

use common::{cleanup_test_data, setup_test_db};
use payments_ledger_core::error::AppError;
use payments_ledger_core::idempotency::{IdempotencyHandler, IdempotencyHandlerConfig};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct Echo {
    value: String,
}

fn redis_client() -> redis::Client {
    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    redis::Client::open(url).unwrap()
}

#[tokio::test]
async fn duplicate_key_with_same_body_returns_cached_response_without_rerunning_work() {
    let pool = setup_test_db().await;
    cleanup_test_data(&pool).await;

    let handler = IdempotencyHandler::new(pool, redis_client(), IdempotencyHandlerConfig { ttl_seconds: 3600 });
    let tenant_id = format!("tenant-{}", Uuid::new_v4());
    let key = format!("key-{}", Uuid::new_v4());
    let request = Echo { value: "hello".into() };
    let request_hash = handler.hash_request(&request);

    let calls = AtomicU32::new(0);

    let first = handler
        .execute(&tenant_id, "create_payment", "payment_intent", &key, &request_hash, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Echo { value: "first-response".into() })
        })
        .await
        .unwrap();

    let second = handler
        .execute(&tenant_id, "create_payment", "payment_intent", &key, &request_hash, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Echo { value: "second-response".into() })
        })
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(first.value, "first-response");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn same_key_with_a_different_body_is_a_conflict() {
    let pool = setup_test_db().await;
    cleanup_test_data(&pool).await;

    let handler = IdempotencyHandler::new(pool, redis_client(), IdempotencyHandlerConfig { ttl_seconds: 3600 });
    let tenant_id = format!("tenant-{}", Uuid::new_v4());
    let key = format!("key-{}", Uuid::new_v4());

    let hash_a = handler.hash_request(&Echo { value: "a".into() });
    handler
        .execute(&tenant_id, "create_payment", "payment_intent", &key, &hash_a, || async { Ok(Echo { value: "ok".into() }) })
        .await
        .unwrap();

    let hash_b = handler.hash_request(&Echo { value: "b".into() });
    let err = handler
        .execute::<Echo, _, _>(&tenant_id, "create_payment", "payment_intent", &key, &hash_b, || async {
            Ok(Echo { value: "ok".into() })
        })
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn a_failed_attempt_allows_retry_under_the_same_key() {
    let pool = setup_test_db().await;
    cleanup_test_data(&pool).await;

    let handler = IdempotencyHandler::new(pool, redis_client(), IdempotencyHandlerConfig { ttl_seconds: 3600 });
    let tenant_id = format!("tenant-{}", Uuid::new_v4());
    let key = format!("key-{}", Uuid::new_v4());
    let request_hash = handler.hash_request(&Echo { value: "x".into() });

    let failed: Result<Echo, AppError> = handler
        .execute(&tenant_id, "create_payment", "payment_intent", &key, &request_hash, || async {
            Err(AppError::InvalidArgument("boom".into()))
        })
        .await;
    assert!(failed.is_err());

    let retried = handler
        .execute(&tenant_id, "create_payment", "payment_intent", &key, &request_hash, || async {
            Ok(Echo { value: "succeeded-on-retry".into() })
        })
        .await
        .unwrap();
    assert_eq!(retried.value, "succeeded-on-retry");
}
