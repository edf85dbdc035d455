mod common;

use common::{cleanup_test_data, seed_tenant, setup_test_db};
use payments_ledger_core::models::{Currency, OutboxStatus, PaymentIntentStatus};
use payments_ledger_core::repositories::{LedgerRepository, OutboxRepository};
use payments_ledger_core::services::PaymentIntentService;
use rust_decimal_macros::dec;
use uuid::Uuid;

#[tokio::test]
async fn create_confirm_settle_refund_lifecycle_posts_a_balanced_ledger() {
    let pool = setup_test_db().await;
    cleanup_test_data(&pool).await;
    let tenant_id = format!("tenant-{}", Uuid::new_v4());
    seed_tenant(&pool, &tenant_id).await;

    let service = PaymentIntentService::new(pool.clone());
    let outbox = OutboxRepository::new();
    let ledger = LedgerRepository::new();

    let intent = service
        .create(&tenant_id, dec!(100.00), Currency::USD, "CUST-1")
        .await
        .unwrap();
    assert_eq!(intent.status, PaymentIntentStatus::Created);

    let intent = service.confirm(&tenant_id, intent.id).await.unwrap();
    assert_eq!(intent.status, PaymentIntentStatus::Authorized);

    // confirm is idempotent on a non-CREATED, non-terminal status only via settle;
    // a second confirm while still AUTHORIZED is a conflict.
    let err = service.confirm(&tenant_id, intent.id).await.unwrap_err();
    assert!(matches!(err, payments_ledger_core::error::AppError::Conflict(_)));

    let settled = service
        .post_ledger_for_authorized(&tenant_id, intent.id)
        .await
        .unwrap()
        .expect("authorized intent settles");
    assert_eq!(settled.status, PaymentIntentStatus::Settled);

    // calling again is a no-op: the intent is no longer AUTHORIZED.
    let noop = service.post_ledger_for_authorized(&tenant_id, intent.id).await.unwrap();
    assert!(noop.is_none());

    let entries = ledger
        .find_entries_in_range(&pool, &tenant_id, intent.created_at - chrono::Duration::minutes(1), chrono::Utc::now(), 10)
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    let lines = ledger.find_lines_for_entry(&pool, entries[0].id).await.unwrap();
    assert!(payments_ledger_core::models::ledger::lines_are_balanced(&lines));
    assert_eq!(lines.len(), 2);

    let refund = service
        .refund(&tenant_id, intent.id, dec!(40.00), Some("customer request".to_string()))
        .await
        .unwrap();
    assert_eq!(refund.amount, dec!(40.00));

    let refunded_intent = payments_ledger_core::repositories::PaymentIntentRepository::new()
        .find_by_id_pool(&pool, &tenant_id, intent.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(refunded_intent.status, PaymentIntentStatus::PartiallyRefunded);

    // fully refund the remainder, saturating to REFUNDED.
    service.refund(&tenant_id, intent.id, dec!(60.00), None).await.unwrap();
    let refunded_intent = payments_ledger_core::repositories::PaymentIntentRepository::new()
        .find_by_id_pool(&pool, &tenant_id, intent.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(refunded_intent.status, PaymentIntentStatus::Refunded);

    // over-refunding past the intent amount is rejected with 422.
    let err = service.refund(&tenant_id, intent.id, dec!(1.00), None).await.unwrap_err();
    assert!(matches!(err, payments_ledger_core::error::AppError::Unprocessable(_)));

    let dead = outbox.find_dead(&pool, &tenant_id, 10).await.unwrap();
    assert!(dead.is_empty());

    let pending = sqlx::query_as::<_, (String,)>(
        "SELECT event_type FROM outbox_events WHERE tenant_id = $1 AND status = $2 ORDER BY created_at ASC",
    )
    .bind(&tenant_id)
    .bind(OutboxStatus::Pending)
    .fetch_all(&pool)
    .await
    .unwrap();
    let event_types: Vec<&str> = pending.iter().map(|(t,)| t.as_str()).collect();
    assert_eq!(
        event_types,
        vec![
            "payment.intent.created",
            "payment.authorized",
            "payment.settled",
            "payment.refunded",
            "payment.refunded",
        ]
    );
}

#[tokio::test]
async fn create_rejects_non_positive_amount() {
    let pool = setup_test_db().await;
    cleanup_test_data(&pool).await;
    let tenant_id = format!("tenant-{}", Uuid::new_v4());
    seed_tenant(&pool, &tenant_id).await;

    let service = PaymentIntentService::new(pool.clone());
    let err = service.create(&tenant_id, dec!(0), Currency::USD, "CUST-1").await.unwrap_err();
    assert!(matches!(err, payments_ledger_core::error::AppError::InvalidArgument(_)));
}

#[tokio::test]
async fn refund_before_settlement_is_a_conflict() {
    let pool = setup_test_db().await;
    cleanup_test_data(&pool).await;
    let tenant_id = format!("tenant-{}", Uuid::new_v4());
    seed_tenant(&pool, &tenant_id).await;

    let service = PaymentIntentService::new(pool.clone());
    let intent = service.create(&tenant_id, dec!(20.00), Currency::EUR, "CUST-2").await.unwrap();

    let err = service.refund(&tenant_id, intent.id, dec!(5.00), None).await.unwrap_err();
    assert!(matches!(err, payments_ledger_core::error::AppError::Conflict(_)));
}
