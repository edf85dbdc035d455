mod common;

use common::{cleanup_test_data, seed_tenant, setup_test_db};
use payments_ledger_core::models::{Currency, DiscrepancyType, OutboxStatus, PaymentIntent, PaymentIntentStatus};
use payments_ledger_core::repositories::PaymentIntentRepository;
use payments_ledger_core::services::{GatewayTransaction, ReconciliationService};
use rust_decimal_macros::dec;
use uuid::Uuid;

async fn seed_settled_intent(pool: &sqlx::PgPool, tenant_id: &str, gateway_ref: &str, amount: rust_decimal::Decimal) -> PaymentIntent {
    let mut intent = PaymentIntent::new(tenant_id, amount, Currency::USD, format!("order:{gateway_ref}")).unwrap();
    intent.status = PaymentIntentStatus::Settled;
    intent.gateway_ref = Some(gateway_ref.to_string());

    let mut tx = pool.begin().await.unwrap();
    let saved = PaymentIntentRepository::new().insert(&mut tx, &intent).await.unwrap();
    tx.commit().await.unwrap();
    saved
}

#[tokio::test]
async fn reconcile_finds_amount_mismatch_missing_local_and_missing_remote() {
    let pool = setup_test_db().await;
    cleanup_test_data(&pool).await;
    let tenant_id = format!("tenant-{}", Uuid::new_v4());
    seed_tenant(&pool, &tenant_id).await;

    seed_settled_intent(&pool, &tenant_id, "pi_A", dec!(10.00)).await;
    seed_settled_intent(&pool, &tenant_id, "pi_C", dec!(5.00)).await;

    let service = ReconciliationService::new(pool.clone());
    let transactions = vec![
        GatewayTransaction { gateway_ref: "pi_A".into(), amount: dec!(12.00), currency: "USD".into(), status: "succeeded".into() },
        GatewayTransaction { gateway_ref: "pi_B".into(), amount: dec!(7.00), currency: "USD".into(), status: "succeeded".into() },
    ];

    let found = service.reconcile(&tenant_id, &transactions).await.unwrap();
    assert_eq!(found.len(), 3);

    let mut types: Vec<DiscrepancyType> = found.iter().map(|d| d.discrepancy_type).collect();
    types.sort_by_key(|t| format!("{t:?}"));
    let mut expected = vec![DiscrepancyType::AmountMismatch, DiscrepancyType::MissingLocal, DiscrepancyType::MissingRemote];
    expected.sort_by_key(|t| format!("{t:?}"));
    assert_eq!(types, expected);

    let amount_mismatch = found.iter().find(|d| d.discrepancy_type == DiscrepancyType::AmountMismatch).unwrap();
    assert_eq!(amount_mismatch.expected_amount, Some(dec!(10.00)));
    assert_eq!(amount_mismatch.actual_amount, Some(dec!(12.00)));

    let missing_local = found.iter().find(|d| d.discrepancy_type == DiscrepancyType::MissingLocal).unwrap();
    assert_eq!(missing_local.gateway_ref.as_deref(), Some("pi_B"));
    assert!(missing_local.payment_intent_id.is_none());

    let missing_remote = found.iter().find(|d| d.discrepancy_type == DiscrepancyType::MissingRemote).unwrap();
    assert_eq!(missing_remote.gateway_ref.as_deref(), Some("pi_C"));

    let event: (serde_json::Value,) = sqlx::query_as(
        "SELECT payload FROM outbox_events WHERE tenant_id = $1 AND event_type = 'reconciliation.discrepancy_found' AND status = $2",
    )
    .bind(&tenant_id)
    .bind(OutboxStatus::Pending)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(event.0["discrepancy_count"], 3);
}

#[tokio::test]
async fn reconcile_is_silent_when_gateway_and_local_state_agree() {
    let pool = setup_test_db().await;
    cleanup_test_data(&pool).await;
    let tenant_id = format!("tenant-{}", Uuid::new_v4());
    seed_tenant(&pool, &tenant_id).await;

    seed_settled_intent(&pool, &tenant_id, "pi_OK", dec!(25.00)).await;

    let service = ReconciliationService::new(pool.clone());
    let transactions = vec![GatewayTransaction {
        gateway_ref: "pi_OK".into(),
        amount: dec!(25.00),
        currency: "USD".into(),
        status: "succeeded".into(),
    }];

    let found = service.reconcile(&tenant_id, &transactions).await.unwrap();
    assert!(found.is_empty());
}
