mod common;

use common::{cleanup_test_data, seed_tenant, setup_test_db};
use payments_ledger_core::models::{OutboxEvent, OutboxStatus};
use payments_ledger_core::repositories::OutboxRepository;
use uuid::Uuid;

async fn insert_event(pool: &sqlx::PgPool, tenant_id: &str, repo: &OutboxRepository) -> Uuid {
    let event = OutboxEvent::new(tenant_id, "payment.authorized", "payment_intent", Uuid::new_v4().to_string(), serde_json::json!({"k": "v"}));
    let mut tx = pool.begin().await.unwrap();
    repo.insert(&mut tx, &event).await.unwrap();
    tx.commit().await.unwrap();
    event.id
}

#[tokio::test]
async fn claim_batch_locks_rows_so_a_second_worker_cannot_claim_them() {
    let pool = setup_test_db().await;
    cleanup_test_data(&pool).await;
    let tenant_id = format!("tenant-{}", Uuid::new_v4());
    seed_tenant(&pool, &tenant_id).await;

    let repo = OutboxRepository::new();
    let id = insert_event(&pool, &tenant_id, &repo).await;

    let claimed = repo.claim_batch(&pool, "worker-1", None).await.unwrap();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].id, id);
    assert_eq!(claimed[0].locked_by.as_deref(), Some("worker-1"));

    let reclaimed = repo.claim_batch(&pool, "worker-2", None).await.unwrap();
    assert!(reclaimed.is_empty());

    repo.mark_sent(&pool, id).await.unwrap();
    let row = repo.find_by_id(&pool, id).await.unwrap().unwrap();
    assert_eq!(row.status, OutboxStatus::Sent);
    assert!(row.locked_by.is_none());
}

#[tokio::test]
async fn mark_failed_reschedules_until_max_attempts_then_dead_letters() {
    let pool = setup_test_db().await;
    cleanup_test_data(&pool).await;
    let tenant_id = format!("tenant-{}", Uuid::new_v4());
    seed_tenant(&pool, &tenant_id).await;

    let repo = OutboxRepository::new();
    let id = insert_event(&pool, &tenant_id, &repo).await;

    repo.mark_failed(&pool, id, 0, Some(2)).await.unwrap();
    let row = repo.find_by_id(&pool, id).await.unwrap().unwrap();
    assert_eq!(row.status, OutboxStatus::Pending);
    assert_eq!(row.attempts, 1);
    assert!(row.available_at > row.created_at);

    repo.mark_failed(&pool, id, 1, Some(2)).await.unwrap();
    let row = repo.find_by_id(&pool, id).await.unwrap().unwrap();
    assert_eq!(row.status, OutboxStatus::Dead);
    assert_eq!(row.attempts, 2);

    let dead = repo.find_dead(&pool, &tenant_id, 10).await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].id, id);
}
