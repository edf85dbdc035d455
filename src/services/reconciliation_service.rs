use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::error;
use uuid::Uuid;

use crate::context;
use crate::error::{AppError, Result};
use crate::events::types::{self, RECONCILIATION_DISCREPANCY_FOUND};
use crate::models::reconciliation::expected_gateway_statuses;
use crate::models::{OutboxEvent, ReconciliationDiscrepancy};
use crate::repositories::{OutboxRepository, PaymentIntentRepository, ReconciliationRepository, TenantRepository};
use crate::services::gateway::{GatewayPort, GatewayStatus};

/// A transaction as reported by the gateway, the input to `reconcile`.
#[derive(Debug, Clone)]
pub struct GatewayTransaction {
    pub gateway_ref: String,
    pub amount: Decimal,
    pub currency: String,
    pub status: String,
}

/// Diffs gateway transactions against local PaymentIntents.
pub struct ReconciliationService {
    pool: PgPool,
    payment_intents: PaymentIntentRepository,
    discrepancies: ReconciliationRepository,
    outbox: OutboxRepository,
}

impl ReconciliationService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            payment_intents: PaymentIntentRepository::new(),
            discrepancies: ReconciliationRepository::new(),
            outbox: OutboxRepository::new(),
        }
    }

    pub async fn reconcile(&self, tenant_id: &str, transactions: &[GatewayTransaction]) -> Result<Vec<ReconciliationDiscrepancy>> {
        let mut found = Vec::new();
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;

        for gtx in transactions {
            let local = self.payment_intents.find_by_gateway_ref(tenant_id, gtx.gateway_ref.as_str(), &self.pool).await?;

            let Some(local) = local else {
                let disc = ReconciliationDiscrepancy::missing_local(
                    tenant_id,
                    gtx.gateway_ref.as_str(),
                    gtx.amount,
                    gtx.status.as_str(),
                    serde_json::json!({ "gateway_transaction": {
                        "gateway_ref": gtx.gateway_ref, "amount": gtx.amount, "currency": gtx.currency, "status": gtx.status,
                    }}),
                );
                self.discrepancies.insert(&mut tx, &disc).await?;
                found.push(disc);
                continue;
            };

            if local.amount != gtx.amount {
                let disc = ReconciliationDiscrepancy::amount_mismatch(
                    tenant_id,
                    local.id,
                    gtx.gateway_ref.as_str(),
                    local.amount,
                    gtx.amount,
                    serde_json::json!({ "local_amount": local.amount.to_string(), "gateway_amount": gtx.amount.to_string() }),
                );
                self.discrepancies.insert(&mut tx, &disc).await?;
                found.push(disc);
            }

            let local_status = serde_json::to_value(local.status).ok().and_then(|v| v.as_str().map(str::to_string)).unwrap_or_default();
            let expected = expected_gateway_statuses(&local_status);
            if !expected.is_empty() && !expected.contains(&gtx.status.as_str()) {
                let disc = ReconciliationDiscrepancy::status_mismatch(
                    tenant_id,
                    local.id,
                    gtx.gateway_ref.as_str(),
                    local_status.clone(),
                    gtx.status.clone(),
                    serde_json::json!({ "expected_gateway_statuses": expected }),
                );
                self.discrepancies.insert(&mut tx, &disc).await?;
                found.push(disc);
            }
        }

        let gw_refs: HashSet<&str> = transactions.iter().map(|g| g.gateway_ref.as_str()).collect();
        let local_with_ref = self.payment_intents.find_with_gateway_ref_for_tenant(tenant_id, &self.pool).await?;
        for local in local_with_ref {
            let Some(gateway_ref) = local.gateway_ref.as_deref() else { continue };
            if gw_refs.contains(gateway_ref) {
                continue;
            }
            let status = serde_json::to_value(local.status).ok().and_then(|v| v.as_str().map(str::to_string)).unwrap_or_default();
            let disc = ReconciliationDiscrepancy::missing_remote(
                tenant_id,
                local.id,
                gateway_ref,
                local.amount,
                status,
                serde_json::json!({ "payment_intent_id": local.id.to_string() }),
            );
            self.discrepancies.insert(&mut tx, &disc).await?;
            found.push(disc);
        }

        if !found.is_empty() {
            let types: Vec<String> = found
                .iter()
                .map(|d| serde_json::to_value(d.discrepancy_type).ok().and_then(|v| v.as_str().map(str::to_string)).unwrap_or_default())
                .collect::<HashSet<_>>()
                .into_iter()
                .collect();

            let payload = serde_json::to_value(types::ReconciliationDiscrepancyFoundPayload {
                tenant_id: tenant_id.to_string(),
                discrepancy_count: found.len(),
                types,
                correlation_id: context::correlation_id(),
            })
            .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;

            let event = OutboxEvent::new(tenant_id, RECONCILIATION_DISCREPANCY_FOUND, "Reconciliation", Uuid::new_v4().to_string(), payload);
            self.outbox.insert(&mut tx, &event).await?;
        }

        tx.commit().await.map_err(AppError::Database)?;
        Ok(found)
    }

    pub async fn list(&self, tenant_id: &str, resolved: Option<bool>, limit: i64) -> Result<Vec<ReconciliationDiscrepancy>> {
        self.discrepancies.list(&self.pool, tenant_id, resolved, limit).await
    }

    pub async fn resolve(&self, tenant_id: &str, id: Uuid) -> Result<ReconciliationDiscrepancy> {
        self.discrepancies
            .resolve(&self.pool, tenant_id, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("discrepancy {id} not found")))
    }
}

fn status_label(status: GatewayStatus) -> String {
    match status {
        GatewayStatus::Authorized => "requires_capture",
        GatewayStatus::Captured => "succeeded",
        GatewayStatus::Failed => "canceled",
        GatewayStatus::Refunded | GatewayStatus::PartiallyRefunded => "refunded",
        GatewayStatus::NotFound => "not_found",
    }
    .to_string()
}

/// Drives `ReconciliationService::reconcile` on a timer, building each batch
/// from the local intents that carry a `gateway_ref` and asking the gateway
/// for their current status. The gateway's `get_status` call doesn't return
/// the charged amount, so this sweep only ever surfaces `MISSING_LOCAL`,
/// `MISSING_REMOTE` and `STATUS_MISMATCH` discrepancies; `AMOUNT_MISMATCH` is
/// exercised only by callers that supply a real transaction export.
pub struct ReconciliationScheduler {
    pool: PgPool,
    tenants: TenantRepository,
    payment_intents: PaymentIntentRepository,
    reconciliation: Arc<ReconciliationService>,
    gateway: Arc<dyn GatewayPort>,
    interval: Duration,
}

impl ReconciliationScheduler {
    pub fn new(
        pool: PgPool,
        reconciliation: Arc<ReconciliationService>,
        gateway: Arc<dyn GatewayPort>,
        interval_minutes: u64,
    ) -> Self {
        Self {
            tenants: TenantRepository::new(pool.clone()),
            payment_intents: PaymentIntentRepository::new(),
            reconciliation,
            gateway,
            interval: Duration::from_secs(interval_minutes.max(1) * 60),
            pool,
        }
    }

    pub async fn run_once(&self) -> Result<usize> {
        let tenant_ids = self.tenants.list_active_ids().await?;
        let mut total = 0;

        for tenant_id in tenant_ids {
            let locals = self.payment_intents.find_with_gateway_ref_for_tenant(&tenant_id, &self.pool).await?;
            let mut transactions = Vec::with_capacity(locals.len());

            for local in &locals {
                let Some(gateway_ref) = local.gateway_ref.as_deref() else { continue };
                let status = self.gateway.get_status(gateway_ref).await?;
                if !status.success {
                    continue;
                }
                transactions.push(GatewayTransaction {
                    gateway_ref: gateway_ref.to_string(),
                    amount: local.amount,
                    currency: local.currency.to_string(),
                    status: status_label(status.status),
                });
            }

            let found = self.reconciliation.reconcile(&tenant_id, &transactions).await?;
            total += found.len();
        }

        Ok(total)
    }

    pub async fn run(self: Arc<Self>, cancellation: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancellation.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {
                    if let Err(e) = self.run_once().await {
                        error!(error = %e, "reconciliation sweep failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_transaction_is_cloneable_for_batched_reconciliation() {
        let gtx = GatewayTransaction { gateway_ref: "gw_1".into(), amount: Decimal::from(10), currency: "USD".into(), status: "succeeded".into() };
        let cloned = gtx.clone();
        assert_eq!(cloned.gateway_ref, gtx.gateway_ref);
    }
}
