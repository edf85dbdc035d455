use std::str::FromStr;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::context::{self, RequestContext};
use crate::error::{AppError, Result};
use crate::events::consumer::{ConsumedMessage, MessageHandler};
use crate::events::broker;
use crate::events::types::{self, PAYMENT_AUTHORIZED};
use crate::models::{Currency, OutboxEvent, Plan, Tenant};
use crate::repositories::{AccountConfigRepository, OutboxRepository, PaymentIntentRepository, TenantRepository};
use crate::services::payment_intent_service::PaymentIntentService;

const ROUTING_PAYMENT_AUTHORIZED: &str = "payment.authorized";
const ROUTING_CHARGE_REQUESTED: &str = "payment.charge_requested";
const ROUTING_ORDER_CONFIRMED: &str = "order.confirmed";
const ROUTING_TENANT_CREATED: &str = "tenant.created";
const ROUTING_TENANT_UPDATED: &str = "tenant.updated";
const ROUTING_TENANT_DELETED: &str = "tenant.deleted";

/// Normalized view of a charge/order event, accepting both snake_case and
/// camelCase field names.
#[derive(Debug, Clone)]
struct ChargePayload {
    order_id: String,
    tenant_id: String,
    total_amount: Decimal,
    currency: Currency,
    customer_ref: String,
    correlation_id: String,
}

fn field<'a>(payload: &'a serde_json::Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| payload.get(*k).and_then(|v| v.as_str()))
}

fn parse_charge_payload(payload: &serde_json::Value) -> ChargePayload {
    let order_id = field(payload, &["order_id", "orderId"]).unwrap_or_default().to_string();
    let tenant_id = field(payload, &["tenant_id", "tenantId"]).unwrap_or_default().to_string();
    let total_amount = field(payload, &["total_amount", "totalAmount"])
        .and_then(|s| Decimal::from_str(s).ok())
        .or_else(|| payload.get("total_amount").and_then(|v| v.as_f64()).and_then(Decimal::from_f64_retain))
        .unwrap_or(Decimal::ZERO);
    let currency = field(payload, &["currency"]).and_then(|s| Currency::from_str(s).ok()).unwrap_or(Currency::BRL);
    let customer_ref = field(payload, &["customer_ref", "customerRef"])
        .map(str::to_string)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| if order_id.is_empty() { String::new() } else { format!("order:{order_id}") });
    let correlation_id = field(payload, &["correlation_id", "correlationId"]).unwrap_or_default().to_string();

    ChargePayload { order_id, tenant_id, total_amount, currency, customer_ref, correlation_id }
}

fn parse_plan(s: Option<&str>) -> Plan {
    match s {
        Some("free") => Plan::Free,
        Some("enterprise") => Plan::Enterprise,
        _ => Plan::Pro,
    }
}

/// Dispatches inbound charge/order/tenant events onto the payment-intent and
/// tenant state.
pub struct InboundConsumer {
    pool: PgPool,
    payment_intents: PaymentIntentRepository,
    outbox: OutboxRepository,
    accounts: AccountConfigRepository,
    tenants: TenantRepository,
    payment_intent_service: PaymentIntentService,
}

impl InboundConsumer {
    pub fn new(pool: PgPool) -> Self {
        Self {
            payment_intents: PaymentIntentRepository::new(),
            outbox: OutboxRepository::new(),
            accounts: AccountConfigRepository::new(),
            tenants: TenantRepository::new(pool.clone()),
            payment_intent_service: PaymentIntentService::new(pool.clone()),
            pool,
        }
    }

    /// Dedupes by `(tenant_id, customer_ref = "order:<order_id>")`: a second
    /// delivery of the same order is a no-op.
    async fn handle_charge(&self, payload: ChargePayload) -> Result<()> {
        if payload.tenant_id.is_empty() || payload.customer_ref.is_empty() {
            return Err(AppError::InvalidArgument("charge event missing tenant_id or order_id".into()));
        }

        if let Some(existing) = self.payment_intents.find_by_customer_ref(&payload.tenant_id, &payload.customer_ref, &self.pool).await? {
            tracing::info!(payment_intent_id = %existing.id, customer_ref = %payload.customer_ref, "charge already processed, skipping");
            return Ok(());
        }

        let intent = crate::models::PaymentIntent::new_authorized(
            &payload.tenant_id,
            payload.total_amount,
            payload.currency,
            &payload.customer_ref,
        )?;

        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        let saved = match self.payment_intents.insert(&mut tx, &intent).await {
            Ok(saved) => saved,
            Err(AppError::Conflict(_)) => {
                tracing::info!(customer_ref = %payload.customer_ref, "charge already processed by a concurrent consumer, skipping");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let event_payload = serde_json::to_value(types::PaymentAuthorizedPayload {
            payment_intent_id: saved.id,
            amount: saved.amount,
            currency: saved.currency,
            order_id: saved.order_id().map(str::to_string),
            customer_ref: Some(saved.customer_ref.clone()),
            correlation_id: payload.correlation_id,
        })
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;

        let event = OutboxEvent::new(&payload.tenant_id, PAYMENT_AUTHORIZED, "payment_intent", saved.id.to_string(), event_payload);
        self.outbox.insert(&mut tx, &event).await?;

        tx.commit().await.map_err(AppError::Database)?;
        tracing::info!(payment_intent_id = %saved.id, "payment intent created from charge event");
        Ok(())
    }

    async fn handle_tenant_event(&self, routing_key: &str, payload: &serde_json::Value) -> Result<()> {
        let tenant_id = field(payload, &["tenant_id", "tenantId"]).unwrap_or_default().to_string();
        if tenant_id.is_empty() {
            tracing::warn!(routing_key, "tenant event missing tenant_id");
            return Ok(());
        }

        match routing_key {
            ROUTING_TENANT_CREATED => {
                if self.tenants.find_by_id(&tenant_id).await?.is_some() {
                    tracing::info!(tenant_id, "tenant already exists, skipping");
                    return Ok(());
                }
                let name = field(payload, &["name", "tenantName"]).unwrap_or(&tenant_id).to_string();
                let plan = parse_plan(field(payload, &["plan"]));
                let region = field(payload, &["region"]).unwrap_or("region-a").to_string();
                let tenant = Tenant::new(tenant_id.clone(), name, plan, region);

                let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
                self.tenants.upsert(&tenant).await?;
                self.accounts.insert_default_set(&mut tx, &tenant_id).await?;
                tx.commit().await.map_err(AppError::Database)?;
                tracing::info!(tenant_id, "tenant created from event");
            }
            ROUTING_TENANT_UPDATED => {
                let Some(mut tenant) = self.tenants.find_by_id(&tenant_id).await? else {
                    tracing::warn!(tenant_id, "tenant not found for update");
                    return Ok(());
                };
                if let Some(name) = field(payload, &["name", "tenantName"]) {
                    tenant.name = name.to_string();
                }
                if let Some(plan) = field(payload, &["plan"]) {
                    tenant.plan = parse_plan(Some(plan));
                }
                if let Some(region) = field(payload, &["region"]) {
                    tenant.region = region.to_string();
                }
                self.tenants.upsert(&tenant).await?;
                tracing::info!(tenant_id, "tenant updated from event");
            }
            ROUTING_TENANT_DELETED => {
                self.tenants.soft_delete(&tenant_id).await?;
                tracing::info!(tenant_id, "tenant soft-deleted from event");
            }
            _ => {}
        }

        Ok(())
    }
}

#[async_trait]
impl MessageHandler for InboundConsumer {
    async fn handle(&self, message: &ConsumedMessage) -> Result<()> {
        let payload: serde_json::Value = message
            .deserialize()
            .map_err(|_| AppError::InvalidArgument("inbound message is not valid JSON".into()))?;

        let routing_key = broker::routing_key(message).unwrap_or_default();
        let correlation_id = message
            .header_str(broker::HEADER_CORRELATION_ID)
            .or_else(|| field(&payload, &["correlation_id", "correlationId"]).map(str::to_string))
            .unwrap_or_else(context::new_correlation_id);
        let tenant_id = message
            .header_str(broker::HEADER_TENANT_ID)
            .or_else(|| field(&payload, &["tenant_id", "tenantId"]).map(str::to_string))
            .unwrap_or_default();

        let ctx = RequestContext::new(tenant_id, "worker").with_correlation_id(correlation_id);
        context::scope(ctx, async {
            match routing_key.as_str() {
                ROUTING_PAYMENT_AUTHORIZED => {
                    let id = field(&payload, &["payment_intent_id"])
                        .and_then(|s| Uuid::parse_str(s).ok())
                        .ok_or_else(|| AppError::InvalidArgument("payment.authorized missing payment_intent_id".into()))?;
                    let tenant_id = field(&payload, &["tenant_id", "tenantId"]).unwrap_or_default();
                    self.payment_intent_service.post_ledger_for_authorized(tenant_id, id).await?;
                    Ok(())
                }
                ROUTING_CHARGE_REQUESTED | ROUTING_ORDER_CONFIRMED => {
                    self.handle_charge(parse_charge_payload(&payload)).await
                }
                ROUTING_TENANT_CREATED | ROUTING_TENANT_UPDATED | ROUTING_TENANT_DELETED => {
                    self.handle_tenant_event(&routing_key, &payload).await
                }
                _ => Ok(()),
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_snake_case_charge_payload() {
        let payload = serde_json::json!({
            "order_id": "ord-9",
            "tenant_id": "t1",
            "total_amount": "42.50",
            "currency": "USD",
            "correlation_id": "corr-1",
        });
        let parsed = parse_charge_payload(&payload);
        assert_eq!(parsed.order_id, "ord-9");
        assert_eq!(parsed.customer_ref, "order:ord-9");
        assert_eq!(parsed.total_amount, Decimal::from_str("42.50").unwrap());
    }

    #[test]
    fn parses_camel_case_charge_payload() {
        let payload = serde_json::json!({
            "orderId": "ord-10",
            "tenantId": "t1",
            "totalAmount": "10.00",
            "currency": "BRL",
            "customerRef": "custom-ref",
        });
        let parsed = parse_charge_payload(&payload);
        assert_eq!(parsed.order_id, "ord-10");
        assert_eq!(parsed.customer_ref, "custom-ref");
        assert_eq!(parsed.currency, Currency::BRL);
    }

    #[test]
    fn defaults_currency_to_brl_when_absent() {
        let payload = serde_json::json!({ "order_id": "ord-1", "tenant_id": "t1", "total_amount": "5" });
        assert_eq!(parse_charge_payload(&payload).currency, Currency::BRL);
    }
}
