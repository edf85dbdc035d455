//! Per-tenant fault-injection knobs, promoted from process-wide
//! `chaos_enabled`/`chaos_fail_percent`/`chaos_latency_ms` flags to a
//! per-tenant record reachable through `GET|PUT /admin/chaos`. Stored in
//! Redis as `chaos:<tenant_id>` JSON, mirroring the connection-per-call idiom
//! in `idempotency::storage`.

use redis::AsyncCommands;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChaosSettingsDto {
    pub fail_percent: u8,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChaosConfig {
    pub tenant_id: String,
    pub fail_percent: u8,
    pub latency_ms: u64,
}

impl ChaosConfig {
    pub fn disabled(tenant_id: impl Into<String>) -> Self {
        Self { tenant_id: tenant_id.into(), fail_percent: 0, latency_ms: 0 }
    }

    fn key(tenant_id: &str) -> String {
        format!("chaos:{tenant_id}")
    }
}

/// Small Redis-backed KV store for `ChaosConfig`, used by handlers and by the
/// gateway/webhook call sites that consult fault injection ahead of an
/// external call (never inside a ledger-posting transaction).
pub struct ChaosStore {
    client: redis::Client,
}

impl ChaosStore {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    pub async fn get(&self, tenant_id: &str) -> Result<ChaosConfig> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(AppError::Redis)?;
        let raw: Option<String> = conn.get(ChaosConfig::key(tenant_id)).await.map_err(AppError::Redis)?;
        match raw {
            Some(raw) => {
                let dto: ChaosSettingsDto =
                    serde_json::from_str(&raw).map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;
                Ok(ChaosConfig { tenant_id: tenant_id.to_string(), fail_percent: dto.fail_percent, latency_ms: dto.latency_ms })
            }
            None => Ok(ChaosConfig::disabled(tenant_id)),
        }
    }

    pub async fn set(&self, tenant_id: &str, fail_percent: u8, latency_ms: u64) -> Result<ChaosConfig> {
        let dto = ChaosSettingsDto { fail_percent, latency_ms };
        let body = serde_json::to_string(&dto).map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;

        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(AppError::Redis)?;
        let _: () = conn.set(ChaosConfig::key(tenant_id), body).await.map_err(AppError::Redis)?;

        Ok(ChaosConfig { tenant_id: tenant_id.to_string(), fail_percent, latency_ms })
    }

    /// Consulted by outbound-call sites ahead of a gateway/webhook request.
    /// Returns `Err(AppError::Transient)` when fault injection should fire.
    pub async fn maybe_inject(&self, tenant_id: &str) -> Result<()> {
        let config = self.get(tenant_id).await?;
        if config.latency_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(config.latency_ms)).await;
        }
        if config.fail_percent > 0 {
            use rand::Rng;
            let roll: u8 = rand::thread_rng().gen_range(0..100);
            if roll < config.fail_percent {
                return Err(AppError::Transient("chaos injection".into()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_config_has_zero_percent_and_latency() {
        let config = ChaosConfig::disabled("t1");
        assert_eq!(config.fail_percent, 0);
        assert_eq!(config.latency_ms, 0);
    }

    #[test]
    fn key_is_namespaced_per_tenant() {
        assert_eq!(ChaosConfig::key("t1"), "chaos:t1");
        assert_ne!(ChaosConfig::key("t1"), ChaosConfig::key("t2"));
    }
}
