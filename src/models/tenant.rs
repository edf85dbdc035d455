use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Subscription plan; governs ABAC policy decisions in the (out-of-scope) RBAC layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Free,
    Pro,
    Enterprise,
}

/// A tenant is externally provisioned and only mutated by inbound tenant events
/// (see `services::inbound_consumer::sync_tenant`), never by the HTTP surface directly.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    pub plan: Plan,
    pub region: String,
    pub created_at: DateTime<Utc>,
}

impl Tenant {
    pub fn new(id: impl Into<String>, name: impl Into<String>, plan: Plan, region: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            plan,
            region: region.into(),
            created_at: Utc::now(),
        }
    }

    pub fn soft_delete(&mut self) {
        if !self.name.starts_with("[DELETED] ") {
            self.name = format!("[DELETED] {}", self.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soft_delete_prefixes_name_once() {
        let mut tenant = Tenant::new("t1", "Acme", Plan::Pro, "region-a");
        tenant.soft_delete();
        assert_eq!(tenant.name, "[DELETED] Acme");
        tenant.soft_delete();
        assert_eq!(tenant.name, "[DELETED] Acme");
    }
}
