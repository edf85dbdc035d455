use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Per-tenant chart-of-accounts account classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum AccountType {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

/// Default account codes seeded for every new tenant.
pub const DEFAULT_CASH_ACCOUNT: &str = "CASH";
pub const DEFAULT_REVENUE_ACCOUNT: &str = "REVENUE";
pub const DEFAULT_REFUND_EXPENSE_ACCOUNT: &str = "REFUND_EXPENSE";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AccountConfig {
    pub id: uuid::Uuid,
    pub tenant_id: String,
    pub code: String,
    pub label: String,
    pub account_type: AccountType,
}

impl AccountConfig {
    pub fn new(tenant_id: impl Into<String>, code: impl Into<String>, label: impl Into<String>, account_type: AccountType) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            tenant_id: tenant_id.into(),
            code: code.into(),
            label: label.into(),
            account_type,
        }
    }

    /// The three accounts seeded for every new tenant.
    pub fn default_set(tenant_id: &str) -> Vec<AccountConfig> {
        vec![
            AccountConfig::new(tenant_id, DEFAULT_CASH_ACCOUNT, "Cash", AccountType::Asset),
            AccountConfig::new(tenant_id, DEFAULT_REVENUE_ACCOUNT, "Revenue", AccountType::Revenue),
            AccountConfig::new(
                tenant_id,
                DEFAULT_REFUND_EXPENSE_ACCOUNT,
                "Refund Expense",
                AccountType::Expense,
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_set_seeds_cash_revenue_and_refund_expense() {
        let accounts = AccountConfig::default_set("t1");
        let codes: Vec<&str> = accounts.iter().map(|a| a.code.as_str()).collect();
        assert_eq!(codes, vec!["CASH", "REVENUE", "REFUND_EXPENSE"]);
    }
}
