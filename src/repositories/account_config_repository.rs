use crate::error::{AppError, Result};
use crate::models::AccountConfig;
use sqlx::{PgPool, Postgres, Transaction};

pub struct AccountConfigRepository;

impl AccountConfigRepository {
    pub fn new() -> Self {
        Self
    }

    pub async fn insert_default_set(&self, tx: &mut Transaction<'_, Postgres>, tenant_id: &str) -> Result<()> {
        for account in AccountConfig::default_set(tenant_id) {
            sqlx::query(
                r#"
                INSERT INTO account_configs (id, tenant_id, code, label, account_type)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (tenant_id, code) DO NOTHING
                "#,
            )
            .bind(account.id)
            .bind(&account.tenant_id)
            .bind(&account.code)
            .bind(&account.label)
            .bind(account.account_type)
            .execute(&mut **tx)
            .await
            .map_err(AppError::Database)?;
        }

        Ok(())
    }

    /// Resolves an account code for a tenant, falling back to the literal code if
    /// no `AccountConfig` row exists yet.
    pub async fn resolve_code(&self, pool: &PgPool, tenant_id: &str, code: &str) -> Result<String> {
        let row: Option<(String,)> = sqlx::query_as(
            r#"SELECT code FROM account_configs WHERE tenant_id = $1 AND code = $2"#,
        )
        .bind(tenant_id)
        .bind(code)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row.map(|(c,)| c).unwrap_or_else(|| code.to_string()))
    }

    pub async fn find_all(&self, pool: &PgPool, tenant_id: &str) -> Result<Vec<AccountConfig>> {
        let rows = sqlx::query_as::<_, AccountConfig>(
            r#"SELECT id, tenant_id, code, label, account_type FROM account_configs WHERE tenant_id = $1"#,
        )
        .bind(tenant_id)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }
}

impl Default for AccountConfigRepository {
    fn default() -> Self {
        Self::new()
    }
}
