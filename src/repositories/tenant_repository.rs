use crate::error::{AppError, Result};
use crate::models::Tenant;
use sqlx::PgPool;

/// Repository for Tenant rows. Tenants are externally provisioned; this repository
/// only ever upserts in response to inbound tenant events.
pub struct TenantRepository {
    pool: PgPool,
}

impl TenantRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a new tenant, or updates `name`/`plan`/`region` if one already exists
    /// with the same id.
    pub async fn upsert(&self, tenant: &Tenant) -> Result<Tenant> {
        let row = sqlx::query_as::<_, Tenant>(
            r#"
            INSERT INTO tenants (id, name, plan, region, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE
                SET name = EXCLUDED.name, plan = EXCLUDED.plan, region = EXCLUDED.region
            RETURNING id, name, plan, region, created_at
            "#,
        )
        .bind(&tenant.id)
        .bind(&tenant.name)
        .bind(tenant.plan)
        .bind(&tenant.region)
        .bind(tenant.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// All non-deleted tenant ids, for the reconciliation scheduler's per-tenant sweep.
    pub async fn list_active_ids(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"SELECT id FROM tenants WHERE name NOT LIKE '[DELETED] %' ORDER BY id"#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Tenant>> {
        let row = sqlx::query_as::<_, Tenant>(
            r#"SELECT id, name, plan, region, created_at FROM tenants WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Prefixes `name` with `[DELETED] ` without removing the row, so historical
    /// payment intents still resolve a tenant display name.
    pub async fn soft_delete(&self, id: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE tenants
            SET name = '[DELETED] ' || name
            WHERE id = $1 AND name NOT LIKE '[DELETED] %'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(())
    }
}
