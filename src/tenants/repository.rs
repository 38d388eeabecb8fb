use sqlx::PgPool;

use super::models::{Tenant, TenantRow, TenantStatus};

const TENANT_COLUMNS: &str = "id, schema_name, domain_url, region, status, issuer_url";

pub async fn get_tenant(pool: &PgPool, tenant_id: &str) -> Result<Option<Tenant>, sqlx::Error> {
    let row = sqlx::query_as::<_, TenantRow>(&format!(
        "SELECT {TENANT_COLUMNS} FROM tenants WHERE id = $1"
    ))
    .bind(tenant_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(Tenant::from))
}

pub async fn list_tenants(pool: &PgPool) -> Result<Vec<Tenant>, sqlx::Error> {
    let rows = sqlx::query_as::<_, TenantRow>(&format!(
        "SELECT {TENANT_COLUMNS} FROM tenants ORDER BY created_at"
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(Tenant::from).collect())
}

/// Returns false when the tenant is not registered.
pub async fn set_tenant_status(
    pool: &PgPool,
    tenant_id: &str,
    status: TenantStatus,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE tenants SET status = $2 WHERE id = $1")
        .bind(tenant_id)
        .bind(status.as_str())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() == 1)
}

/// Returns false when the tenant is not registered.
pub async fn set_tenant_issuer(
    pool: &PgPool,
    tenant_id: &str,
    issuer_url: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE tenants SET issuer_url = $2 WHERE id = $1")
        .bind(tenant_id)
        .bind(issuer_url)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() == 1)
}
