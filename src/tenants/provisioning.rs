use sqlx::{Executor, PgPool};

use super::error::{is_unique_violation, ProvisioningError};
use super::models::{BaselineGroup, Group, Tenant};
use super::schema_name::{encode_schema_name, validate_schema_name};
use super::scope::{begin_tenant_tx, quote_identifier, scope_to_schema};

/// Tables every tenant schema carries.
pub const TENANT_SCHEMA_DDL: &str = include_str!("../../sql/tenant_schema.sql");

/// Registers the tenant and creates its schema in one transaction.
///
/// A concurrent registration of the same tenant surfaces as
/// [`ProvisioningError::OnboardingInProgress`]; nothing is left behind on any failure.
pub async fn create_schema(pool: &PgPool, tenant: &Tenant) -> Result<(), ProvisioningError> {
    validate_schema_name(&tenant.schema_name)?;

    let mut tx = pool.begin().await.map_err(ProvisioningError::CreatingTenant)?;

    sqlx::query(
        "INSERT INTO tenants (id, schema_name, domain_url, region, status) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(&tenant.id)
    .bind(&tenant.schema_name)
    .bind(&tenant.domain_url)
    .bind(&tenant.region)
    .bind(tenant.status.as_str())
    .execute(&mut *tx)
    .await
    .map_err(|err| {
        if is_unique_violation(&err) {
            ProvisioningError::OnboardingInProgress(err)
        } else {
            ProvisioningError::CreatingTenant(err)
        }
    })?;

    let create = format!("CREATE SCHEMA {}", quote_identifier(&tenant.schema_name));
    (&mut *tx)
        .execute(create.as_str())
        .await
        .map_err(ProvisioningError::MigratingTenant)?;
    scope_to_schema(&mut tx, &tenant.schema_name)
        .await
        .map_err(ProvisioningError::MigratingTenant)?;
    (&mut *tx)
        .execute(TENANT_SCHEMA_DDL)
        .await
        .map_err(ProvisioningError::MigratingTenant)?;

    tx.commit().await.map_err(ProvisioningError::CreatingTenant)?;
    tracing::info!(tenant_id = %tenant.id, schema = %tenant.schema_name, "tenant schema created");
    Ok(())
}

/// Inserts the administrator and auditor groups, both or neither.
pub async fn create_default_groups(pool: &PgPool, tenant: &Tenant) -> Result<(), ProvisioningError> {
    let groups = BaselineGroup::ALL
        .iter()
        .map(|group| group.for_tenant(&tenant.id).map(|built| (group.name(), built)))
        .collect::<Result<Vec<(&'static str, Group)>, _>>()?;
    validate_schema_name(&tenant.schema_name)?;

    let mut tx = begin_tenant_tx(pool, &tenant.schema_name).await?;

    for (name, group) in &groups {
        sqlx::query(
            "INSERT INTO groups (id, name, description, role, iam_identifier) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(group.id)
        .bind(&group.name)
        .bind(&group.description)
        .bind(group.role.as_str())
        .bind(&group.iam_identifier)
        .execute(&mut *tx)
        .await
        .map_err(|source| {
            if is_unique_violation(&source) {
                ProvisioningError::OnboardingInProgress(source)
            } else {
                ProvisioningError::CreatingGroup {
                    group: *name,
                    source,
                }
            }
        })?;
    }

    tx.commit().await?;
    tracing::info!(tenant_id = %tenant.id, "baseline groups created");
    Ok(())
}

/// Drops the tenant's schema with everything in it and removes its registry row.
/// Terminating a tenant that is already gone succeeds.
pub async fn terminate_tenant(pool: &PgPool, tenant_id: &str) -> Result<(), ProvisioningError> {
    let schema_name = encode_schema_name(tenant_id)?;
    validate_schema_name(&schema_name)?;

    let mut tx = pool.begin().await.map_err(ProvisioningError::TerminatingTenant)?;
    let drop = format!("DROP SCHEMA IF EXISTS {} CASCADE", quote_identifier(&schema_name));
    (&mut *tx)
        .execute(drop.as_str())
        .await
        .map_err(ProvisioningError::TerminatingTenant)?;
    let removed = sqlx::query("DELETE FROM tenants WHERE id = $1")
        .bind(tenant_id)
        .execute(&mut *tx)
        .await
        .map_err(ProvisioningError::TerminatingTenant)?
        .rows_affected();
    tx.commit().await.map_err(ProvisioningError::TerminatingTenant)?;

    tracing::info!(tenant_id, schema = %schema_name, removed, "tenant terminated");
    Ok(())
}
