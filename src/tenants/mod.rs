//! Tenant registry rows, per-tenant schemas and baseline groups.

mod error;
mod models;
mod probe;
mod provisioning;
mod repository;
pub mod schema_name;
mod scope;

use async_trait::async_trait;
use sqlx::PgPool;

pub(crate) use error::is_unique_violation;
pub use error::ProvisioningError;
pub use models::{
    baseline_iam_identifiers, build_iam_identifier, BaselineGroup, Group, GroupRole, Tenant,
    TenantStatus,
};
pub use probe::{GroupsStatus, ProbeFailure, ProbeResult, SchemaStatus, TenantProbe};
pub use provisioning::{create_default_groups, create_schema, terminate_tenant, TENANT_SCHEMA_DDL};
pub use repository::{get_tenant, list_tenants, set_tenant_issuer, set_tenant_status};
pub use schema_name::{decode_schema_name, encode_schema_name, validate_schema_name};
pub use scope::{begin_tenant_tx, quote_identifier, scope_to_schema};

/// Storage-side steps the operator drives. The Postgres implementation is [`PgTenantProvisioning`].
#[async_trait]
pub trait TenantProvisioning: Send + Sync {
    async fn check(&self, tenant: &Tenant) -> Result<ProbeResult, ProbeFailure>;

    async fn create_schema(&self, tenant: &Tenant) -> Result<(), ProvisioningError>;

    async fn create_default_groups(&self, tenant: &Tenant) -> Result<(), ProvisioningError>;

    /// Returns false when the tenant is not registered.
    async fn set_status(&self, tenant_id: &str, status: TenantStatus) -> Result<bool, ProvisioningError>;

    /// Returns false when the tenant is not registered.
    async fn apply_issuer(&self, tenant_id: &str, issuer_url: &str) -> Result<bool, ProvisioningError>;

    async fn terminate(&self, tenant_id: &str) -> Result<(), ProvisioningError>;
}

#[derive(Clone)]
pub struct PgTenantProvisioning {
    pool: PgPool,
    probe: TenantProbe,
}

impl PgTenantProvisioning {
    pub fn new(pool: PgPool) -> Self {
        Self {
            probe: TenantProbe::new(pool.clone()),
            pool,
        }
    }
}

#[async_trait]
impl TenantProvisioning for PgTenantProvisioning {
    async fn check(&self, tenant: &Tenant) -> Result<ProbeResult, ProbeFailure> {
        self.probe.check(tenant).await
    }

    async fn create_schema(&self, tenant: &Tenant) -> Result<(), ProvisioningError> {
        provisioning::create_schema(&self.pool, tenant).await
    }

    async fn create_default_groups(&self, tenant: &Tenant) -> Result<(), ProvisioningError> {
        provisioning::create_default_groups(&self.pool, tenant).await
    }

    async fn set_status(&self, tenant_id: &str, status: TenantStatus) -> Result<bool, ProvisioningError> {
        Ok(repository::set_tenant_status(&self.pool, tenant_id, status).await?)
    }

    async fn apply_issuer(&self, tenant_id: &str, issuer_url: &str) -> Result<bool, ProvisioningError> {
        Ok(repository::set_tenant_issuer(&self.pool, tenant_id, issuer_url).await?)
    }

    async fn terminate(&self, tenant_id: &str) -> Result<(), ProvisioningError> {
        provisioning::terminate_tenant(&self.pool, tenant_id).await
    }
}
