use std::time::Duration;

use serde::Serialize;
use sqlx::PgPool;
use thiserror::Error;

use super::error::ProvisioningError;
use super::models::{BaselineGroup, Tenant};
use super::scope::begin_tenant_tx;

pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SchemaStatus {
    Exists,
    NotFound,
    CheckFailed,
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GroupsStatus {
    Exist,
    NotFound,
    CheckFailed,
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
pub struct ProbeResult {
    pub schema: SchemaStatus,
    pub groups: GroupsStatus,
}

impl ProbeResult {
    pub fn is_provisioned(&self) -> bool {
        self.schema == SchemaStatus::Exists && self.groups == GroupsStatus::Exist
    }
}

/// A probe that could not complete, together with whatever it had learned.
#[derive(Debug, Error)]
#[error("tenant probe failed: {source}")]
pub struct ProbeFailure {
    pub result: ProbeResult,
    #[source]
    pub source: ProvisioningError,
}

/// Read-only check of how far a tenant's onboarding got.
#[derive(Clone)]
pub struct TenantProbe {
    pool: PgPool,
    timeout: Duration,
}

impl TenantProbe {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            timeout: PROBE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn check(&self, tenant: &Tenant) -> Result<ProbeResult, ProbeFailure> {
        let mut result = ProbeResult {
            schema: SchemaStatus::CheckFailed,
            groups: GroupsStatus::CheckFailed,
        };

        let schema_exists = match self.bounded(self.schema_exists(tenant)).await {
            Ok(exists) => exists,
            Err(source) => return Err(ProbeFailure { result, source }),
        };
        if !schema_exists {
            result.schema = SchemaStatus::NotFound;
            result.groups = GroupsStatus::NotFound;
            return Ok(result);
        }
        result.schema = SchemaStatus::Exists;

        let groups_exist = match self.bounded(self.groups_exist(tenant)).await {
            Ok(exists) => exists,
            Err(source) => return Err(ProbeFailure { result, source }),
        };
        result.groups = if groups_exist {
            GroupsStatus::Exist
        } else {
            GroupsStatus::NotFound
        };
        Ok(result)
    }

    async fn bounded<F>(&self, check: F) -> Result<bool, ProvisioningError>
    where
        F: std::future::Future<Output = Result<bool, ProvisioningError>>,
    {
        tokio::time::timeout(self.timeout, check)
            .await
            .map_err(|_| ProvisioningError::ProbeTimeout)?
    }

    async fn schema_exists(&self, tenant: &Tenant) -> Result<bool, ProvisioningError> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM tenants WHERE schema_name = $1)")
            .bind(&tenant.schema_name)
            .fetch_one(&self.pool)
            .await
            .map_err(ProvisioningError::CheckingTenant)
    }

    // Both baseline groups must be present; each is looked up on its own.
    async fn groups_exist(&self, tenant: &Tenant) -> Result<bool, ProvisioningError> {
        let mut tx = begin_tenant_tx(&self.pool, &tenant.schema_name)
            .await
            .map_err(ProvisioningError::CheckingGroup)?;

        for group in BaselineGroup::ALL {
            let exists = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS (SELECT 1 FROM groups WHERE name = $1)",
            )
            .bind(group.name())
            .fetch_one(&mut *tx)
            .await
            .map_err(ProvisioningError::CheckingGroup)?;
            if !exists {
                return Ok(false);
            }
        }

        tx.commit().await.map_err(ProvisioningError::CheckingGroup)?;
        Ok(true)
    }
}
