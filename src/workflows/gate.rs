use sqlx::PgPool;

use crate::tenants::{begin_tenant_tx, Tenant};

use super::error::WorkflowError;
use super::repository as repo;

/// Answers whether a tenant routes sensitive changes through approval workflows.
#[derive(Clone)]
pub struct WorkflowGate {
    pool: PgPool,
}

impl WorkflowGate {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn is_workflow_enabled(&self, tenant: &Tenant) -> Result<bool, WorkflowError> {
        let mut tx = begin_tenant_tx(&self.pool, &tenant.schema_name).await?;
        let config = repo::load_config(&mut tx).await?;
        tx.commit().await?;
        Ok(config.enabled)
    }

    /// Fails with [`WorkflowError::WorkflowRequired`] when the tenant has workflows enabled.
    pub async fn ensure_direct_mutation_allowed(&self, tenant: &Tenant) -> Result<(), WorkflowError> {
        if self.is_workflow_enabled(tenant).await? {
            tracing::info!(tenant_id = %tenant.id, "direct mutation refused, workflow required");
            return Err(WorkflowError::WorkflowRequired);
        }
        Ok(())
    }
}
