use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::tenants::{
    baseline_iam_identifiers, BaselineGroup, GroupsStatus, ProvisioningError, SchemaStatus,
    Tenant, TenantProvisioning,
};
use crate::tenants::schema_name::SchemaNameError;

use super::registry::TenantRegistry;
use super::task::{TaskError, TaskHandler, TaskRequest, TaskResponse, TaskResult};

pub const WORKING_STATE_TENANT_CREATING: &str = "tenant is being created";
pub const WORKING_STATE_TENANT_CREATED: &str = "tenant created successfully";
pub const WORKING_STATE_UNMARSHALLING_FAILED: &str = "failed to unmarshal tenant data";
pub const WORKING_STATE_SCHEMA_CREATION_FAILED: &str = "schema creation failed";
pub const WORKING_STATE_GROUPS_CREATION_FAILED: &str = "group creation failed";
pub const WORKING_STATE_SENDING_GROUPS_FAILED: &str = "failed to send groups to registry";

/// Provisioning task payload.
#[derive(Debug, Deserialize)]
struct TenantPayload {
    id: String,
    #[serde(default)]
    region: String,
}

#[derive(Debug, Error)]
enum PayloadError {
    #[error("malformed tenant payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("schema encoding failed: {0}")]
    SchemaName(#[from] SchemaNameError),
    #[error("tenant id cannot name its groups: {0}")]
    Group(#[from] ProvisioningError),
}

// Everything derived from the tenant id is checked here, before any step has side effects.
fn tenant_from_payload(data: &[u8]) -> Result<Tenant, PayloadError> {
    let payload: TenantPayload = serde_json::from_slice(data)?;
    let tenant = Tenant::new(payload.id, payload.region)?;
    for group in BaselineGroup::ALL {
        group.for_tenant(&tenant.id)?;
    }
    Ok(tenant)
}

/// Drives a tenant from "unknown" to "provisioned and announced" across repeated deliveries
/// of the same provisioning task. Holds no state between invocations.
pub struct TenantOperator {
    provisioning: Arc<dyn TenantProvisioning>,
    registry: Arc<dyn TenantRegistry>,
}

impl TenantOperator {
    pub fn new(provisioning: Arc<dyn TenantProvisioning>, registry: Arc<dyn TenantRegistry>) -> Self {
        Self {
            provisioning,
            registry,
        }
    }

    async fn finalize(&self, tenant: &Tenant) -> TaskResponse {
        let groups = baseline_iam_identifiers(&tenant.id);
        match self.registry.set_tenant_user_groups(&tenant.id, &groups).await {
            Ok(true) => {
                tracing::info!(tenant_id = %tenant.id, "tenant provisioning finalized");
                TaskResponse::new(WORKING_STATE_TENANT_CREATED, TaskResult::Done)
            }
            Ok(false) => {
                tracing::debug!(tenant_id = %tenant.id, "registry declined user groups");
                TaskResponse::new(WORKING_STATE_SENDING_GROUPS_FAILED, TaskResult::Processing)
            }
            Err(err) => {
                tracing::error!(?err, tenant_id = %tenant.id, "failed to send groups to registry");
                TaskResponse::retry_after_error(WORKING_STATE_SENDING_GROUPS_FAILED, &err)
            }
        }
    }
}

// A concurrent actor already owns this step; the next delivery sees its outcome.
fn tolerate_in_progress(result: Result<(), ProvisioningError>, tenant: &Tenant) -> Result<(), ProvisioningError> {
    match result {
        Err(err) if err.is_onboarding_in_progress() => {
            tracing::info!(tenant_id = %tenant.id, "onboarding in progress, returning early");
            Ok(())
        }
        other => other,
    }
}

#[async_trait]
impl TaskHandler for TenantOperator {
    async fn handle(&self, request: TaskRequest) -> Result<TaskResponse, TaskError> {
        let tenant = match tenant_from_payload(&request.data) {
            Ok(tenant) => tenant,
            Err(err) => {
                tracing::error!(?err, "failed to unmarshal tenant data");
                return Ok(TaskResponse::new(
                    WORKING_STATE_UNMARSHALLING_FAILED,
                    TaskResult::Failed,
                ));
            }
        };

        let probe = match self.provisioning.check(&tenant).await {
            Ok(probe) => probe,
            Err(failure) => {
                tracing::error!(
                    err = %failure,
                    tenant_id = %tenant.id,
                    schema = ?failure.result.schema,
                    "tenant probe failed",
                );
                return Ok(TaskResponse::retry_after_error(
                    WORKING_STATE_TENANT_CREATING,
                    &failure,
                ));
            }
        };

        if probe.is_provisioned() {
            return Ok(self.finalize(&tenant).await);
        }

        // Groups are only attempted once a probe has seen the schema, so each delivery
        // advances at most one step.
        if probe.schema != SchemaStatus::Exists {
            let created = self.provisioning.create_schema(&tenant).await;
            if let Err(err) = tolerate_in_progress(created, &tenant) {
                tracing::error!(?err, tenant_id = %tenant.id, "schema creation failed");
                return Ok(TaskResponse::retry_after_error(
                    WORKING_STATE_SCHEMA_CREATION_FAILED,
                    &err,
                ));
            }
        } else if probe.groups != GroupsStatus::Exist {
            let created = self.provisioning.create_default_groups(&tenant).await;
            if let Err(err) = tolerate_in_progress(created, &tenant) {
                tracing::error!(?err, tenant_id = %tenant.id, "group creation failed");
                return Ok(TaskResponse::retry_after_error(
                    WORKING_STATE_GROUPS_CREATION_FAILED,
                    &err,
                ));
            }
        }

        Ok(TaskResponse::new(
            WORKING_STATE_TENANT_CREATING,
            TaskResult::Processing,
        ))
    }
}
