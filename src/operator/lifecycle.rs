use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::tenants::{TenantProvisioning, TenantStatus};

use super::task::{TaskAction, TaskError, TaskHandler, TaskRequest, TaskResponse, TaskResult};
use super::tenant::WORKING_STATE_UNMARSHALLING_FAILED;

pub const WORKING_STATE_TENANT_BLOCKED: &str = "tenant blocked";
pub const WORKING_STATE_TENANT_UNBLOCKED: &str = "tenant unblocked";
pub const WORKING_STATE_TENANT_TERMINATED: &str = "tenant terminated";
pub const WORKING_STATE_TENANT_AUTH_APPLIED: &str = "tenant auth applied";
pub const WORKING_STATE_TENANT_NOT_FOUND: &str = "tenant not found";
pub const WORKING_STATE_STATUS_UPDATE_FAILED: &str = "tenant status update failed";
pub const WORKING_STATE_TERMINATION_FAILED: &str = "tenant termination failed";
pub const WORKING_STATE_APPLY_AUTH_FAILED: &str = "failed to apply tenant auth";

/// Lifecycle changes to a tenant that already went through provisioning.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleAction {
    Block,
    Unblock,
    Terminate,
    ApplyAuth,
}

impl LifecycleAction {
    /// `None` for provisioning, which the [`TenantOperator`](super::TenantOperator) owns.
    pub fn from_task(action: TaskAction) -> Option<Self> {
        match action {
            TaskAction::ProvisionTenant => None,
            TaskAction::BlockTenant => Some(LifecycleAction::Block),
            TaskAction::UnblockTenant => Some(LifecycleAction::Unblock),
            TaskAction::TerminateTenant => Some(LifecycleAction::Terminate),
            TaskAction::ApplyTenantAuth => Some(LifecycleAction::ApplyAuth),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TenantRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct AuthPayload {
    tenant_id: String,
    issuer: String,
}

fn tenant_id_from(data: &[u8]) -> Result<String, String> {
    let payload: TenantRef = serde_json::from_slice(data).map_err(|err| err.to_string())?;
    let id = payload.id.trim();
    if id.is_empty() {
        return Err("tenant id is empty".into());
    }
    Ok(id.to_string())
}

fn auth_from(data: &[u8]) -> Result<(String, Url), String> {
    let payload: AuthPayload = serde_json::from_slice(data).map_err(|err| err.to_string())?;
    let tenant_id = payload.tenant_id.trim();
    if tenant_id.is_empty() {
        return Err("tenant id is empty".into());
    }
    let issuer = Url::parse(payload.issuer.trim()).map_err(|err| format!("invalid issuer: {err}"))?;
    if !matches!(issuer.scheme(), "https" | "http") {
        return Err(format!("issuer scheme `{}` is not http(s)", issuer.scheme()));
    }
    Ok((tenant_id.to_string(), issuer))
}

fn unmarshalling_failed(action: LifecycleAction, reason: &str) -> TaskResponse {
    tracing::error!(?action, reason, "failed to unmarshal tenant data");
    TaskResponse::new(WORKING_STATE_UNMARSHALLING_FAILED, TaskResult::Failed)
}

/// Handles block, unblock, terminate and auth tasks for one [`LifecycleAction`].
///
/// A missing tenant fails block, unblock and auth tasks; termination of a missing tenant is
/// a no-op that completes. Storage errors are retried.
pub struct TenantLifecycleHandler {
    provisioning: Arc<dyn TenantProvisioning>,
    action: LifecycleAction,
}

impl TenantLifecycleHandler {
    pub fn new(provisioning: Arc<dyn TenantProvisioning>, action: LifecycleAction) -> Self {
        Self {
            provisioning,
            action,
        }
    }

    async fn change_status(&self, data: &[u8], status: TenantStatus, done: &str) -> TaskResponse {
        let tenant_id = match tenant_id_from(data) {
            Ok(id) => id,
            Err(reason) => return unmarshalling_failed(self.action, &reason),
        };
        match self.provisioning.set_status(&tenant_id, status).await {
            Ok(true) => {
                tracing::info!(%tenant_id, status = status.as_str(), "tenant status changed");
                TaskResponse::new(done, TaskResult::Done)
            }
            Ok(false) => {
                tracing::warn!(%tenant_id, status = status.as_str(), "status change for unknown tenant");
                TaskResponse::new(WORKING_STATE_TENANT_NOT_FOUND, TaskResult::Failed)
            }
            Err(err) => {
                tracing::error!(?err, %tenant_id, "tenant status update failed");
                TaskResponse::retry_after_error(WORKING_STATE_STATUS_UPDATE_FAILED, &err)
            }
        }
    }

    async fn terminate(&self, data: &[u8]) -> TaskResponse {
        let tenant_id = match tenant_id_from(data) {
            Ok(id) => id,
            Err(reason) => return unmarshalling_failed(self.action, &reason),
        };
        match self.provisioning.terminate(&tenant_id).await {
            Ok(()) => TaskResponse::new(WORKING_STATE_TENANT_TERMINATED, TaskResult::Done),
            Err(err) => {
                tracing::error!(?err, %tenant_id, "tenant termination failed");
                TaskResponse::retry_after_error(WORKING_STATE_TERMINATION_FAILED, &err)
            }
        }
    }

    async fn apply_auth(&self, data: &[u8]) -> TaskResponse {
        let (tenant_id, issuer) = match auth_from(data) {
            Ok(auth) => auth,
            Err(reason) => return unmarshalling_failed(self.action, &reason),
        };
        match self.provisioning.apply_issuer(&tenant_id, issuer.as_str()).await {
            Ok(true) => {
                tracing::info!(%tenant_id, %issuer, "tenant auth applied");
                TaskResponse::new(WORKING_STATE_TENANT_AUTH_APPLIED, TaskResult::Done)
            }
            Ok(false) => TaskResponse::new(WORKING_STATE_TENANT_NOT_FOUND, TaskResult::Failed),
            Err(err) => {
                tracing::error!(?err, %tenant_id, "failed to apply tenant auth");
                TaskResponse::retry_after_error(WORKING_STATE_APPLY_AUTH_FAILED, &err)
            }
        }
    }
}

#[async_trait]
impl TaskHandler for TenantLifecycleHandler {
    async fn handle(&self, request: TaskRequest) -> Result<TaskResponse, TaskError> {
        let response = match self.action {
            LifecycleAction::Block => {
                self.change_status(&request.data, TenantStatus::Blocked, WORKING_STATE_TENANT_BLOCKED)
                    .await
            }
            LifecycleAction::Unblock => {
                self.change_status(&request.data, TenantStatus::Active, WORKING_STATE_TENANT_UNBLOCKED)
                    .await
            }
            LifecycleAction::Terminate => self.terminate(&request.data).await,
            LifecycleAction::ApplyAuth => self.apply_auth(&request.data).await,
        };
        Ok(response)
    }
}
