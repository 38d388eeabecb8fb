use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Seconds before a task that is still progressing gets re-delivered.
pub const RECONCILE_AFTER_SEC_PROCESSING: i64 = 3;
/// Seconds before a task that hit a retryable error gets re-delivered.
pub const RECONCILE_AFTER_SEC_ERROR: i64 = 15;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskAction {
    ProvisionTenant,
    BlockTenant,
    UnblockTenant,
    TerminateTenant,
    ApplyTenantAuth,
}

impl TaskAction {
    pub const ALL: [TaskAction; 5] = [
        TaskAction::ProvisionTenant,
        TaskAction::BlockTenant,
        TaskAction::UnblockTenant,
        TaskAction::TerminateTenant,
        TaskAction::ApplyTenantAuth,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskAction::ProvisionTenant => "PROVISION_TENANT",
            TaskAction::BlockTenant => "BLOCK_TENANT",
            TaskAction::UnblockTenant => "UNBLOCK_TENANT",
            TaskAction::TerminateTenant => "TERMINATE_TENANT",
            TaskAction::ApplyTenantAuth => "APPLY_TENANT_AUTH",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|action| action.as_str() == value)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskResult {
    Processing,
    Done,
    Failed,
}

impl TaskResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskResult::Processing => "PROCESSING",
            TaskResult::Done => "DONE",
            TaskResult::Failed => "FAILED",
        }
    }

    pub fn is_final(&self) -> bool {
        !matches!(self, TaskResult::Processing)
    }
}

#[derive(Clone, Debug)]
pub struct TaskRequest {
    pub data: Vec<u8>,
}

impl TaskRequest {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskResponse {
    pub working_state: String,
    pub result: TaskResult,
    pub reconcile_after_sec: i64,
}

impl TaskResponse {
    pub fn new(working_state: impl Into<String>, result: TaskResult) -> Self {
        Self {
            working_state: working_state.into(),
            result,
            reconcile_after_sec: RECONCILE_AFTER_SEC_PROCESSING,
        }
    }

    /// A retryable failure: the error is folded into the working state and the task is
    /// re-delivered after the longer back-off.
    pub fn retry_after_error(state: &str, err: &dyn std::fmt::Display) -> Self {
        Self {
            working_state: format!("{state}: {err}"),
            result: TaskResult::Processing,
            reconcile_after_sec: RECONCILE_AFTER_SEC_ERROR,
        }
    }
}

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("no handler registered for action {0}")]
    UnknownAction(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Contract between the task queue and the code that performs a task.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, request: TaskRequest) -> Result<TaskResponse, TaskError>;
}
