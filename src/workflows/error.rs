use axum::http::StatusCode;
use thiserror::Error;

use super::models::{Transition, WorkflowState};

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("workflow not found")]
    NotFound,
    #[error("{actor} may not {action} this workflow")]
    ForbiddenActor { actor: String, action: &'static str },
    #[error("cannot {transition} a workflow in state {state}")]
    InvalidTransition {
        transition: Transition,
        state: WorkflowState,
    },
    #[error("{0}")]
    InvalidRequest(String),
    #[error("an ongoing workflow already exists for this artifact")]
    OngoingWorkflow,
    #[error("this action requires an approval workflow")]
    WorkflowRequired,
    #[error("stored workflow has unknown {column} `{value}`")]
    CorruptRecord { column: &'static str, value: String },
}

impl WorkflowError {
    pub fn code(&self) -> &'static str {
        match self {
            WorkflowError::Database(_) | WorkflowError::CorruptRecord { .. } => "INTERNAL_ERROR",
            WorkflowError::NotFound => "WORKFLOW_NOT_FOUND",
            WorkflowError::ForbiddenActor { .. } => "FORBIDDEN_ACTOR",
            WorkflowError::InvalidTransition { .. } => "INVALID_TRANSITION",
            WorkflowError::InvalidRequest(_) => "INVALID_WORKFLOW_REQUEST",
            WorkflowError::OngoingWorkflow => "ONGOING_WORKFLOW",
            WorkflowError::WorkflowRequired => "WORKFLOW_REQUIRED",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            WorkflowError::Database(_) | WorkflowError::CorruptRecord { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            WorkflowError::NotFound => StatusCode::NOT_FOUND,
            WorkflowError::ForbiddenActor { .. } | WorkflowError::WorkflowRequired => {
                StatusCode::FORBIDDEN
            }
            WorkflowError::InvalidTransition { .. }
            | WorkflowError::InvalidRequest(_)
            | WorkflowError::OngoingWorkflow => StatusCode::BAD_REQUEST,
        }
    }

    pub(crate) fn forbidden(actor: &str, action: &'static str) -> Self {
        WorkflowError::ForbiddenActor {
            actor: actor.to_string(),
            action,
        }
    }
}
