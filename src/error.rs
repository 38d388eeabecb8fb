use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::providers::ProviderError;
use crate::workflows::WorkflowError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("missing User-ID header")]
    MissingUserId,
    #[error("missing Tenant-ID header")]
    MissingTenantId,
    #[error("tenant not found")]
    TenantNotFound,
    #[error("tenant is blocked")]
    TenantBlocked,
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("key operation failed: {0:#}")]
    KeyOperation(anyhow::Error),
    #[error("{0}")]
    Message(String),
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Db(_) | AppError::Message(_) => "INTERNAL_ERROR",
            AppError::MissingUserId => "MISSING_USER_ID",
            AppError::MissingTenantId => "MISSING_TENANT_ID",
            AppError::TenantNotFound => "TENANT_NOT_FOUND",
            AppError::TenantBlocked => "TENANT_BLOCKED",
            AppError::Workflow(err) => err.code(),
            AppError::Provider(_) => "PROVIDER_UNAVAILABLE",
            AppError::KeyOperation(_) => "KEY_OPERATION_FAILED",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Db(_) | AppError::Message(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::MissingUserId | AppError::MissingTenantId => StatusCode::BAD_REQUEST,
            AppError::TenantNotFound => StatusCode::NOT_FOUND,
            AppError::TenantBlocked => StatusCode::FORBIDDEN,
            AppError::Workflow(err) => err.status(),
            AppError::Provider(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::KeyOperation(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(?self);
            "internal server error".to_string()
        } else {
            tracing::debug!(code = self.code(), error = %self, "request rejected");
            self.to_string()
        };
        let body = ErrorBody {
            code: self.code(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::{Transition, WorkflowState};

    async fn render(error: AppError) -> (StatusCode, serde_json::Value) {
        let response = error.into_response();
        let status = response.status();
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn guard_violations_render_stable_codes() {
        let (status, body) = render(AppError::MissingUserId).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "MISSING_USER_ID");

        let (status, body) = render(
            WorkflowError::InvalidTransition {
                transition: Transition::Approve,
                state: WorkflowState::Revoked,
            }
            .into(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_TRANSITION");
        assert_eq!(body["message"], "cannot APPROVE a workflow in state REVOKED");

        let (status, body) = render(WorkflowError::WorkflowRequired.into()).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "WORKFLOW_REQUIRED");

        let (status, body) = render(AppError::TenantBlocked).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "TENANT_BLOCKED");
    }

    #[tokio::test]
    async fn internal_errors_hide_details() {
        let (status, body) = render(AppError::Db(sqlx::Error::PoolTimedOut)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["code"], "INTERNAL_ERROR");
        assert_eq!(body["message"], "internal server error");
    }

    #[tokio::test]
    async fn provider_failures_map_to_upstream_statuses() {
        let (status, body) = render(ProviderError::NoDefault.into()).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["code"], "PROVIDER_UNAVAILABLE");

        let (status, _) = render(AppError::KeyOperation(anyhow::anyhow!("hsm offline"))).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }
}
