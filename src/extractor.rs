use axum::async_trait;
use axum::body::HttpBody;
use axum::extract::{FromRequest, FromRequestParts};
use axum::http::{request::Parts, Request};
use axum::{BoxError, Extension, Json};
use serde::de::DeserializeOwned;
use sqlx::PgPool;

use crate::error::AppError;
use crate::tenants::{get_tenant, Tenant, TenantStatus};
use crate::workflows::WorkflowError;

pub const USER_ID_HEADER: &str = "User-ID";
pub const TENANT_ID_HEADER: &str = "Tenant-ID";

/// Caller identity taken from the `User-ID` header.
pub struct RequestUser {
    pub user_id: String,
}

/// Tenant named by the `Tenant-ID` header, resolved against the tenant registry. Only active
/// tenants are served.
pub struct TenantContext {
    pub tenant: Tenant,
}

/// JSON request body whose rejections use the workflow error body instead of axum's plain text.
pub struct WorkflowJson<T>(pub T);

fn header_value(parts: &Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header_value(parts, USER_ID_HEADER).ok_or(AppError::MissingUserId)?;
        Ok(RequestUser { user_id })
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for TenantContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let tenant_id = header_value(parts, TENANT_ID_HEADER).ok_or(AppError::MissingTenantId)?;
        let Extension(pool) = Extension::<PgPool>::from_request_parts(parts, state)
            .await
            .map_err(|_| AppError::Message("database pool is not configured".into()))?;
        let tenant = get_tenant(&pool, &tenant_id)
            .await?
            .ok_or(AppError::TenantNotFound)?;
        match tenant.status {
            TenantStatus::Active => Ok(TenantContext { tenant }),
            TenantStatus::Blocked => Err(AppError::TenantBlocked),
            TenantStatus::Terminated => Err(AppError::TenantNotFound),
        }
    }
}

#[async_trait]
impl<T, S, B> FromRequest<S, B> for WorkflowJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
    B: HttpBody + Send + 'static,
    B::Data: Send,
    B::Error: Into<BoxError>,
{
    type Rejection = AppError;

    async fn from_request(req: Request<B>, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| WorkflowError::InvalidRequest(rejection.body_text()))?;
        Ok(WorkflowJson(value))
    }
}
