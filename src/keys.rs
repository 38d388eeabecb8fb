//! Direct key mutations, allowed only for tenants that do not require approval workflows.

use std::sync::Arc;

use axum::{extract::Path, http::StatusCode, routing::delete, Extension, Router};
use tracing::info;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::extractor::{RequestUser, TenantContext};
use crate::providers::ProviderRegistry;
use crate::workflows::WorkflowGate;

pub fn routes() -> Router {
    Router::new().route("/keys/:id", delete(delete_key))
}

async fn delete_key(
    Extension(gate): Extension<WorkflowGate>,
    Extension(providers): Extension<Arc<ProviderRegistry>>,
    RequestUser { user_id }: RequestUser,
    TenantContext { tenant }: TenantContext,
    Path(key_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    gate.ensure_direct_mutation_allowed(&tenant).await?;

    let provider = providers.default_provider()?;
    provider
        .key_operations()?
        .delete_key(&tenant.id, key_id)
        .await
        .map_err(AppError::KeyOperation)?;

    info!(
        tenant_id = %tenant.id,
        %key_id,
        user_id = %user_id,
        provider = provider.name(),
        "key deleted"
    );
    Ok(StatusCode::NO_CONTENT)
}
