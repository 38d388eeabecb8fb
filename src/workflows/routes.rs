use std::sync::Arc;

use axum::{
    extract::{Path, Query},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::extractor::{RequestUser, TenantContext, WorkflowJson};

use super::engine::WorkflowEngine;
use super::models::{
    AddApproversRequest, CreateWorkflow, TransitionRequest, Workflow, WorkflowApprover,
    WorkflowDetail, WorkflowFilter,
};

pub fn routes() -> Router {
    Router::new()
        .route("/workflows", get(list_workflows).post(create_workflow))
        .route("/workflows/:id", get(get_workflow))
        .route("/workflows/:id/state", post(transition_workflow))
        .route(
            "/workflows/:id/approvers",
            get(list_approvers).post(add_approvers),
        )
}

async fn create_workflow(
    Extension(engine): Extension<Arc<WorkflowEngine>>,
    RequestUser { user_id }: RequestUser,
    TenantContext { tenant }: TenantContext,
    WorkflowJson(request): WorkflowJson<CreateWorkflow>,
) -> AppResult<(StatusCode, Json<Workflow>)> {
    let workflow = engine.create(&tenant, &user_id, request).await?;
    Ok((StatusCode::CREATED, Json(workflow)))
}

async fn list_workflows(
    Extension(engine): Extension<Arc<WorkflowEngine>>,
    _user: RequestUser,
    TenantContext { tenant }: TenantContext,
    Query(filter): Query<WorkflowFilter>,
) -> AppResult<Json<Vec<Workflow>>> {
    Ok(Json(engine.list(&tenant, &filter).await?))
}

async fn get_workflow(
    Extension(engine): Extension<Arc<WorkflowEngine>>,
    RequestUser { user_id }: RequestUser,
    TenantContext { tenant }: TenantContext,
    Path(id): Path<Uuid>,
) -> AppResult<Json<WorkflowDetail>> {
    Ok(Json(engine.detail(&tenant, id, &user_id).await?))
}

async fn transition_workflow(
    Extension(engine): Extension<Arc<WorkflowEngine>>,
    RequestUser { user_id }: RequestUser,
    TenantContext { tenant }: TenantContext,
    Path(id): Path<Uuid>,
    WorkflowJson(request): WorkflowJson<TransitionRequest>,
) -> AppResult<Json<Workflow>> {
    let workflow = engine
        .transition(&tenant, id, &user_id, request.transition)
        .await?;
    Ok(Json(workflow))
}

async fn list_approvers(
    Extension(engine): Extension<Arc<WorkflowEngine>>,
    _user: RequestUser,
    TenantContext { tenant }: TenantContext,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<WorkflowApprover>>> {
    Ok(Json(engine.list_approvers(&tenant, id).await?))
}

async fn add_approvers(
    Extension(engine): Extension<Arc<WorkflowEngine>>,
    RequestUser { user_id }: RequestUser,
    TenantContext { tenant }: TenantContext,
    Path(id): Path<Uuid>,
    WorkflowJson(request): WorkflowJson<AddApproversRequest>,
) -> AppResult<Json<Workflow>> {
    let workflow = engine
        .add_approvers(&tenant, id, &user_id, &request.approvers)
        .await?;
    Ok(Json(workflow))
}
