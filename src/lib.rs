pub mod config;
pub mod error;
pub mod extractor;
pub mod job_queue;
pub mod keys;
pub mod operator;
pub mod providers;
pub mod routes;
pub mod tenants;
pub mod workflows;

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use sqlx::PgPool;

use crate::providers::ProviderRegistry;
use crate::routes::api_routes;
use crate::workflows::{WorkflowEngine, WorkflowGate};

pub async fn root() -> &'static str {
    "CMK Control Plane API"
}

/// HTTP surface with its shared state attached. Metrics are layered on by the binary.
pub fn app(pool: PgPool, engine: Arc<WorkflowEngine>, providers: Arc<ProviderRegistry>) -> Router {
    Router::new()
        .route("/", get(root))
        .merge(api_routes())
        .layer(Extension(WorkflowGate::new(pool.clone())))
        .layer(Extension(engine))
        .layer(Extension(providers))
        .layer(Extension(pool))
}
