use axum::Router;

use crate::{keys, workflows};

pub fn api_routes() -> Router {
    Router::new()
        .merge(workflows::routes())
        .merge(keys::routes())
}
