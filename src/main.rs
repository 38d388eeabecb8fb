use std::net::SocketAddr;
use std::sync::Arc;

use axum::{routing::get, Router};
use axum_prometheus::PrometheusMetricLayer;
use cmk_control_plane::config::Settings;
use cmk_control_plane::job_queue::{start_worker, TaskDispatcher};
use cmk_control_plane::operator::{HttpTenantRegistry, TenantOperator};
use cmk_control_plane::providers::ProviderRegistry;
use cmk_control_plane::tenants::PgTenantProvisioning;
use cmk_control_plane::workflows::{maintenance, ProviderActionExecutor, WorkflowEngine};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    dotenvy::dotenv().ok();
    let settings = Settings::from_env()?;
    let pool = PgPoolOptions::new()
        .max_connections(settings.database_max_connections)
        .connect(&settings.database_url)
        .await?;

    if let Err(error) = sqlx::migrate!().run(&pool).await {
        if settings.allow_migration_failure {
            tracing::warn!(
                ?error,
                "Database migrations failed but continuing due to ALLOW_MIGRATION_FAILURE"
            );
        } else {
            return Err(Box::new(error) as Box<dyn std::error::Error>);
        }
    }

    // concrete providers register here; without one, confirmed workflows end FAILED
    let providers = Arc::new(ProviderRegistry::new(settings.default_key_provider.clone()));
    if providers.names().is_empty() {
        tracing::warn!("no key providers registered; workflow actions will fail on confirm");
    }

    let engine = Arc::new(WorkflowEngine::new(
        pool.clone(),
        Arc::new(ProviderActionExecutor::new(providers.clone())),
    ));

    let registry = HttpTenantRegistry::new(
        settings.registry.base_url.clone(),
        settings.registry.auth_token.clone(),
        settings.registry.timeout,
    )?;
    let provisioning = Arc::new(PgTenantProvisioning::new(pool.clone()));
    let operator = TenantOperator::new(provisioning.clone(), Arc::new(registry));
    start_worker(
        pool.clone(),
        TaskDispatcher::with_tenant_operator(Arc::new(operator), provisioning),
        settings.tasks.clone(),
    );
    maintenance::spawn(pool.clone(), engine.clone(), settings.maintenance_interval);

    let (prometheus_layer, metrics_handle) = PrometheusMetricLayer::pair();
    let app = Router::new()
        .route(
            "/metrics",
            get(move || async move { metrics_handle.render() }),
        )
        .merge(cmk_control_plane::app(pool, engine, providers))
        .layer(prometheus_layer);

    let addr: SocketAddr = format!("{}:{}", settings.bind_address, settings.bind_port)
        .parse()
        .map_err(|error| Box::new(error) as Box<dyn std::error::Error>)?;
    tracing::info!(%addr, "Listening for incoming connections");
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
