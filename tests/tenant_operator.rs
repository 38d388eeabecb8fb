use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cmk_control_plane::job_queue::{enqueue_task, process_due_tasks, TaskDispatcher};
use cmk_control_plane::operator::{
    HttpTenantRegistry, TaskAction, TaskError, TaskHandler, TaskRequest, TaskResponse, TaskResult,
    TenantOperator, RECONCILE_AFTER_SEC_PROCESSING, WORKING_STATE_TENANT_CREATED,
    WORKING_STATE_UNMARSHALLING_FAILED,
};
use cmk_control_plane::tenants::{
    create_default_groups, create_schema, encode_schema_name, get_tenant, PgTenantProvisioning,
    Tenant, TenantStatus,
};
use httpmock::prelude::*;
use serde_json::json;
use sqlx::PgPool;
use url::Url;

fn operator(pool: &PgPool, server: &MockServer) -> TenantOperator {
    let registry = HttpTenantRegistry::new(
        Url::parse(&server.base_url()).unwrap(),
        Some("registry-token".into()),
        Duration::from_secs(5),
    )
    .unwrap();
    TenantOperator::new(
        Arc::new(PgTenantProvisioning::new(pool.clone())),
        Arc::new(registry),
    )
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn fresh_tenant_is_provisioned_over_three_deliveries(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/tenants/acme-prod/user-groups")
                .header("authorization", "Bearer registry-token")
                .json_body(json!({
                    "user_groups": [
                        "KMS_TenantAdministrator_acme-prod",
                        "KMS_TenantAuditor_acme-prod"
                    ]
                }));
            then.status(200).json_body(json!({ "success": true }));
        })
        .await;

    let operator = operator(&pool, &server);
    let payload = json!({ "id": "acme-prod", "region": "eu10" }).to_string();

    let first = operator.handle(TaskRequest::new(payload.clone())).await.unwrap();
    assert_eq!(first.result, TaskResult::Processing);
    assert_eq!(first.reconcile_after_sec, RECONCILE_AFTER_SEC_PROCESSING);
    assert!(get_tenant(&pool, "acme-prod").await.unwrap().is_some());

    let second = operator.handle(TaskRequest::new(payload.clone())).await.unwrap();
    assert_eq!(second.result, TaskResult::Processing);
    mock.assert_hits_async(0).await;

    let third = operator.handle(TaskRequest::new(payload)).await.unwrap();
    assert_eq!(third.result, TaskResult::Done);
    assert_eq!(third.working_state, WORKING_STATE_TENANT_CREATED);
    mock.assert_async().await;
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn registry_refusal_keeps_task_processing(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let server = MockServer::start_async().await;
    let refusal = server
        .mock_async(|when, then| {
            when.method(POST).path("/tenants/slow-corp/user-groups");
            then.status(200).json_body(json!({ "success": false }));
        })
        .await;

    let operator = operator(&pool, &server);
    let payload = json!({ "id": "slow-corp", "region": "us20" }).to_string();
    for _ in 0..2 {
        operator.handle(TaskRequest::new(payload.clone())).await.unwrap();
    }

    let response = operator.handle(TaskRequest::new(payload)).await.unwrap();
    assert_eq!(response.result, TaskResult::Processing);
    assert_eq!(response.reconcile_after_sec, RECONCILE_AFTER_SEC_PROCESSING);
    refusal.assert_async().await;
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn tenant_id_unfit_for_group_names_leaves_nothing_behind(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let server = MockServer::start_async().await;
    let operator = operator(&pool, &server);

    let response = operator
        .handle(TaskRequest::new(json!({ "id": "acme/prod", "region": "eu10" }).to_string()))
        .await
        .unwrap();
    assert_eq!(response.result, TaskResult::Failed);
    assert_eq!(response.working_state, WORKING_STATE_UNMARSHALLING_FAILED);

    assert!(get_tenant(&pool, "acme/prod").await.unwrap().is_none());
    let schemas: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM information_schema.schemata WHERE schema_name = $1")
            .bind(encode_schema_name("acme/prod").unwrap())
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(schemas, 0);
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn queued_provision_task_runs_to_completion(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/tenants/queued-co/user-groups");
            then.status(200).json_body(json!({ "success": true }));
        })
        .await;

    let dispatcher = TaskDispatcher::with_tenant_operator(
        Arc::new(operator(&pool, &server)),
        Arc::new(PgTenantProvisioning::new(pool.clone())),
    );
    let task_id = enqueue_task(
        &pool,
        TaskAction::ProvisionTenant,
        json!({ "id": "queued-co", "region": "eu10" }).to_string().as_bytes(),
    )
    .await
    .unwrap();

    for _ in 0..3 {
        // skip the processing delay between deliveries
        sqlx::query("UPDATE tenant_tasks SET reconcile_at = NOW() WHERE id = $1")
            .bind(task_id)
            .execute(&pool)
            .await
            .unwrap();
        assert_eq!(process_due_tasks(&pool, &dispatcher, 10).await.unwrap(), 1);
    }

    let (status, working_state, attempts): (String, Option<String>, i32) = sqlx::query_as(
        "SELECT status, working_state, attempts FROM tenant_tasks WHERE id = $1",
    )
    .bind(task_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(status, "done");
    assert_eq!(working_state.as_deref(), Some(WORKING_STATE_TENANT_CREATED));
    assert_eq!(attempts, 3);

    sqlx::query("UPDATE tenant_tasks SET reconcile_at = NOW() WHERE id = $1")
        .bind(task_id)
        .execute(&pool)
        .await
        .unwrap();
    assert_eq!(process_due_tasks(&pool, &dispatcher, 10).await.unwrap(), 0);
}

async fn run_task(
    pool: &PgPool,
    dispatcher: &TaskDispatcher,
    action: TaskAction,
    data: serde_json::Value,
) -> String {
    let task_id = enqueue_task(pool, action, data.to_string().as_bytes())
        .await
        .unwrap();
    assert_eq!(process_due_tasks(pool, dispatcher, 10).await.unwrap(), 1);
    task_status(pool, task_id).await
}

async fn tenant_status(pool: &PgPool) -> Option<TenantStatus> {
    get_tenant(pool, "lifecycle-co")
        .await
        .unwrap()
        .map(|tenant| tenant.status)
}

async fn task_status(pool: &PgPool, task_id: i64) -> String {
    sqlx::query_scalar("SELECT status FROM tenant_tasks WHERE id = $1")
        .bind(task_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn schema_exists(pool: &PgPool, tenant: &Tenant) -> bool {
    sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM information_schema.schemata WHERE schema_name = $1)")
        .bind(&tenant.schema_name)
        .fetch_one(pool)
        .await
        .unwrap()
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn lifecycle_tasks_change_and_remove_tenants(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let server = MockServer::start_async().await;
    let dispatcher = TaskDispatcher::with_tenant_operator(
        Arc::new(operator(&pool, &server)),
        Arc::new(PgTenantProvisioning::new(pool.clone())),
    );
    let tenant = Tenant::new("lifecycle-co", "eu10").unwrap();
    create_schema(&pool, &tenant).await.unwrap();
    create_default_groups(&pool, &tenant).await.unwrap();
    let by_id = || json!({ "id": "lifecycle-co" });

    assert_eq!(run_task(&pool, &dispatcher, TaskAction::BlockTenant, by_id()).await, "done");
    assert_eq!(tenant_status(&pool).await, Some(TenantStatus::Blocked));
    assert_eq!(run_task(&pool, &dispatcher, TaskAction::UnblockTenant, by_id()).await, "done");
    assert_eq!(tenant_status(&pool).await, Some(TenantStatus::Active));

    let auth = json!({ "tenant_id": "lifecycle-co", "issuer": "https://login.example.com" });
    assert_eq!(run_task(&pool, &dispatcher, TaskAction::ApplyTenantAuth, auth).await, "done");
    let stored = get_tenant(&pool, "lifecycle-co").await.unwrap().unwrap();
    assert_eq!(stored.issuer_url.as_deref(), Some("https://login.example.com/"));

    for _ in 0..2 {
        assert_eq!(run_task(&pool, &dispatcher, TaskAction::TerminateTenant, by_id()).await, "done");
    }
    assert_eq!(tenant_status(&pool).await, None);
    assert!(!schema_exists(&pool, &tenant).await);

    assert_eq!(run_task(&pool, &dispatcher, TaskAction::BlockTenant, by_id()).await, "failed");
}

/// Reports the payload as its working state.
struct EchoState;

#[async_trait]
impl TaskHandler for EchoState {
    async fn handle(&self, request: TaskRequest) -> Result<TaskResponse, TaskError> {
        Ok(TaskResponse::new(
            String::from_utf8_lossy(&request.data).into_owned(),
            TaskResult::Done,
        ))
    }
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn unrecordable_outcome_does_not_stall_the_batch(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let dispatcher = TaskDispatcher::new().register(TaskAction::ProvisionTenant, Arc::new(EchoState));

    // Postgres text cannot hold NUL, so this outcome fails to save
    let stuck = enqueue_task(&pool, TaskAction::ProvisionTenant, b"nul\0state").await.unwrap();
    let fine = enqueue_task(&pool, TaskAction::ProvisionTenant, b"fine").await.unwrap();

    assert_eq!(process_due_tasks(&pool, &dispatcher, 10).await.unwrap(), 2);

    assert_eq!(task_status(&pool, fine).await, "done");
    assert_eq!(task_status(&pool, stuck).await, "queued");
}
