use std::collections::HashMap;
use std::sync::Arc;

use sqlx::{FromRow, PgPool};
use tokio::time::sleep;

use crate::config::TaskSettings;
use crate::operator::{
    LifecycleAction, TaskAction, TaskError, TaskHandler, TaskRequest, TaskResponse, TaskResult,
    TenantLifecycleHandler, RECONCILE_AFTER_SEC_ERROR,
};
use crate::tenants::TenantProvisioning;

/// How long a claimed task stays invisible to other workers before it can be picked up again.
const CLAIM_LEASE_SECS: i64 = 60;

pub const STATUS_QUEUED: &str = "queued";
pub const STATUS_DONE: &str = "done";
pub const STATUS_FAILED: &str = "failed";

#[derive(Debug, Clone, FromRow)]
pub struct QueuedTask {
    pub id: i64,
    pub action: String,
    pub data: Vec<u8>,
    pub attempts: i32,
}

/// Routes a task to the handler registered for its action.
#[derive(Clone, Default)]
pub struct TaskDispatcher {
    handlers: HashMap<TaskAction, Arc<dyn TaskHandler>>,
}

impl TaskDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, action: TaskAction, handler: Arc<dyn TaskHandler>) -> Self {
        self.handlers.insert(action, handler);
        self
    }

    /// `provision` handles PROVISION_TENANT; every other action gets a lifecycle handler over
    /// `provisioning`.
    pub fn with_tenant_operator(
        provision: Arc<dyn TaskHandler>,
        provisioning: Arc<dyn TenantProvisioning>,
    ) -> Self {
        TaskAction::ALL
            .into_iter()
            .fold(Self::new(), |dispatcher, action| {
                let handler: Arc<dyn TaskHandler> = match LifecycleAction::from_task(action) {
                    Some(lifecycle) => Arc::new(TenantLifecycleHandler::new(
                        provisioning.clone(),
                        lifecycle,
                    )),
                    None => provision.clone(),
                };
                dispatcher.register(action, handler)
            })
    }

    pub async fn dispatch(
        &self,
        action: &str,
        request: TaskRequest,
    ) -> Result<TaskResponse, TaskError> {
        let handler = TaskAction::from_str(action)
            .and_then(|action| self.handlers.get(&action))
            .ok_or_else(|| TaskError::UnknownAction(action.to_string()))?;
        handler.handle(request).await
    }
}

pub async fn enqueue_task(
    pool: &PgPool,
    action: TaskAction,
    data: &[u8],
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("INSERT INTO tenant_tasks (action, data) VALUES ($1, $2) RETURNING id")
        .bind(action.as_str())
        .bind(data)
        .fetch_one(pool)
        .await
}

/// Claims up to `batch_size` due tasks, runs them and records each outcome.
pub async fn process_due_tasks(
    pool: &PgPool,
    dispatcher: &TaskDispatcher,
    batch_size: i64,
) -> Result<usize, sqlx::Error> {
    let tasks = sqlx::query_as::<_, QueuedTask>(
        r#"
        UPDATE tenant_tasks
        SET reconcile_at = NOW() + make_interval(secs => $2),
            attempts = attempts + 1,
            updated_at = NOW()
        WHERE id IN (
            SELECT id FROM tenant_tasks
            WHERE status = 'queued' AND reconcile_at <= NOW()
            ORDER BY reconcile_at
            LIMIT $1
            FOR UPDATE SKIP LOCKED
        )
        RETURNING id, action, data, attempts
        "#,
    )
    .bind(batch_size)
    .bind(CLAIM_LEASE_SECS as f64)
    .fetch_all(pool)
    .await?;

    let claimed = tasks.len();
    for task in tasks {
        let outcome = dispatcher
            .dispatch(&task.action, TaskRequest::new(task.data.clone()))
            .await;
        // the task's lease runs out and it is re-delivered; the rest of the batch still runs
        if let Err(err) = record_outcome(pool, &task, outcome).await {
            tracing::warn!(?err, task_id = task.id, "failed to record task outcome");
        }
    }
    Ok(claimed)
}

async fn record_outcome(
    pool: &PgPool,
    task: &QueuedTask,
    outcome: Result<TaskResponse, TaskError>,
) -> Result<(), sqlx::Error> {
    let response = match outcome {
        Ok(response) => response,
        Err(TaskError::UnknownAction(action)) => {
            tracing::warn!(task_id = task.id, %action, "dropping task with unknown action");
            TaskResponse::new(format!("unknown action {action}"), TaskResult::Failed)
        }
        Err(err) => {
            tracing::warn!(?err, task_id = task.id, attempts = task.attempts, "task handler errored");
            TaskResponse {
                working_state: err.to_string(),
                result: TaskResult::Processing,
                reconcile_after_sec: RECONCILE_AFTER_SEC_ERROR,
            }
        }
    };

    let status = match response.result {
        TaskResult::Processing => STATUS_QUEUED,
        TaskResult::Done => STATUS_DONE,
        TaskResult::Failed => STATUS_FAILED,
    };

    sqlx::query(
        r#"
        UPDATE tenant_tasks
        SET status = $2,
            working_state = $3,
            reconcile_at = NOW() + make_interval(secs => $4),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(task.id)
    .bind(status)
    .bind(&response.working_state)
    .bind(response.reconcile_after_sec as f64)
    .execute(pool)
    .await?;

    tracing::info!(
        task_id = task.id,
        action = %task.action,
        result = response.result.as_str(),
        working_state = %response.working_state,
        "task handled",
    );
    Ok(())
}

pub fn start_worker(pool: PgPool, dispatcher: TaskDispatcher, settings: TaskSettings) {
    tokio::spawn(async move {
        loop {
            match process_due_tasks(&pool, &dispatcher, settings.batch_size).await {
                // a full batch means more work may be waiting
                Ok(claimed) if claimed as i64 >= settings.batch_size => continue,
                Ok(_) => {}
                Err(err) => tracing::warn!(?err, "tenant task poll failed"),
            }
            sleep(settings.poll_interval).await;
        }
    });
}
