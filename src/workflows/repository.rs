use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::tenants::is_unique_violation;

use super::error::WorkflowError;
use super::models::{
    Vote, Workflow, WorkflowApprover, WorkflowApproverRow, WorkflowConfig, WorkflowFilter,
    WorkflowRow, WorkflowState, DEFAULT_PAGE_SIZE,
};

const WORKFLOW_COLUMNS: &str = "id, state, action_type, artifact_type, artifact_id, initiator_id, \
     parameters, failure_reason, expiry_date, created_at, updated_at";

// All functions expect a connection already scoped to the tenant schema.

pub(crate) async fn load_config(conn: &mut PgConnection) -> Result<WorkflowConfig, sqlx::Error> {
    let config = sqlx::query_as::<_, WorkflowConfig>(
        r#"
        SELECT enabled, minimum_approvals, retention_period_days,
               default_expiry_period_days, max_expiry_period_days
        FROM workflow_config
        WHERE id = 1
        "#,
    )
    .fetch_optional(conn)
    .await?;
    Ok(config.unwrap_or_default())
}

pub(crate) async fn store_config(
    conn: &mut PgConnection,
    config: &WorkflowConfig,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO workflow_config (
            id, enabled, minimum_approvals, retention_period_days,
            default_expiry_period_days, max_expiry_period_days
        ) VALUES (1, $1, $2, $3, $4, $5)
        ON CONFLICT (id) DO UPDATE SET
            enabled = EXCLUDED.enabled,
            minimum_approvals = EXCLUDED.minimum_approvals,
            retention_period_days = EXCLUDED.retention_period_days,
            default_expiry_period_days = EXCLUDED.default_expiry_period_days,
            max_expiry_period_days = EXCLUDED.max_expiry_period_days
        "#,
    )
    .bind(config.enabled)
    .bind(config.minimum_approvals)
    .bind(config.retention_period_days)
    .bind(config.default_expiry_period_days)
    .bind(config.max_expiry_period_days)
    .execute(conn)
    .await?;
    Ok(())
}

/// Inserts a new workflow. A concurrent active workflow on the same artifact trips
/// `workflows_active_artifact_key` and surfaces as [`WorkflowError::OngoingWorkflow`].
pub(crate) async fn insert_workflow(
    conn: &mut PgConnection,
    workflow: &Workflow,
) -> Result<(), WorkflowError> {
    sqlx::query(
        r#"
        INSERT INTO workflows (
            id, state, action_type, artifact_type, artifact_id, initiator_id,
            parameters, failure_reason, expiry_date, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(workflow.id)
    .bind(workflow.state.as_str())
    .bind(workflow.action_type.as_str())
    .bind(workflow.artifact_type.as_str())
    .bind(workflow.artifact_id)
    .bind(&workflow.initiator_id)
    .bind(&workflow.parameters)
    .bind(workflow.failure_reason.as_deref())
    .bind(workflow.expiry_date)
    .bind(workflow.created_at)
    .bind(workflow.updated_at)
    .execute(conn)
    .await
    .map_err(|err| {
        if is_unique_violation(&err) {
            WorkflowError::OngoingWorkflow
        } else {
            WorkflowError::Database(err)
        }
    })?;
    Ok(())
}

pub(crate) async fn fetch_workflow(
    conn: &mut PgConnection,
    id: Uuid,
    for_update: bool,
) -> Result<Workflow, WorkflowError> {
    let mut sql = format!("SELECT {WORKFLOW_COLUMNS} FROM workflows WHERE id = $1");
    if for_update {
        sql.push_str(" FOR UPDATE");
    }
    let row = sqlx::query_as::<_, WorkflowRow>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or(WorkflowError::NotFound)?;
    Workflow::try_from(row)
}

pub(crate) async fn list_workflows(
    conn: &mut PgConnection,
    filter: &WorkflowFilter,
) -> Result<Vec<Workflow>, WorkflowError> {
    let mut builder: QueryBuilder<Postgres> =
        QueryBuilder::new(format!("SELECT {WORKFLOW_COLUMNS} FROM workflows WHERE TRUE"));

    if let Some(state) = filter.state {
        builder.push(" AND state = ");
        builder.push_bind(state.as_str());
    }
    if let Some(artifact_type) = filter.artifact_type {
        builder.push(" AND artifact_type = ");
        builder.push_bind(artifact_type.as_str());
    }
    if let Some(artifact_id) = filter.artifact_id {
        builder.push(" AND artifact_id = ");
        builder.push_bind(artifact_id);
    }
    if let Some(action_type) = filter.action_type {
        builder.push(" AND action_type = ");
        builder.push_bind(action_type.as_str());
    }

    builder.push(" ORDER BY created_at DESC, id LIMIT ");
    builder.push_bind(filter.top.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, 1000));
    builder.push(" OFFSET ");
    builder.push_bind(filter.skip.unwrap_or(0).max(0));

    let rows = builder
        .build_query_as::<WorkflowRow>()
        .fetch_all(conn)
        .await?;
    rows.into_iter().map(Workflow::try_from).collect()
}

pub(crate) async fn update_state(
    conn: &mut PgConnection,
    id: Uuid,
    state: WorkflowState,
) -> Result<DateTime<Utc>, sqlx::Error> {
    sqlx::query_scalar::<_, DateTime<Utc>>(
        r#"
        UPDATE workflows
        SET state = $2, updated_at = NOW()
        WHERE id = $1
        RETURNING updated_at
        "#,
    )
    .bind(id)
    .bind(state.as_str())
    .fetch_one(conn)
    .await
}

/// Records the outcome of an action. Only a workflow still in EXECUTING is touched; returns
/// false when something else (expiry) moved it first.
pub(crate) async fn finish_execution(
    conn: &mut PgConnection,
    id: Uuid,
    state: WorkflowState,
    failure_reason: Option<&str>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE workflows
        SET state = $2, failure_reason = $3, updated_at = NOW()
        WHERE id = $1 AND state = $4
        "#,
    )
    .bind(id)
    .bind(state.as_str())
    .bind(failure_reason)
    .bind(WorkflowState::Executing.as_str())
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub(crate) async fn fetch_approvers(
    conn: &mut PgConnection,
    workflow_id: Uuid,
) -> Result<Vec<WorkflowApprover>, WorkflowError> {
    let rows = sqlx::query_as::<_, WorkflowApproverRow>(
        r#"
        SELECT workflow_id, user_id, vote, updated_at
        FROM workflow_approvers
        WHERE workflow_id = $1
        ORDER BY user_id
        "#,
    )
    .bind(workflow_id)
    .fetch_all(conn)
    .await?;
    rows.into_iter().map(WorkflowApprover::try_from).collect()
}

/// Approvers of several workflows in one round trip, keyed by workflow id.
pub(crate) async fn fetch_approvers_for(
    conn: &mut PgConnection,
    workflow_ids: &[Uuid],
) -> Result<Vec<(Uuid, WorkflowApprover)>, WorkflowError> {
    let rows = sqlx::query_as::<_, WorkflowApproverRow>(
        r#"
        SELECT workflow_id, user_id, vote, updated_at
        FROM workflow_approvers
        WHERE workflow_id = ANY($1)
        ORDER BY user_id
        "#,
    )
    .bind(workflow_ids)
    .fetch_all(conn)
    .await?;
    rows.into_iter()
        .map(|row| {
            let workflow_id = row.workflow_id;
            WorkflowApprover::try_from(row).map(|approver| (workflow_id, approver))
        })
        .collect()
}

pub(crate) async fn is_approver(
    conn: &mut PgConnection,
    workflow_id: Uuid,
    user_id: &str,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM workflow_approvers WHERE workflow_id = $1 AND user_id = $2)",
    )
    .bind(workflow_id)
    .bind(user_id)
    .fetch_one(conn)
    .await
}

/// Adds approvers, skipping ones already present. Returns the new approver count.
pub(crate) async fn insert_approvers(
    conn: &mut PgConnection,
    workflow_id: Uuid,
    user_ids: &[String],
) -> Result<i64, sqlx::Error> {
    for user_id in user_ids {
        sqlx::query(
            r#"
            INSERT INTO workflow_approvers (workflow_id, user_id, vote)
            VALUES ($1, $2, $3)
            ON CONFLICT (workflow_id, user_id) DO NOTHING
            "#,
        )
        .bind(workflow_id)
        .bind(user_id)
        .bind(Vote::NotVoted.as_str())
        .execute(&mut *conn)
        .await?;
    }

    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM workflow_approvers WHERE workflow_id = $1")
        .bind(workflow_id)
        .fetch_one(conn)
        .await
}

/// Records one approver's vote; other approvers' rows are untouched.
pub(crate) async fn record_vote(
    conn: &mut PgConnection,
    workflow_id: Uuid,
    user_id: &str,
    vote: Vote,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE workflow_approvers
        SET vote = $3, updated_at = NOW()
        WHERE workflow_id = $1 AND user_id = $2
        "#,
    )
    .bind(workflow_id)
    .bind(user_id)
    .bind(vote.as_str())
    .execute(conn)
    .await?;
    Ok(())
}

pub(crate) async fn count_votes(
    conn: &mut PgConnection,
    workflow_id: Uuid,
    vote: Vote,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM workflow_approvers WHERE workflow_id = $1 AND vote = $2",
    )
    .bind(workflow_id)
    .bind(vote.as_str())
    .fetch_one(conn)
    .await
}

pub(crate) async fn has_active_workflow(
    conn: &mut PgConnection,
    artifact_type: &str,
    artifact_id: Uuid,
) -> Result<bool, sqlx::Error> {
    let active: Vec<&str> = WorkflowState::ACTIVE.iter().map(|s| s.as_str()).collect();
    sqlx::query_scalar::<_, bool>(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM workflows
            WHERE artifact_type = $1 AND artifact_id = $2 AND state = ANY($3)
        )
        "#,
    )
    .bind(artifact_type)
    .bind(artifact_id)
    .bind(&active)
    .fetch_one(conn)
    .await
}

/// Moves every active workflow whose expiry date has passed to EXPIRED.
pub(crate) async fn expire_overdue(
    conn: &mut PgConnection,
    now: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let active: Vec<&str> = WorkflowState::ACTIVE.iter().map(|s| s.as_str()).collect();
    let result = sqlx::query(
        r#"
        UPDATE workflows
        SET state = $1, updated_at = NOW()
        WHERE state = ANY($2) AND expiry_date IS NOT NULL AND expiry_date <= $3
        "#,
    )
    .bind(WorkflowState::Expired.as_str())
    .bind(&active)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

/// Deletes terminal workflows last touched before `cutoff`; approvers cascade.
pub(crate) async fn delete_terminal_before(
    conn: &mut PgConnection,
    cutoff: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let active: Vec<&str> = WorkflowState::ACTIVE.iter().map(|s| s.as_str()).collect();
    let result = sqlx::query("DELETE FROM workflows WHERE NOT (state = ANY($1)) AND updated_at < $2")
        .bind(&active)
        .bind(cutoff)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}
