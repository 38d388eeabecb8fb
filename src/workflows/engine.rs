use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::tenants::{begin_tenant_tx, Tenant};

use super::error::WorkflowError;
use super::executor::ActionExecutor;
use super::models::{
    ApprovalSummary, ArtifactType, CreateWorkflow, Transition, Vote, Workflow, WorkflowApprover,
    WorkflowConfig, WorkflowDetail, WorkflowFilter, WorkflowState,
};
use super::repository as repo;
use super::state::{self, Actor};

/// Approval workflow state machine over the tenant's `workflows` tables.
#[derive(Clone)]
pub struct WorkflowEngine {
    pool: PgPool,
    executor: Arc<dyn ActionExecutor>,
}

impl WorkflowEngine {
    pub fn new(pool: PgPool, executor: Arc<dyn ActionExecutor>) -> Self {
        Self { pool, executor }
    }

    pub async fn config(&self, tenant: &Tenant) -> Result<WorkflowConfig, WorkflowError> {
        let mut tx = begin_tenant_tx(&self.pool, &tenant.schema_name).await?;
        let config = repo::load_config(&mut tx).await?;
        tx.commit().await?;
        Ok(config)
    }

    pub async fn update_config(
        &self,
        tenant: &Tenant,
        config: &WorkflowConfig,
    ) -> Result<(), WorkflowError> {
        if config.minimum_approvals < 1 {
            return Err(WorkflowError::InvalidRequest(
                "minimum_approvals must be at least 1".into(),
            ));
        }
        let mut tx = begin_tenant_tx(&self.pool, &tenant.schema_name).await?;
        repo::store_config(&mut tx, config).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Opens a workflow in INITIAL on behalf of `initiator_id`, optionally with its first approvers.
    pub async fn create(
        &self,
        tenant: &Tenant,
        initiator_id: &str,
        request: CreateWorkflow,
    ) -> Result<Workflow, WorkflowError> {
        let initiator_id = initiator_id.trim();
        if initiator_id.is_empty() {
            return Err(WorkflowError::InvalidRequest(
                "workflow initiator is required".into(),
            ));
        }
        let approvers = normalize_approvers(initiator_id, &request.approvers)?;

        let mut tx = begin_tenant_tx(&self.pool, &tenant.schema_name).await?;
        let config = repo::load_config(&mut tx).await?;
        let expiry_days = config.expiry_days(request.expiry_days)?;
        // a racing insert that passes this check still trips the active-artifact index
        if repo::has_active_workflow(&mut tx, request.artifact_type.as_str(), request.artifact_id)
            .await?
        {
            return Err(WorkflowError::OngoingWorkflow);
        }

        let now = Utc::now();
        let mut workflow = Workflow {
            id: Uuid::new_v4(),
            state: WorkflowState::Initial,
            action_type: request.action_type,
            artifact_type: request.artifact_type,
            artifact_id: request.artifact_id,
            initiator_id: initiator_id.to_string(),
            parameters: request.parameters,
            failure_reason: None,
            expiry_date: Some(now + Duration::days(i64::from(expiry_days))),
            created_at: now,
            updated_at: now,
            approvers: Vec::new(),
        };
        repo::insert_workflow(&mut tx, &workflow).await?;

        if !approvers.is_empty() {
            let count = repo::insert_approvers(&mut tx, workflow.id, &approvers).await?;
            let next = state::after_approvers_added(workflow.state, count, config.minimum_approvals);
            if next != workflow.state {
                workflow.updated_at = repo::update_state(&mut tx, workflow.id, next).await?;
                workflow.state = next;
            }
        }
        workflow.approvers = repo::fetch_approvers(&mut tx, workflow.id).await?;
        tx.commit().await?;

        tracing::info!(
            tenant_id = %tenant.id,
            workflow_id = %workflow.id,
            action = %workflow.action_type,
            artifact = %workflow.artifact_type,
            state = %workflow.state,
            "workflow created",
        );
        Ok(workflow)
    }

    pub async fn get(&self, tenant: &Tenant, id: Uuid) -> Result<Workflow, WorkflowError> {
        let mut tx = begin_tenant_tx(&self.pool, &tenant.schema_name).await?;
        let mut workflow = repo::fetch_workflow(&mut tx, id, false).await?;
        workflow.approvers = repo::fetch_approvers(&mut tx, id).await?;
        tx.commit().await?;
        Ok(workflow)
    }

    /// The workflow together with what `user_id` may do next and the vote tally.
    pub async fn detail(
        &self,
        tenant: &Tenant,
        id: Uuid,
        user_id: &str,
    ) -> Result<WorkflowDetail, WorkflowError> {
        let mut tx = begin_tenant_tx(&self.pool, &tenant.schema_name).await?;
        let mut workflow = repo::fetch_workflow(&mut tx, id, false).await?;
        workflow.approvers = repo::fetch_approvers(&mut tx, id).await?;
        let config = repo::load_config(&mut tx).await?;
        tx.commit().await?;

        let actor = Actor {
            is_initiator: workflow.initiator_id == user_id,
            is_approver: workflow.approvers.iter().any(|a| a.user_id == user_id),
        };
        Ok(WorkflowDetail {
            available_transitions: state::available_transitions(workflow.state, actor),
            approval_summary: ApprovalSummary::tally(&workflow.approvers, config.minimum_approvals),
            workflow,
        })
    }

    pub async fn list(
        &self,
        tenant: &Tenant,
        filter: &WorkflowFilter,
    ) -> Result<Vec<Workflow>, WorkflowError> {
        let mut tx = begin_tenant_tx(&self.pool, &tenant.schema_name).await?;
        let mut workflows = repo::list_workflows(&mut tx, filter).await?;
        let ids: Vec<Uuid> = workflows.iter().map(|w| w.id).collect();
        let mut approvers: HashMap<Uuid, Vec<WorkflowApprover>> = HashMap::new();
        for (workflow_id, approver) in repo::fetch_approvers_for(&mut tx, &ids).await? {
            approvers.entry(workflow_id).or_default().push(approver);
        }
        tx.commit().await?;

        for workflow in &mut workflows {
            workflow.approvers = approvers.remove(&workflow.id).unwrap_or_default();
        }
        Ok(workflows)
    }

    pub async fn has_ongoing_workflow(
        &self,
        tenant: &Tenant,
        artifact_type: ArtifactType,
        artifact_id: Uuid,
    ) -> Result<bool, WorkflowError> {
        let mut tx = begin_tenant_tx(&self.pool, &tenant.schema_name).await?;
        let ongoing = repo::has_active_workflow(&mut tx, artifact_type.as_str(), artifact_id).await?;
        tx.commit().await?;
        Ok(ongoing)
    }

    /// Applies `transition` as `user_id`. The workflow row stays locked until the new state is
    /// committed, so concurrent votes are counted against each other's writes.
    ///
    /// Confirm commits EXECUTING first and runs the action outside any transaction; the
    /// outcome is recorded afterwards. A workflow whose outcome could not be recorded stays
    /// EXECUTING and cannot be confirmed a second time.
    pub async fn transition(
        &self,
        tenant: &Tenant,
        id: Uuid,
        user_id: &str,
        transition: Transition,
    ) -> Result<Workflow, WorkflowError> {
        let mut tx = begin_tenant_tx(&self.pool, &tenant.schema_name).await?;
        let mut workflow = repo::fetch_workflow(&mut tx, id, true).await?;

        let actor = Actor {
            is_initiator: workflow.initiator_id == user_id,
            is_approver: repo::is_approver(&mut tx, id, user_id).await?,
        };
        state::check_actor(transition, actor, user_id)?;
        state::check_source(transition, workflow.state)?;

        let next = match transition {
            Transition::Approve => {
                repo::record_vote(&mut tx, id, user_id, Vote::Approved).await?;
                let config = repo::load_config(&mut tx).await?;
                let approved = repo::count_votes(&mut tx, id, Vote::Approved).await?;
                state::after_approval(approved, config.minimum_approvals)
            }
            Transition::Reject => {
                repo::record_vote(&mut tx, id, user_id, Vote::Rejected).await?;
                WorkflowState::Rejected
            }
            Transition::Revoke => WorkflowState::Revoked,
            Transition::Confirm => WorkflowState::Executing,
        };

        if next != workflow.state {
            workflow.updated_at = repo::update_state(&mut tx, id, next).await?;
            workflow.state = next;
        }
        workflow.approvers = repo::fetch_approvers(&mut tx, id).await?;
        tx.commit().await?;

        if workflow.state == WorkflowState::Executing {
            workflow = self.run_action(tenant, workflow).await?;
        }

        tracing::info!(
            tenant_id = %tenant.id,
            workflow_id = %id,
            transition = %transition,
            state = %workflow.state,
            "workflow transitioned",
        );
        Ok(workflow)
    }

    /// Runs the action of a committed EXECUTING workflow and stores SUCCESSFUL or FAILED.
    async fn run_action(&self, tenant: &Tenant, workflow: Workflow) -> Result<Workflow, WorkflowError> {
        let id = workflow.id;
        let outcome = self.executor.execute(tenant, &workflow).await;
        if let Err(err) = &outcome {
            tracing::warn!(
                err = %err,
                tenant_id = %tenant.id,
                workflow_id = %id,
                "workflow action failed",
            );
        }
        let failure_reason = outcome.as_ref().err().map(|err| err.to_string());
        let next = state::after_execution(outcome.is_ok());

        let mut tx = begin_tenant_tx(&self.pool, &tenant.schema_name).await?;
        if !repo::finish_execution(&mut tx, id, next, failure_reason.as_deref()).await? {
            tracing::warn!(
                tenant_id = %tenant.id,
                workflow_id = %id,
                outcome = %next,
                "workflow left EXECUTING before its action finished",
            );
        }
        let mut workflow = repo::fetch_workflow(&mut tx, id, false).await?;
        workflow.approvers = repo::fetch_approvers(&mut tx, id).await?;
        tx.commit().await?;
        Ok(workflow)
    }

    pub async fn list_approvers(
        &self,
        tenant: &Tenant,
        id: Uuid,
    ) -> Result<Vec<WorkflowApprover>, WorkflowError> {
        let mut tx = begin_tenant_tx(&self.pool, &tenant.schema_name).await?;
        repo::fetch_workflow(&mut tx, id, false).await?;
        let approvers = repo::fetch_approvers(&mut tx, id).await?;
        tx.commit().await?;
        Ok(approvers)
    }

    /// Adds approvers while the workflow is still collecting them. Reaching the quorum size
    /// moves an INITIAL workflow to WAIT_APPROVAL.
    pub async fn add_approvers(
        &self,
        tenant: &Tenant,
        id: Uuid,
        user_id: &str,
        approvers: &[String],
    ) -> Result<Workflow, WorkflowError> {
        let mut tx = begin_tenant_tx(&self.pool, &tenant.schema_name).await?;
        let mut workflow = repo::fetch_workflow(&mut tx, id, true).await?;

        if workflow.initiator_id != user_id {
            return Err(WorkflowError::forbidden(user_id, "add approvers to"));
        }
        if !state::accepts_new_approvers(workflow.state) {
            return Err(WorkflowError::InvalidRequest(format!(
                "approvers cannot be added to a workflow in state {}",
                workflow.state
            )));
        }
        let approvers = normalize_approvers(&workflow.initiator_id, approvers)?;
        if approvers.is_empty() {
            return Err(WorkflowError::InvalidRequest(
                "at least one approver is required".into(),
            ));
        }

        let config = repo::load_config(&mut tx).await?;
        let count = repo::insert_approvers(&mut tx, id, &approvers).await?;
        let next = state::after_approvers_added(workflow.state, count, config.minimum_approvals);
        if next != workflow.state {
            workflow.updated_at = repo::update_state(&mut tx, id, next).await?;
            workflow.state = next;
        }
        workflow.approvers = repo::fetch_approvers(&mut tx, id).await?;
        tx.commit().await?;

        tracing::info!(
            tenant_id = %tenant.id,
            workflow_id = %id,
            approvers = workflow.approvers.len(),
            state = %workflow.state,
            "workflow approvers updated",
        );
        Ok(workflow)
    }

    /// Expires active workflows past their expiry date.
    pub async fn expire_due(&self, tenant: &Tenant, now: DateTime<Utc>) -> Result<u64, WorkflowError> {
        let mut tx = begin_tenant_tx(&self.pool, &tenant.schema_name).await?;
        let expired = repo::expire_overdue(&mut tx, now).await?;
        tx.commit().await?;
        Ok(expired)
    }

    /// Removes terminal workflows older than the tenant's retention period.
    pub async fn cleanup_terminal(
        &self,
        tenant: &Tenant,
        now: DateTime<Utc>,
    ) -> Result<u64, WorkflowError> {
        let mut tx = begin_tenant_tx(&self.pool, &tenant.schema_name).await?;
        let config = repo::load_config(&mut tx).await?;
        let cutoff = now - Duration::days(i64::from(config.retention_period_days));
        let removed = repo::delete_terminal_before(&mut tx, cutoff).await?;
        tx.commit().await?;
        Ok(removed)
    }
}

/// Trims and de-duplicates approver ids; the initiator may never approve their own workflow.
fn normalize_approvers(initiator_id: &str, approvers: &[String]) -> Result<Vec<String>, WorkflowError> {
    let mut normalized: Vec<String> = Vec::with_capacity(approvers.len());
    for approver in approvers {
        let approver = approver.trim();
        if approver.is_empty() {
            return Err(WorkflowError::InvalidRequest("approver id is empty".into()));
        }
        if approver == initiator_id {
            return Err(WorkflowError::InvalidRequest(
                "the initiator cannot approve their own workflow".into(),
            ));
        }
        if !normalized.iter().any(|existing| existing == approver) {
            normalized.push(approver.to_string());
        }
    }
    Ok(normalized)
}
