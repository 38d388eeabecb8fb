//! Transition table for approval workflows, free of any storage concerns.

use super::error::WorkflowError;
use super::models::{Transition, WorkflowState};

/// How the caller relates to the workflow it is acting on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Actor {
    pub is_initiator: bool,
    pub is_approver: bool,
}

/// Who may fire a transition. Runs before [`check_source`] so self-dealing is rejected in every state.
pub fn check_actor(transition: Transition, actor: Actor, user_id: &str) -> Result<(), WorkflowError> {
    match transition {
        Transition::Approve | Transition::Reject => {
            if actor.is_initiator || !actor.is_approver {
                return Err(WorkflowError::forbidden(user_id, verb(transition)));
            }
        }
        Transition::Revoke | Transition::Confirm => {
            if !actor.is_initiator {
                return Err(WorkflowError::forbidden(user_id, verb(transition)));
            }
        }
    }
    Ok(())
}

/// States a transition may fire from.
pub fn check_source(transition: Transition, state: WorkflowState) -> Result<(), WorkflowError> {
    let legal = match transition {
        Transition::Approve | Transition::Reject => state == WorkflowState::WaitApproval,
        Transition::Revoke => matches!(state, WorkflowState::Initial | WorkflowState::WaitApproval),
        Transition::Confirm => state == WorkflowState::WaitConfirmation,
    };
    if legal {
        Ok(())
    } else {
        Err(WorkflowError::InvalidTransition { transition, state })
    }
}

/// Where a confirmed workflow lands once its action has run.
pub fn after_execution(succeeded: bool) -> WorkflowState {
    if succeeded {
        WorkflowState::Successful
    } else {
        WorkflowState::Failed
    }
}

/// Target of a vote once the approved count is known.
pub fn after_approval(approved: i64, minimum_approvals: i32) -> WorkflowState {
    if approved >= i64::from(minimum_approvals) {
        WorkflowState::WaitConfirmation
    } else {
        WorkflowState::WaitApproval
    }
}

/// Target of an approver-set change for a workflow still collecting approvers.
pub fn after_approvers_added(state: WorkflowState, approvers: i64, minimum_approvals: i32) -> WorkflowState {
    if state == WorkflowState::Initial && approvers >= i64::from(minimum_approvals) {
        WorkflowState::WaitApproval
    } else {
        state
    }
}

pub fn accepts_new_approvers(state: WorkflowState) -> bool {
    matches!(state, WorkflowState::Initial | WorkflowState::WaitApproval)
}

pub fn available_transitions(state: WorkflowState, actor: Actor) -> Vec<Transition> {
    [
        Transition::Approve,
        Transition::Reject,
        Transition::Revoke,
        Transition::Confirm,
    ]
    .into_iter()
    .filter(|transition| {
        check_actor(*transition, actor, "").is_ok() && check_source(*transition, state).is_ok()
    })
    .collect()
}

fn verb(transition: Transition) -> &'static str {
    match transition {
        Transition::Approve => "approve",
        Transition::Reject => "reject",
        Transition::Revoke => "revoke",
        Transition::Confirm => "confirm",
    }
}
