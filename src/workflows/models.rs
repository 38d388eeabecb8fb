use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::error::WorkflowError;

pub const DEFAULT_MINIMUM_APPROVALS: i32 = 2;
pub const DEFAULT_RETENTION_PERIOD_DAYS: i32 = 30;
pub const DEFAULT_EXPIRY_PERIOD_DAYS: i32 = 7;
pub const MAX_EXPIRY_PERIOD_DAYS: i32 = 30;
pub const DEFAULT_PAGE_SIZE: i64 = 100;

macro_rules! string_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }

            pub fn from_str(value: &str) -> Option<Self> {
                match value {
                    $($text => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_enum!(WorkflowState {
    Initial => "INITIAL",
    WaitApproval => "WAIT_APPROVAL",
    WaitConfirmation => "WAIT_CONFIRMATION",
    Executing => "EXECUTING",
    Successful => "SUCCESSFUL",
    Failed => "FAILED",
    Rejected => "REJECTED",
    Revoked => "REVOKED",
    Expired => "EXPIRED",
});

impl WorkflowState {
    pub const ACTIVE: [WorkflowState; 4] = [
        WorkflowState::Initial,
        WorkflowState::WaitApproval,
        WorkflowState::WaitConfirmation,
        WorkflowState::Executing,
    ];

    pub fn is_terminal(&self) -> bool {
        !Self::ACTIVE.contains(self)
    }
}

string_enum!(Transition {
    Approve => "APPROVE",
    Reject => "REJECT",
    Revoke => "REVOKE",
    Confirm => "CONFIRM",
});

string_enum!(ArtifactType {
    Key => "KEY",
    KeyConfiguration => "KEY_CONFIGURATION",
    System => "SYSTEM",
});

string_enum!(ActionType {
    UpdateState => "UPDATE_STATE",
    UpdatePrimaryKey => "UPDATE_PRIMARY_KEY",
    Link => "LINK",
    Unlink => "UNLINK",
    Switch => "SWITCH",
    Delete => "DELETE",
});

string_enum!(Vote {
    NotVoted => "NOT_VOTED",
    Approved => "APPROVED",
    Rejected => "REJECTED",
});

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct WorkflowApprover {
    pub user_id: String,
    pub vote: Vote,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
pub(crate) struct WorkflowApproverRow {
    pub workflow_id: Uuid,
    pub user_id: String,
    pub vote: String,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<WorkflowApproverRow> for WorkflowApprover {
    type Error = WorkflowError;

    fn try_from(row: WorkflowApproverRow) -> Result<Self, Self::Error> {
        Ok(Self {
            vote: parse_column("vote", &row.vote, Vote::from_str)?,
            user_id: row.user_id,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Workflow {
    pub id: Uuid,
    pub state: WorkflowState,
    pub action_type: ActionType,
    pub artifact_type: ArtifactType,
    pub artifact_id: Uuid,
    pub initiator_id: String,
    pub parameters: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub approvers: Vec<WorkflowApprover>,
}

#[derive(Debug, FromRow)]
pub(crate) struct WorkflowRow {
    pub id: Uuid,
    pub state: String,
    pub action_type: String,
    pub artifact_type: String,
    pub artifact_id: Uuid,
    pub initiator_id: String,
    pub parameters: String,
    pub failure_reason: Option<String>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<WorkflowRow> for Workflow {
    type Error = WorkflowError;

    fn try_from(row: WorkflowRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            state: parse_column("state", &row.state, WorkflowState::from_str)?,
            action_type: parse_column("action_type", &row.action_type, ActionType::from_str)?,
            artifact_type: parse_column(
                "artifact_type",
                &row.artifact_type,
                ArtifactType::from_str,
            )?,
            artifact_id: row.artifact_id,
            initiator_id: row.initiator_id,
            parameters: row.parameters,
            failure_reason: row.failure_reason,
            expiry_date: row.expiry_date,
            created_at: row.created_at,
            updated_at: row.updated_at,
            approvers: Vec::new(),
        })
    }
}

fn parse_column<T>(
    column: &'static str,
    value: &str,
    parse: fn(&str) -> Option<T>,
) -> Result<T, WorkflowError> {
    parse(value).ok_or_else(|| WorkflowError::CorruptRecord {
        column,
        value: value.to_string(),
    })
}

/// Per-tenant approval policy. A tenant without a stored row gets the defaults, disabled.
#[derive(Clone, Debug, Serialize, PartialEq, Eq, FromRow)]
pub struct WorkflowConfig {
    pub enabled: bool,
    pub minimum_approvals: i32,
    pub retention_period_days: i32,
    pub default_expiry_period_days: i32,
    pub max_expiry_period_days: i32,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            minimum_approvals: DEFAULT_MINIMUM_APPROVALS,
            retention_period_days: DEFAULT_RETENTION_PERIOD_DAYS,
            default_expiry_period_days: DEFAULT_EXPIRY_PERIOD_DAYS,
            max_expiry_period_days: MAX_EXPIRY_PERIOD_DAYS,
        }
    }
}

impl WorkflowConfig {
    /// Resolves the lifetime of a new workflow in days.
    pub fn expiry_days(&self, requested: Option<i32>) -> Result<i32, WorkflowError> {
        match requested {
            None => Ok(self.default_expiry_period_days),
            Some(days) if days >= 1 && days <= self.max_expiry_period_days => Ok(days),
            Some(days) => Err(WorkflowError::InvalidRequest(format!(
                "expiry_days must be between 1 and {}, got {days}",
                self.max_expiry_period_days
            ))),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct CreateWorkflow {
    pub action_type: ActionType,
    pub artifact_type: ArtifactType,
    pub artifact_id: Uuid,
    #[serde(default)]
    pub parameters: String,
    #[serde(default)]
    pub approvers: Vec<String>,
    #[serde(default)]
    pub expiry_days: Option<i32>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TransitionRequest {
    pub transition: Transition,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AddApproversRequest {
    pub approvers: Vec<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct WorkflowFilter {
    pub state: Option<WorkflowState>,
    pub artifact_type: Option<ArtifactType>,
    pub artifact_id: Option<Uuid>,
    pub action_type: Option<ActionType>,
    pub skip: Option<i64>,
    pub top: Option<i64>,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct ApprovalSummary {
    pub approved: usize,
    pub rejected: usize,
    pub pending: usize,
    pub required: i32,
}

impl ApprovalSummary {
    pub fn tally(approvers: &[WorkflowApprover], required: i32) -> Self {
        let count = |vote: Vote| approvers.iter().filter(|a| a.vote == vote).count();
        Self {
            approved: count(Vote::Approved),
            rejected: count(Vote::Rejected),
            pending: count(Vote::NotVoted),
            required,
        }
    }
}

/// A workflow as seen by one caller.
#[derive(Clone, Debug, Serialize)]
pub struct WorkflowDetail {
    #[serde(flatten)]
    pub workflow: Workflow,
    pub available_transitions: Vec<Transition>,
    pub approval_summary: ApprovalSummary,
}
