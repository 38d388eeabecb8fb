//! Multi-party approval workflows guarding sensitive tenant changes.

mod engine;
mod error;
mod executor;
mod gate;
pub mod maintenance;
mod models;
mod repository;
mod routes;
pub mod state;

pub use engine::WorkflowEngine;
pub use error::WorkflowError;
pub use executor::{ActionExecutor, ExecutionError, ProviderActionExecutor};
pub use gate::WorkflowGate;
pub use models::{
    ActionType, AddApproversRequest, ApprovalSummary, ArtifactType, CreateWorkflow, Transition,
    TransitionRequest, Vote, Workflow, WorkflowApprover, WorkflowConfig, WorkflowDetail,
    WorkflowFilter, WorkflowState, DEFAULT_EXPIRY_PERIOD_DAYS, DEFAULT_MINIMUM_APPROVALS,
    DEFAULT_PAGE_SIZE, DEFAULT_RETENTION_PERIOD_DAYS, MAX_EXPIRY_PERIOD_DAYS,
};
pub use routes::routes;
