//! Task handlers that reconcile tenant lifecycle requests.

mod lifecycle;
mod registry;
mod task;
mod tenant;

pub use lifecycle::{
    LifecycleAction, TenantLifecycleHandler, WORKING_STATE_APPLY_AUTH_FAILED,
    WORKING_STATE_STATUS_UPDATE_FAILED, WORKING_STATE_TENANT_AUTH_APPLIED,
    WORKING_STATE_TENANT_BLOCKED, WORKING_STATE_TENANT_NOT_FOUND,
    WORKING_STATE_TENANT_TERMINATED, WORKING_STATE_TENANT_UNBLOCKED,
    WORKING_STATE_TERMINATION_FAILED,
};
pub use registry::{HttpTenantRegistry, TenantRegistry};
pub use task::{
    TaskAction, TaskError, TaskHandler, TaskRequest, TaskResponse, TaskResult,
    RECONCILE_AFTER_SEC_ERROR, RECONCILE_AFTER_SEC_PROCESSING,
};
pub use tenant::{
    TenantOperator, WORKING_STATE_GROUPS_CREATION_FAILED, WORKING_STATE_SCHEMA_CREATION_FAILED,
    WORKING_STATE_SENDING_GROUPS_FAILED, WORKING_STATE_TENANT_CREATED,
    WORKING_STATE_TENANT_CREATING, WORKING_STATE_UNMARSHALLING_FAILED,
};
