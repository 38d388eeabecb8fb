use thiserror::Error;

use super::schema_name::SchemaNameError;

#[derive(Debug, Error)]
pub enum ProvisioningError {
    /// Another actor already started or finished provisioning this tenant.
    #[error("tenant onboarding already in progress")]
    OnboardingInProgress(#[source] sqlx::Error),
    #[error("invalid schema name: {0}")]
    InvalidSchemaName(#[from] SchemaNameError),
    #[error("failed to create tenant: {0}")]
    CreatingTenant(#[source] sqlx::Error),
    #[error("failed to migrate tenant schema: {0}")]
    MigratingTenant(#[source] sqlx::Error),
    #[error("failed to create group {group}: {source}")]
    CreatingGroup {
        group: &'static str,
        #[source]
        source: sqlx::Error,
    },
    #[error("failed to terminate tenant: {0}")]
    TerminatingTenant(#[source] sqlx::Error),
    #[error("invalid group type `{0}`")]
    InvalidGroupType(String),
    #[error("tenant id is empty")]
    EmptyTenantId,
    #[error("invalid group {name}: {reason}")]
    InvalidGroup { name: String, reason: &'static str },
    #[error("failed to check tenant existence: {0}")]
    CheckingTenant(#[source] sqlx::Error),
    #[error("failed to check group existence: {0}")]
    CheckingGroup(#[source] sqlx::Error),
    #[error("tenant probe timed out")]
    ProbeTimeout,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ProvisioningError {
    pub fn is_onboarding_in_progress(&self) -> bool {
        matches!(self, ProvisioningError::OnboardingInProgress(_))
    }
}

/// Postgres `unique_violation`.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        return db_err.code().as_deref() == Some("23505");
    }
    false
}
