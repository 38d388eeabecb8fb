use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::providers::{ProviderError, ProviderRegistry};
use crate::tenants::Tenant;

use super::models::{ActionType, ArtifactType, Workflow};

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("{action} is not supported for {artifact}")]
    Unsupported {
        artifact: ArtifactType,
        action: ActionType,
    },
    #[error("invalid workflow parameters: {0}")]
    InvalidParameters(String),
    #[error("action failed: {0:#}")]
    Action(#[from] anyhow::Error),
}

/// Carries out the change an approved workflow describes.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, tenant: &Tenant, workflow: &Workflow) -> Result<(), ExecutionError>;
}

/// Executes workflow actions through the default provider's capabilities.
pub struct ProviderActionExecutor {
    providers: Arc<ProviderRegistry>,
}

impl ProviderActionExecutor {
    pub fn new(providers: Arc<ProviderRegistry>) -> Self {
        Self { providers }
    }
}

#[async_trait]
impl ActionExecutor for ProviderActionExecutor {
    async fn execute(&self, tenant: &Tenant, workflow: &Workflow) -> Result<(), ExecutionError> {
        let provider = self.providers.default_provider()?;
        let artifact_id = workflow.artifact_id;

        match (workflow.artifact_type, workflow.action_type) {
            (ArtifactType::Key, ActionType::Delete) => {
                provider
                    .key_operations()?
                    .delete_key(&tenant.id, artifact_id)
                    .await?
            }
            (ArtifactType::Key, ActionType::UpdateState) => {
                let enabled = match workflow.parameters.as_str() {
                    "ENABLED" => true,
                    "DISABLED" => false,
                    other => {
                        return Err(ExecutionError::InvalidParameters(format!(
                            "invalid key state `{other}`"
                        )))
                    }
                };
                provider
                    .key_operations()?
                    .set_key_enabled(&tenant.id, artifact_id, enabled)
                    .await?
            }
            (ArtifactType::Key, ActionType::UpdatePrimaryKey) => {
                let key_id = parse_uuid(&workflow.parameters)?;
                provider
                    .key_operations()?
                    .set_primary_key(&tenant.id, key_id)
                    .await?
            }
            (ArtifactType::KeyConfiguration, ActionType::Delete) => {
                provider
                    .management()?
                    .delete_key_configuration(&tenant.id, artifact_id)
                    .await?
            }
            (ArtifactType::System, ActionType::Link | ActionType::Switch) => {
                let configuration_id = parse_uuid(&workflow.parameters)?;
                provider
                    .management()?
                    .link_system(&tenant.id, artifact_id, configuration_id)
                    .await?
            }
            (ArtifactType::System, ActionType::Unlink) => {
                provider
                    .management()?
                    .unlink_system(&tenant.id, artifact_id)
                    .await?
            }
            (artifact, action) => return Err(ExecutionError::Unsupported { artifact, action }),
        }

        tracing::info!(
            tenant_id = %tenant.id,
            workflow_id = %workflow.id,
            provider = provider.name(),
            action = %workflow.action_type,
            "workflow action executed",
        );
        Ok(())
    }
}

fn parse_uuid(value: &str) -> Result<Uuid, ExecutionError> {
    Uuid::parse_str(value.trim())
        .map_err(|_| ExecutionError::InvalidParameters(format!("`{value}` is not a valid id")))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::Utc;

    use super::*;
    use crate::providers::{KeyOperations, Provider};
    use crate::workflows::models::WorkflowState;

    #[derive(Default)]
    struct RecordingKeys {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl KeyOperations for RecordingKeys {
        async fn delete_key(&self, tenant_id: &str, key_id: Uuid) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(format!("delete {tenant_id} {key_id}"));
            Ok(())
        }

        async fn set_key_enabled(&self, _tenant_id: &str, key_id: Uuid, enabled: bool) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(format!("enabled {key_id} {enabled}"));
            Ok(())
        }

        async fn set_primary_key(&self, _tenant_id: &str, key_id: Uuid) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(format!("primary {key_id}"));
            Ok(())
        }
    }

    fn workflow(artifact_type: ArtifactType, action_type: ActionType, parameters: &str) -> Workflow {
        let now = Utc::now();
        Workflow {
            id: Uuid::new_v4(),
            state: WorkflowState::WaitConfirmation,
            action_type,
            artifact_type,
            artifact_id: Uuid::new_v4(),
            initiator_id: "alice".into(),
            parameters: parameters.into(),
            failure_reason: None,
            expiry_date: None,
            created_at: now,
            updated_at: now,
            approvers: Vec::new(),
        }
    }

    fn tenant() -> Tenant {
        Tenant::new("tenant-0001", "eu10").unwrap()
    }

    #[tokio::test]
    async fn fails_without_a_registered_provider() {
        let executor = ProviderActionExecutor::new(Arc::new(ProviderRegistry::new(None)));
        let err = executor
            .execute(&tenant(), &workflow(ArtifactType::Key, ActionType::Delete, ""))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Provider(ProviderError::NoDefault)));
    }

    #[tokio::test]
    async fn dispatches_key_actions_to_the_default_provider() {
        let keys = Arc::new(RecordingKeys::default());
        let mut registry = ProviderRegistry::new(Some("hsm".into()));
        registry.register(Provider::new("hsm").with_key_operations(keys.clone()));
        let executor = ProviderActionExecutor::new(Arc::new(registry));

        let delete = workflow(ArtifactType::Key, ActionType::Delete, "");
        executor.execute(&tenant(), &delete).await.unwrap();
        executor
            .execute(&tenant(), &workflow(ArtifactType::Key, ActionType::UpdateState, "DISABLED"))
            .await
            .unwrap();

        let calls = keys.calls.lock().unwrap();
        assert_eq!(calls[0], format!("delete tenant-0001 {}", delete.artifact_id));
        assert!(calls[1].ends_with("false"));
    }

    #[tokio::test]
    async fn rejects_bad_parameters_and_unsupported_pairs() {
        let mut registry = ProviderRegistry::new(Some("hsm".into()));
        registry.register(Provider::new("hsm").with_key_operations(Arc::new(RecordingKeys::default())));
        let executor = ProviderActionExecutor::new(Arc::new(registry));

        let err = executor
            .execute(&tenant(), &workflow(ArtifactType::Key, ActionType::UpdateState, "PAUSED"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::InvalidParameters(_)));

        let err = executor
            .execute(&tenant(), &workflow(ArtifactType::Key, ActionType::Link, ""))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Unsupported { .. }));

        let err = executor
            .execute(&tenant(), &workflow(ArtifactType::System, ActionType::Unlink, ""))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExecutionError::Provider(ProviderError::MissingCapability { .. })
        ));
    }
}
