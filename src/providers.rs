//! Named key-store providers and the capabilities each one offers.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

#[async_trait]
pub trait KeyOperations: Send + Sync {
    async fn delete_key(&self, tenant_id: &str, key_id: Uuid) -> Result<()>;

    async fn set_key_enabled(&self, tenant_id: &str, key_id: Uuid, enabled: bool) -> Result<()>;

    async fn set_primary_key(&self, tenant_id: &str, key_id: Uuid) -> Result<()>;
}

#[async_trait]
pub trait Management: Send + Sync {
    async fn delete_key_configuration(&self, tenant_id: &str, configuration_id: Uuid) -> Result<()>;

    /// Points a system at a key configuration, replacing any previous link.
    async fn link_system(
        &self,
        tenant_id: &str,
        system_id: Uuid,
        configuration_id: Uuid,
    ) -> Result<()>;

    async fn unlink_system(&self, tenant_id: &str, system_id: Uuid) -> Result<()>;
}

#[async_trait]
pub trait IdentityLookup: Send + Sync {
    /// Members of the identity-provider group named by `iam_identifier`.
    async fn group_members(&self, tenant_id: &str, iam_identifier: &str) -> Result<Vec<String>>;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("no provider registered under `{0}`")]
    NotRegistered(String),
    #[error("no default key provider configured")]
    NoDefault,
    #[error("provider `{provider}` does not support {capability}")]
    MissingCapability {
        provider: String,
        capability: &'static str,
    },
}

/// One provider with whichever capabilities it implements.
#[derive(Clone)]
pub struct Provider {
    name: String,
    keys: Option<Arc<dyn KeyOperations>>,
    management: Option<Arc<dyn Management>>,
    identity: Option<Arc<dyn IdentityLookup>>,
}

impl Provider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            keys: None,
            management: None,
            identity: None,
        }
    }

    pub fn with_key_operations(mut self, keys: Arc<dyn KeyOperations>) -> Self {
        self.keys = Some(keys);
        self
    }

    pub fn with_management(mut self, management: Arc<dyn Management>) -> Self {
        self.management = Some(management);
        self
    }

    pub fn with_identity_lookup(mut self, identity: Arc<dyn IdentityLookup>) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key_operations(&self) -> Result<Arc<dyn KeyOperations>, ProviderError> {
        self.keys.clone().ok_or_else(|| self.missing("key operations"))
    }

    pub fn management(&self) -> Result<Arc<dyn Management>, ProviderError> {
        self.management.clone().ok_or_else(|| self.missing("management"))
    }

    pub fn identity_lookup(&self) -> Result<Arc<dyn IdentityLookup>, ProviderError> {
        self.identity.clone().ok_or_else(|| self.missing("identity lookup"))
    }

    fn missing(&self, capability: &'static str) -> ProviderError {
        ProviderError::MissingCapability {
            provider: self.name.clone(),
            capability,
        }
    }
}

#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<Provider>>,
    default_provider: Option<String>,
}

impl ProviderRegistry {
    pub fn new(default_provider: Option<String>) -> Self {
        Self {
            providers: HashMap::new(),
            default_provider,
        }
    }

    pub fn register(&mut self, provider: Provider) {
        tracing::info!(provider = provider.name(), "registering key provider");
        self.providers
            .insert(provider.name().to_string(), Arc::new(provider));
    }

    pub fn get(&self, name: &str) -> Result<Arc<Provider>, ProviderError> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| ProviderError::NotRegistered(name.to_string()))
    }

    /// The provider controllers act through when the request names none.
    pub fn default_provider(&self) -> Result<Arc<Provider>, ProviderError> {
        let name = self.default_provider.as_deref().ok_or(ProviderError::NoDefault)?;
        self.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }
}
