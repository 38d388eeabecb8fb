use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

/// External tenant registry that must learn a tenant's group identifiers before it goes live.
#[async_trait]
pub trait TenantRegistry: Send + Sync {
    /// Returns the registry's acknowledgement; `false` means it declined and should be asked again.
    async fn set_tenant_user_groups(&self, tenant_id: &str, user_groups: &[String]) -> Result<bool>;
}

#[derive(Debug, Serialize)]
struct SetTenantUserGroupsRequest<'a> {
    user_groups: &'a [String],
}

#[derive(Debug, Deserialize)]
struct SetTenantUserGroupsResponse {
    #[serde(default)]
    success: bool,
}

pub struct HttpTenantRegistry {
    client: reqwest::Client,
    base_url: Url,
    auth_token: Option<String>,
}

impl HttpTenantRegistry {
    pub fn new(base_url: Url, auth_token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build tenant registry client")?;
        Ok(Self {
            client,
            base_url,
            auth_token,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        format!("{}/{}", self.base_url.as_str().trim_end_matches('/'), path)
    }

    fn auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(token) = &self.auth_token {
            request.bearer_auth(token)
        } else {
            request
        }
    }
}

#[async_trait]
impl TenantRegistry for HttpTenantRegistry {
    async fn set_tenant_user_groups(&self, tenant_id: &str, user_groups: &[String]) -> Result<bool> {
        let response = self
            .auth(
                self.client
                    .post(self.endpoint(&format!("tenants/{tenant_id}/user-groups"))),
            )
            .json(&SetTenantUserGroupsRequest { user_groups })
            .send()
            .await
            .context("failed to contact tenant registry")?
            .error_for_status()
            .context("tenant registry rejected user groups")?;

        let parsed: SetTenantUserGroupsResponse = response
            .json()
            .await
            .context("failed to decode tenant registry response")?;
        Ok(parsed.success)
    }
}
