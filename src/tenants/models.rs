use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::error::ProvisioningError;
use super::schema_name::{encode_schema_name, SchemaNameError};

/// Namespace prepended to every group IAM identifier.
pub const IAM_IDENTIFIER_NAMESPACE: &str = "KMS";
pub const MAX_IAM_IDENTIFIER_LENGTH: usize = 128;
pub const MAX_GROUP_NAME_LENGTH: usize = 64;

static GROUP_TEXT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9 _-]+$").expect("valid group text regex"));

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TenantStatus {
    Active,
    Blocked,
    Terminated,
}

impl TenantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantStatus::Active => "ACTIVE",
            TenantStatus::Blocked => "BLOCKED",
            TenantStatus::Terminated => "TERMINATED",
        }
    }

    pub fn from_str(value: &str) -> Self {
        match value {
            "BLOCKED" => TenantStatus::Blocked,
            "TERMINATED" => TenantStatus::Terminated,
            _ => TenantStatus::Active,
        }
    }
}

/// Registry row for a tenant; lives in the shared schema.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tenant {
    pub id: String,
    pub schema_name: String,
    pub domain_url: String,
    pub region: String,
    pub status: TenantStatus,
    /// OIDC issuer applied by the APPLY_TENANT_AUTH task.
    pub issuer_url: Option<String>,
}

impl Tenant {
    /// Builds an active tenant with its schema name derived from the external id.
    pub fn new(id: impl Into<String>, region: impl Into<String>) -> Result<Self, SchemaNameError> {
        let id = id.into();
        let schema_name = encode_schema_name(&id)?;
        Ok(Self {
            domain_url: schema_name.clone(),
            schema_name,
            id,
            region: region.into(),
            status: TenantStatus::Active,
            issuer_url: None,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct TenantRow {
    pub id: String,
    pub schema_name: String,
    pub domain_url: String,
    pub region: String,
    pub status: String,
    pub issuer_url: Option<String>,
}

impl From<TenantRow> for Tenant {
    fn from(row: TenantRow) -> Self {
        Tenant {
            id: row.id,
            schema_name: row.schema_name,
            domain_url: row.domain_url,
            region: row.region,
            status: TenantStatus::from_str(&row.status),
            issuer_url: row.issuer_url,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GroupRole {
    TenantAdministrator,
    TenantAuditor,
}

impl GroupRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupRole::TenantAdministrator => "TENANT_ADMINISTRATOR",
            GroupRole::TenantAuditor => "TENANT_AUDITOR",
        }
    }
}

/// The two groups every tenant needs before it counts as provisioned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BaselineGroup {
    Administrator,
    Auditor,
}

impl BaselineGroup {
    pub const ALL: [BaselineGroup; 2] = [BaselineGroup::Administrator, BaselineGroup::Auditor];

    pub fn name(&self) -> &'static str {
        match self {
            BaselineGroup::Administrator => "TenantAdministrator",
            BaselineGroup::Auditor => "TenantAuditor",
        }
    }

    pub fn role(&self) -> GroupRole {
        match self {
            BaselineGroup::Administrator => GroupRole::TenantAdministrator,
            BaselineGroup::Auditor => GroupRole::TenantAuditor,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|group| group.name() == name)
    }

    pub fn iam_identifier(&self, tenant_id: &str) -> String {
        format!("{IAM_IDENTIFIER_NAMESPACE}_{}_{tenant_id}", self.name())
    }

    pub fn for_tenant(&self, tenant_id: &str) -> Result<Group, ProvisioningError> {
        let group = Group {
            id: Uuid::new_v4(),
            name: self.name().to_string(),
            description: String::new(),
            role: self.role(),
            iam_identifier: build_iam_identifier(self.name(), tenant_id)?,
        };
        group.validate()?;
        Ok(group)
    }
}

/// Deterministic identity-provider name for a baseline group of a tenant.
pub fn build_iam_identifier(group_type: &str, tenant_id: &str) -> Result<String, ProvisioningError> {
    if tenant_id.is_empty() {
        return Err(ProvisioningError::EmptyTenantId);
    }
    let group = BaselineGroup::from_name(group_type)
        .ok_or_else(|| ProvisioningError::InvalidGroupType(group_type.to_string()))?;
    Ok(group.iam_identifier(tenant_id))
}

/// IAM identifiers of both baseline groups, administrator first.
pub fn baseline_iam_identifiers(tenant_id: &str) -> Vec<String> {
    BaselineGroup::ALL
        .iter()
        .map(|group| group.iam_identifier(tenant_id))
        .collect()
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub role: GroupRole,
    pub iam_identifier: String,
}

impl Group {
    pub fn validate(&self) -> Result<(), ProvisioningError> {
        if self.iam_identifier.len() > MAX_IAM_IDENTIFIER_LENGTH
            || !GROUP_TEXT_PATTERN.is_match(&self.iam_identifier)
        {
            return Err(ProvisioningError::InvalidGroup {
                name: self.name.clone(),
                reason: "invalid IAM identifier",
            });
        }
        if self.name.len() > MAX_GROUP_NAME_LENGTH || !GROUP_TEXT_PATTERN.is_match(&self.name) {
            return Err(ProvisioningError::InvalidGroup {
                name: self.name.clone(),
                reason: "invalid group name",
            });
        }
        Ok(())
    }
}
