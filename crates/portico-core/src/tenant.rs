//! Tenant identity and resource descriptors.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies a tenant: either the shared platform namespace or the project id
/// of a dedicated deployment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantKey(String);

impl TenantKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TenantKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Whether a tenant runs on the shared platform clusters or on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TenantTier {
    Shared,
    Dedicated,
}

/// Which data-serving cluster holds a tenant's records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceKind {
    /// Document store cluster.
    #[serde(alias = "MONGODB")]
    Document,
    /// Relational cluster.
    #[serde(alias = "POSTGRESQL")]
    Relational,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Document => f.write_str("document"),
            Self::Relational => f.write_str("relational"),
        }
    }
}

/// Capacity class of the node serving a resource.
///
/// `Dedicated` marks enterprise projects that own a full set of backends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    #[default]
    Low,
    High,
    #[serde(alias = "ENTER_PRICE")]
    Dedicated,
}

impl NodeType {
    pub fn tier(self) -> TenantTier {
        match self {
            Self::Dedicated => TenantTier::Dedicated,
            Self::Low | Self::High => TenantTier::Shared,
        }
    }
}

/// A tenant's configured backend plus the identifiers needed to reach it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub resource_id: String,
    pub project_id: String,
    pub environment_id: String,
    /// Environment id inside the backend cluster (differs from the platform
    /// environment id for migrated projects).
    #[serde(default)]
    pub resource_environment_id: String,
    pub kind: ResourceKind,
    #[serde(default)]
    pub node_type: NodeType,
}

impl ResourceDescriptor {
    pub fn tier(&self) -> TenantTier {
        self.node_type.tier()
    }

    /// Registry key for this descriptor.
    pub fn tenant_key(&self, shared_namespace: &str) -> TenantKey {
        match self.tier() {
            TenantTier::Dedicated => TenantKey::new(self.project_id.clone()),
            TenantTier::Shared => TenantKey::new(shared_namespace),
        }
    }

    /// Environment id to send to the backend cluster.
    pub fn backend_environment_id(&self) -> &str {
        if self.resource_environment_id.is_empty() {
            &self.environment_id
        } else {
            &self.resource_environment_id
        }
    }
}

/// Base URLs of the collaborators that make up a service bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEndpoints {
    #[serde(default)]
    pub identity_url: String,
    #[serde(default)]
    pub tenant_url: String,
    #[serde(default)]
    pub document_url: String,
    /// High-capacity document nodes; falls back to `document_url` when empty.
    #[serde(default)]
    pub document_high_url: String,
    #[serde(default)]
    pub relational_url: String,
    #[serde(default)]
    pub notification_url: String,
    #[serde(default)]
    pub function_url: String,
}

/// A project that runs on its own backends and, optionally, its own cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedicatedProject {
    pub project_id: String,
    pub endpoints: ServiceEndpoints,
    #[serde(default)]
    pub redis_url: Option<String>,
}
