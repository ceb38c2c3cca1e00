//! Capability interfaces for the backend collaborators.
//!
//! The gateway never speaks to a backend directly; it holds these traits
//! inside a [`ServiceBundle`](crate::ServiceBundle) and lets the transport
//! implementation decide how a call goes over the wire.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ServiceError;
use crate::tenant::{DedicatedProject, ResourceDescriptor, ResourceKind};

/// Live access check for a bearer token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessCheck {
    pub access_token: String,
    pub path: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_slug: Option<String>,
}

/// Result of a successful access check.
///
/// Empty ids mean "not bound by the token"; the caller falls back to the ids
/// supplied with the request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGrant {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub environment_id: String,
    #[serde(default)]
    pub role_id: String,
    #[serde(default)]
    pub client_type_id: String,
}

/// Environment binding of an API key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeyGrant {
    pub app_id: String,
    pub project_id: String,
    pub environment_id: String,
    #[serde(default)]
    pub role_id: String,
    #[serde(default)]
    pub client_type_id: String,
}

/// Tenant-scoped path rewrite, `{name}` segments are placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectRule {
    pub from: String,
    pub to: String,
}

impl RedirectRule {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Where inside a data cluster a call lands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendScope {
    pub project_id: String,
    pub environment_id: String,
}

impl From<&ResourceDescriptor> for BackendScope {
    fn from(descriptor: &ResourceDescriptor) -> Self {
        Self {
            project_id: descriptor.project_id.clone(),
            environment_id: descriptor.backend_environment_id().to_string(),
        }
    }
}

/// One-time code delivery request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendCode {
    pub recipient: String,
    /// `EMAIL` or `PHONE`.
    #[serde(default, alias = "type")]
    pub channel: String,
    #[serde(default)]
    pub text: String,
}

#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Validates a bearer token against the session store.
    async fn check_access(&self, check: AccessCheck) -> Result<AccessGrant, ServiceError>;

    /// Looks up the environment an API key is bound to.
    async fn api_key(&self, api_key: &str) -> Result<ApiKeyGrant, ServiceError>;
}

#[async_trait]
pub trait TenantService: Send + Sync {
    async fn resource_by_environment(
        &self,
        environment_id: &str,
    ) -> Result<ResourceDescriptor, ServiceError>;

    async fn redirect_rules(
        &self,
        project_id: &str,
        environment_id: &str,
    ) -> Result<Vec<RedirectRule>, ServiceError>;

    /// Projects that run on dedicated backends.
    async fn dedicated_projects(&self) -> Result<Vec<DedicatedProject>, ServiceError>;
}

/// Record access on one of the data-serving clusters.
#[async_trait]
pub trait ItemsBackend: Send + Sync {
    fn kind(&self) -> ResourceKind;

    async fn list(
        &self,
        scope: &BackendScope,
        collection: &str,
        query: Value,
    ) -> Result<Value, ServiceError>;

    async fn get(
        &self,
        scope: &BackendScope,
        collection: &str,
        id: &str,
    ) -> Result<Value, ServiceError>;

    async fn create(
        &self,
        scope: &BackendScope,
        collection: &str,
        body: Value,
    ) -> Result<Value, ServiceError>;

    async fn update(
        &self,
        scope: &BackendScope,
        collection: &str,
        id: Option<&str>,
        body: Value,
    ) -> Result<Value, ServiceError>;

    async fn delete(
        &self,
        scope: &BackendScope,
        collection: &str,
        id: &str,
    ) -> Result<Value, ServiceError>;
}

#[async_trait]
pub trait NotificationService: Send + Sync {
    async fn send_code(&self, request: SendCode) -> Result<Value, ServiceError>;
}

#[async_trait]
pub trait FunctionService: Send + Sync {
    async fn invoke(&self, path: &str, payload: Value) -> Result<Value, ServiceError>;
}
