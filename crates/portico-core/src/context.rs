//! Per-request authentication result.

use serde::{Deserialize, Serialize};

use crate::tenant::{ResourceDescriptor, TenantKey};

/// Who is making the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Principal {
    /// A signed-in user, validated live with the identity service.
    User {
        user_id: String,
        role_id: String,
        client_type_id: String,
        #[serde(skip)]
        token: String,
    },
    /// An application using an API key.
    ApiKey {
        app_id: String,
        role_id: String,
        client_type_id: String,
    },
}

impl Principal {
    pub fn role_id(&self) -> &str {
        match self {
            Self::User { role_id, .. } | Self::ApiKey { role_id, .. } => role_id,
        }
    }

    pub fn scheme(&self) -> &'static str {
        match self {
            Self::User { .. } => "bearer",
            Self::ApiKey { .. } => "api-key",
        }
    }
}

/// Everything the handler layer needs to route a request to a tenant's
/// backend. Lives in request extensions; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub project_id: String,
    pub environment_id: String,
    pub resource: ResourceDescriptor,
    pub principal: Principal,
}

impl RequestContext {
    pub fn tenant_key(&self, shared_namespace: &str) -> TenantKey {
        self.resource.tenant_key(shared_namespace)
    }
}
