use async_trait::async_trait;
use portico_core::{AccessCheck, AccessGrant, ApiKeyGrant, IdentityService, ServiceError};

use super::ServiceClient;

/// Identity/session service.
///
/// - `POST /v2/has-access`: live bearer-token check
/// - `GET /v1/api-keys/{key}`: API key to environment binding
#[derive(Debug, Clone)]
pub struct IdentityClient {
    client: ServiceClient,
}

impl IdentityClient {
    pub fn new(client: ServiceClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl IdentityService for IdentityClient {
    async fn check_access(&self, check: AccessCheck) -> Result<AccessGrant, ServiceError> {
        let url = self.client.endpoint(&["v2", "has-access"]);
        self.client.post_json(url, &check).await
    }

    async fn api_key(&self, api_key: &str) -> Result<ApiKeyGrant, ServiceError> {
        let url = self.client.endpoint(&["v1", "api-keys", api_key]);
        self.client.get_json(url).await
    }
}
