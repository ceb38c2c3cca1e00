use async_trait::async_trait;
use portico_core::{BackendScope, ItemsBackend, ResourceKind, ServiceError};
use serde::Serialize;
use serde_json::{Value, json};

use super::ServiceClient;

/// Document-store cluster. Every operation is an RPC-style POST to
/// `/v1/object/{operation}`.
#[derive(Debug, Clone)]
pub struct DocumentClient {
    client: ServiceClient,
}

#[derive(Debug, Serialize)]
struct ObjectRequest<'a> {
    table_slug: &'a str,
    project_id: &'a str,
    environment_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    data: Value,
}

impl DocumentClient {
    pub fn new(client: ServiceClient) -> Self {
        Self { client }
    }

    async fn call(
        &self,
        operation: &str,
        scope: &BackendScope,
        collection: &str,
        id: Option<&str>,
        data: Value,
    ) -> Result<Value, ServiceError> {
        let url = self.client.endpoint(&["v1", "object", operation]);
        let request = ObjectRequest {
            table_slug: collection,
            project_id: &scope.project_id,
            environment_id: &scope.environment_id,
            id,
            data,
        };
        self.client.post_json(url, &request).await
    }
}

#[async_trait]
impl ItemsBackend for DocumentClient {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Document
    }

    async fn list(
        &self,
        scope: &BackendScope,
        collection: &str,
        query: Value,
    ) -> Result<Value, ServiceError> {
        self.call("get-list", scope, collection, None, query).await
    }

    async fn get(
        &self,
        scope: &BackendScope,
        collection: &str,
        id: &str,
    ) -> Result<Value, ServiceError> {
        self.call("get-single", scope, collection, Some(id), json!({}))
            .await
    }

    async fn create(
        &self,
        scope: &BackendScope,
        collection: &str,
        body: Value,
    ) -> Result<Value, ServiceError> {
        self.call("create", scope, collection, None, body).await
    }

    async fn update(
        &self,
        scope: &BackendScope,
        collection: &str,
        id: Option<&str>,
        body: Value,
    ) -> Result<Value, ServiceError> {
        self.call("update", scope, collection, id, body).await
    }

    async fn delete(
        &self,
        scope: &BackendScope,
        collection: &str,
        id: &str,
    ) -> Result<Value, ServiceError> {
        self.call("delete", scope, collection, Some(id), json!({}))
            .await
    }
}
