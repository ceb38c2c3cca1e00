use async_trait::async_trait;
use portico_core::{BackendScope, ItemsBackend, ResourceKind, ServiceError};
use serde_json::Value;
use url::Url;

use super::ServiceClient;

/// Relational cluster, REST-shaped: `/v1/items/{collection}[/{id}]` scoped by
/// `project-id` and `environment-id` query parameters.
#[derive(Debug, Clone)]
pub struct RelationalClient {
    client: ServiceClient,
}

impl RelationalClient {
    pub fn new(client: ServiceClient) -> Self {
        Self { client }
    }

    fn items_url(&self, scope: &BackendScope, collection: &str, id: Option<&str>) -> Url {
        let mut url = match id {
            Some(id) => self.client.endpoint(&["v1", "items", collection, id]),
            None => self.client.endpoint(&["v1", "items", collection]),
        };
        url.query_pairs_mut()
            .append_pair("project-id", &scope.project_id)
            .append_pair("environment-id", &scope.environment_id);
        url
    }
}

/// Scalar members of a JSON object as query pairs. Nested values are sent
/// as their JSON text.
fn query_pairs(query: &Value) -> Vec<(String, String)> {
    let Value::Object(map) = query else {
        return Vec::new();
    };
    map.iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| {
            let v = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), v)
        })
        .collect()
}

#[async_trait]
impl ItemsBackend for RelationalClient {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Relational
    }

    async fn list(
        &self,
        scope: &BackendScope,
        collection: &str,
        query: Value,
    ) -> Result<Value, ServiceError> {
        let mut url = self.items_url(scope, collection, None);
        {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in query_pairs(&query) {
                pairs.append_pair(&k, &v);
            }
        }
        self.client.get_json(url).await
    }

    async fn get(
        &self,
        scope: &BackendScope,
        collection: &str,
        id: &str,
    ) -> Result<Value, ServiceError> {
        let url = self.items_url(scope, collection, Some(id));
        self.client.get_json(url).await
    }

    async fn create(
        &self,
        scope: &BackendScope,
        collection: &str,
        body: Value,
    ) -> Result<Value, ServiceError> {
        let url = self.items_url(scope, collection, None);
        self.client.post_json(url, &body).await
    }

    async fn update(
        &self,
        scope: &BackendScope,
        collection: &str,
        id: Option<&str>,
        body: Value,
    ) -> Result<Value, ServiceError> {
        let url = self.items_url(scope, collection, id);
        self.client
            .send(self.client.http().put(url).json(&body))
            .await
    }

    async fn delete(
        &self,
        scope: &BackendScope,
        collection: &str,
        id: &str,
    ) -> Result<Value, ServiceError> {
        let url = self.items_url(scope, collection, Some(id));
        self.client.send(self.client.http().delete(url)).await
    }
}
