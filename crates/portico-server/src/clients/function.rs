use async_trait::async_trait;
use portico_core::{FunctionService, ServiceError};
use serde_json::Value;

use super::ServiceClient;

/// Function runner: `POST /v1/invoke/{path}`.
#[derive(Debug, Clone)]
pub struct FunctionClient {
    client: ServiceClient,
}

impl FunctionClient {
    pub fn new(client: ServiceClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FunctionService for FunctionClient {
    async fn invoke(&self, path: &str, payload: Value) -> Result<Value, ServiceError> {
        let mut segments = vec!["v1", "invoke"];
        segments.extend(path.split('/').filter(|s| !s.is_empty()));
        if segments.len() == 2 {
            return Err(ServiceError::Invalid("function path is empty".into()));
        }

        let url = self.client.endpoint(&segments);
        self.client.post_json(url, &payload).await
    }
}
