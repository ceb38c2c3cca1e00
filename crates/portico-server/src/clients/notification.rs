use async_trait::async_trait;
use portico_core::{NotificationService, SendCode, ServiceError};
use serde_json::Value;

use super::ServiceClient;

#[derive(Debug, Clone)]
pub struct NotificationClient {
    client: ServiceClient,
}

impl NotificationClient {
    pub fn new(client: ServiceClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NotificationService for NotificationClient {
    async fn send_code(&self, request: SendCode) -> Result<Value, ServiceError> {
        let url = self.client.endpoint(&["v1", "send-code"]);
        self.client.post_json(url, &request).await
    }
}
