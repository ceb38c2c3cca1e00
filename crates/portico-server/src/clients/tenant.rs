use async_trait::async_trait;
use portico_core::{
    DedicatedProject, RedirectRule, ResourceDescriptor, ServiceError, TenantService,
};
use serde::Deserialize;

use super::ServiceClient;

/// Upper bound on redirect rules fetched per environment.
pub const REDIRECT_RULE_LIMIT: usize = 100;

#[derive(Debug, Clone)]
pub struct TenantClient {
    client: ServiceClient,
}

impl TenantClient {
    pub fn new(client: ServiceClient) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct RedirectRulesPage {
    #[serde(default)]
    redirect_urls: Vec<RedirectRule>,
}

#[derive(Debug, Deserialize)]
struct DedicatedProjectsPage {
    #[serde(default)]
    projects: Vec<DedicatedProject>,
}

#[async_trait]
impl TenantService for TenantClient {
    async fn resource_by_environment(
        &self,
        environment_id: &str,
    ) -> Result<ResourceDescriptor, ServiceError> {
        let url = self
            .client
            .endpoint(&["v1", "resources", "by-environment", environment_id]);
        self.client.get_json(url).await
    }

    async fn redirect_rules(
        &self,
        project_id: &str,
        environment_id: &str,
    ) -> Result<Vec<RedirectRule>, ServiceError> {
        let mut url = self.client.endpoint(&["v1", "redirect-urls"]);
        url.query_pairs_mut()
            .append_pair("project-id", project_id)
            .append_pair("env-id", environment_id)
            .append_pair("offset", "0")
            .append_pair("limit", &REDIRECT_RULE_LIMIT.to_string());

        let page: RedirectRulesPage = self.client.get_json(url).await?;
        Ok(page.redirect_urls)
    }

    async fn dedicated_projects(&self) -> Result<Vec<DedicatedProject>, ServiceError> {
        let url = self.client.endpoint(&["v1", "projects", "dedicated"]);
        let page: DedicatedProjectsPage = self.client.get_json(url).await?;
        Ok(page.projects)
    }
}
