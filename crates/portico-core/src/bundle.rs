//! Per-tenant bundle of backend clients.

use std::fmt;
use std::sync::Arc;

use crate::services::{
    FunctionService, IdentityService, ItemsBackend, NotificationService, TenantService,
};
use crate::tenant::{NodeType, ResourceDescriptor, ResourceKind};

/// Handles to every backend a tenant's requests may reach.
///
/// Built once at startup, never mutated, shared by all requests for the
/// tenant through an `Arc`.
#[derive(Clone)]
pub struct ServiceBundle {
    identity: Arc<dyn IdentityService>,
    tenants: Arc<dyn TenantService>,
    document: Arc<dyn ItemsBackend>,
    document_high: Arc<dyn ItemsBackend>,
    relational: Arc<dyn ItemsBackend>,
    notifications: Arc<dyn NotificationService>,
    functions: Arc<dyn FunctionService>,
}

impl ServiceBundle {
    pub fn builder() -> ServiceBundleBuilder {
        ServiceBundleBuilder::default()
    }

    pub fn identity(&self) -> &Arc<dyn IdentityService> {
        &self.identity
    }

    pub fn tenants(&self) -> &Arc<dyn TenantService> {
        &self.tenants
    }

    pub fn notifications(&self) -> &Arc<dyn NotificationService> {
        &self.notifications
    }

    pub fn functions(&self) -> &Arc<dyn FunctionService> {
        &self.functions
    }

    /// Selects the data backend for a resolved descriptor.
    ///
    /// Document resources on high-capacity nodes go to the high variant;
    /// everything else is decided by the resource kind alone.
    pub fn items_for(&self, descriptor: &ResourceDescriptor) -> Arc<dyn ItemsBackend> {
        match (descriptor.kind, descriptor.node_type) {
            (ResourceKind::Document, NodeType::High) => Arc::clone(&self.document_high),
            (ResourceKind::Document, _) => Arc::clone(&self.document),
            (ResourceKind::Relational, _) => Arc::clone(&self.relational),
        }
    }
}

impl fmt::Debug for ServiceBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceBundle")
            .field("document", &self.document.kind())
            .field("document_high", &self.document_high.kind())
            .field("relational", &self.relational.kind())
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
pub struct ServiceBundleBuilder {
    identity: Option<Arc<dyn IdentityService>>,
    tenants: Option<Arc<dyn TenantService>>,
    document: Option<Arc<dyn ItemsBackend>>,
    document_high: Option<Arc<dyn ItemsBackend>>,
    relational: Option<Arc<dyn ItemsBackend>>,
    notifications: Option<Arc<dyn NotificationService>>,
    functions: Option<Arc<dyn FunctionService>>,
}

impl ServiceBundleBuilder {
    pub fn identity(mut self, service: Arc<dyn IdentityService>) -> Self {
        self.identity = Some(service);
        self
    }

    pub fn tenants(mut self, service: Arc<dyn TenantService>) -> Self {
        self.tenants = Some(service);
        self
    }

    pub fn document(mut self, backend: Arc<dyn ItemsBackend>) -> Self {
        self.document = Some(backend);
        self
    }

    pub fn document_high(mut self, backend: Arc<dyn ItemsBackend>) -> Self {
        self.document_high = Some(backend);
        self
    }

    pub fn relational(mut self, backend: Arc<dyn ItemsBackend>) -> Self {
        self.relational = Some(backend);
        self
    }

    pub fn notifications(mut self, service: Arc<dyn NotificationService>) -> Self {
        self.notifications = Some(service);
        self
    }

    pub fn functions(mut self, service: Arc<dyn FunctionService>) -> Self {
        self.functions = Some(service);
        self
    }

    /// Finishes the bundle. A missing high document backend reuses the
    /// regular one; any other missing client is an error.
    pub fn build(self) -> Result<ServiceBundle, String> {
        let document = self.document.ok_or("document backend is required")?;
        let document_high = self
            .document_high
            .unwrap_or_else(|| Arc::clone(&document));

        Ok(ServiceBundle {
            identity: self.identity.ok_or("identity service is required")?,
            tenants: self.tenants.ok_or("tenant service is required")?,
            document,
            document_high,
            relational: self.relational.ok_or("relational backend is required")?,
            notifications: self
                .notifications
                .ok_or("notification service is required")?,
            functions: self.functions.ok_or("function service is required")?,
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Inert collaborators for registry and bundle tests.

    use super::*;
    use crate::error::ServiceError;
    use crate::services::{
        AccessCheck, AccessGrant, ApiKeyGrant, BackendScope, RedirectRule, SendCode,
    };
    use crate::tenant::DedicatedProject;
    use async_trait::async_trait;
    use serde_json::{Value, json};

    pub struct Inert;

    #[async_trait]
    impl IdentityService for Inert {
        async fn check_access(&self, _check: AccessCheck) -> Result<AccessGrant, ServiceError> {
            Ok(AccessGrant::default())
        }

        async fn api_key(&self, api_key: &str) -> Result<ApiKeyGrant, ServiceError> {
            Err(ServiceError::NotFound(api_key.to_string()))
        }
    }

    #[async_trait]
    impl TenantService for Inert {
        async fn resource_by_environment(
            &self,
            environment_id: &str,
        ) -> Result<ResourceDescriptor, ServiceError> {
            Err(ServiceError::NotFound(environment_id.to_string()))
        }

        async fn redirect_rules(
            &self,
            _project_id: &str,
            _environment_id: &str,
        ) -> Result<Vec<RedirectRule>, ServiceError> {
            Ok(Vec::new())
        }

        async fn dedicated_projects(&self) -> Result<Vec<DedicatedProject>, ServiceError> {
            Ok(Vec::new())
        }
    }

    #[async_trait]
    impl NotificationService for Inert {
        async fn send_code(&self, _request: SendCode) -> Result<Value, ServiceError> {
            Ok(Value::Null)
        }
    }

    #[async_trait]
    impl FunctionService for Inert {
        async fn invoke(&self, _path: &str, _payload: Value) -> Result<Value, ServiceError> {
            Ok(Value::Null)
        }
    }

    /// Backend that answers every call with its own label.
    pub struct Labelled(pub ResourceKind, pub &'static str);

    #[async_trait]
    impl ItemsBackend for Labelled {
        fn kind(&self) -> ResourceKind {
            self.0
        }

        async fn list(&self, _: &BackendScope, _: &str, _: Value) -> Result<Value, ServiceError> {
            Ok(json!(self.1))
        }

        async fn get(&self, _: &BackendScope, _: &str, _: &str) -> Result<Value, ServiceError> {
            Ok(json!(self.1))
        }

        async fn create(&self, _: &BackendScope, _: &str, _: Value) -> Result<Value, ServiceError> {
            Ok(json!(self.1))
        }

        async fn update(
            &self,
            _: &BackendScope,
            _: &str,
            _: Option<&str>,
            _: Value,
        ) -> Result<Value, ServiceError> {
            Ok(json!(self.1))
        }

        async fn delete(&self, _: &BackendScope, _: &str, _: &str) -> Result<Value, ServiceError> {
            Ok(json!(self.1))
        }
    }

    pub fn bundle() -> ServiceBundle {
        ServiceBundle::builder()
            .identity(Arc::new(Inert))
            .tenants(Arc::new(Inert))
            .document(Arc::new(Labelled(ResourceKind::Document, "document")))
            .document_high(Arc::new(Labelled(ResourceKind::Document, "document-high")))
            .relational(Arc::new(Labelled(ResourceKind::Relational, "relational")))
            .notifications(Arc::new(Inert))
            .functions(Arc::new(Inert))
            .build()
            .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::services::BackendScope;
    use serde_json::{Value, json};

    fn descriptor(kind: ResourceKind, node_type: NodeType) -> ResourceDescriptor {
        ResourceDescriptor {
            resource_id: "r".into(),
            project_id: "p".into(),
            environment_id: "e".into(),
            resource_environment_id: String::new(),
            kind,
            node_type,
        }
    }

    async fn label(bundle: &ServiceBundle, d: &ResourceDescriptor) -> Value {
        let scope = BackendScope::from(d);
        bundle
            .items_for(d)
            .list(&scope, "orders", Value::Null)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_items_for_selects_variant() {
        let bundle = bundle();

        let low = descriptor(ResourceKind::Document, NodeType::Low);
        let high = descriptor(ResourceKind::Document, NodeType::High);
        let rel = descriptor(ResourceKind::Relational, NodeType::High);

        assert_eq!(label(&bundle, &low).await, json!("document"));
        assert_eq!(label(&bundle, &high).await, json!("document-high"));
        assert_eq!(label(&bundle, &rel).await, json!("relational"));
    }

    #[test]
    fn test_builder_reports_missing_client() {
        let err = ServiceBundle::builder()
            .document(Arc::new(Labelled(ResourceKind::Document, "d")))
            .build()
            .unwrap_err();
        assert_eq!(err, "identity service is required");
    }

    #[test]
    fn test_missing_high_backend_reuses_document() {
        let bundle = ServiceBundle::builder()
            .identity(Arc::new(Inert))
            .tenants(Arc::new(Inert))
            .document(Arc::new(Labelled(ResourceKind::Document, "document")))
            .relational(Arc::new(Labelled(ResourceKind::Relational, "relational")))
            .notifications(Arc::new(Inert))
            .functions(Arc::new(Inert))
            .build()
            .unwrap();

        let high = descriptor(ResourceKind::Document, NodeType::High);
        let got = tokio_test::block_on(label(&bundle, &high));
        assert_eq!(got, json!("document"));
    }
}
