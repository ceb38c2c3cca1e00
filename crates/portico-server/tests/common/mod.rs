//! In-process collaborators and a gateway context wired to them.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use portico_cache::{LocalTier, MemoryStore, single_store};
use portico_core::{
    AccessCheck, AccessGrant, ApiKeyGrant, BackendScope, DedicatedProject, FunctionService,
    IdentityService, ItemsBackend, NodeType, NotificationService, RedirectRule,
    ResourceDescriptor, ResourceKind, SendCode, ServiceBundle, ServiceError, TenantKey,
    TenantRegistry, TenantService,
};
use portico_server::config::AppConfig;
use portico_server::{AppState, GatewayContext};
use serde_json::{Value, json};

pub const SHARED: &str = "u-code";

#[derive(Default)]
pub struct MockIdentity {
    pub api_keys: Mutex<HashMap<String, ApiKeyGrant>>,
    pub tokens: Mutex<HashMap<String, Result<AccessGrant, ServiceError>>>,
    pub api_key_calls: AtomicUsize,
    pub check_calls: AtomicUsize,
    pub delay: Duration,
    pub last_check: Mutex<Option<AccessCheck>>,
}

impl MockIdentity {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn key(&self, key: &str, project_id: &str, environment_id: &str) {
        self.api_keys.lock().insert(
            key.to_string(),
            ApiKeyGrant {
                app_id: format!("app-{key}"),
                project_id: project_id.to_string(),
                environment_id: environment_id.to_string(),
                role_id: "role-app".into(),
                client_type_id: "ct-app".into(),
            },
        );
    }

    pub fn token(&self, token: &str, grant: Result<AccessGrant, ServiceError>) {
        self.tokens.lock().insert(token.to_string(), grant);
    }

    pub fn api_key_calls(&self) -> usize {
        self.api_key_calls.load(Ordering::SeqCst)
    }

    pub fn check_calls(&self) -> usize {
        self.check_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityService for MockIdentity {
    async fn check_access(&self, check: AccessCheck) -> Result<AccessGrant, ServiceError> {
        self.check_calls.fetch_add(1, Ordering::SeqCst);
        let found = self.tokens.lock().get(&check.access_token).cloned();
        *self.last_check.lock() = Some(check);
        found.unwrap_or_else(|| Err(ServiceError::Unauthenticated("unknown token".into())))
    }

    async fn api_key(&self, api_key: &str) -> Result<ApiKeyGrant, ServiceError> {
        self.api_key_calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.api_keys
            .lock()
            .get(api_key)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("api key '{api_key}'")))
    }
}

#[derive(Default)]
pub struct MockTenants {
    pub resources: Mutex<HashMap<String, ResourceDescriptor>>,
    pub rules: Mutex<HashMap<String, Vec<RedirectRule>>>,
    pub dedicated: Mutex<Vec<DedicatedProject>>,
    pub resource_calls: AtomicUsize,
    pub rule_calls: AtomicUsize,
    pub down: AtomicBool,
}

impl MockTenants {
    pub fn environment(&self, descriptor: ResourceDescriptor) {
        self.resources
            .lock()
            .insert(descriptor.environment_id.clone(), descriptor);
    }

    pub fn rules(&self, project_id: &str, environment_id: &str, rules: Vec<RedirectRule>) {
        self.rules
            .lock()
            .insert(format!("{project_id}/{environment_id}"), rules);
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn resource_calls(&self) -> usize {
        self.resource_calls.load(Ordering::SeqCst)
    }

    pub fn rule_calls(&self) -> usize {
        self.rule_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TenantService for MockTenants {
    async fn resource_by_environment(
        &self,
        environment_id: &str,
    ) -> Result<ResourceDescriptor, ServiceError> {
        self.resource_calls.fetch_add(1, Ordering::SeqCst);
        if self.down.load(Ordering::SeqCst) {
            return Err(ServiceError::unavailable("tenant service down"));
        }
        self.resources
            .lock()
            .get(environment_id)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("environment '{environment_id}'")))
    }

    async fn redirect_rules(
        &self,
        project_id: &str,
        environment_id: &str,
    ) -> Result<Vec<RedirectRule>, ServiceError> {
        self.rule_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .rules
            .lock()
            .get(&format!("{project_id}/{environment_id}"))
            .cloned()
            .unwrap_or_default())
    }

    async fn dedicated_projects(&self) -> Result<Vec<DedicatedProject>, ServiceError> {
        Ok(self.dedicated.lock().clone())
    }
}

/// Echoes what it was asked to do, tagged with a label naming the backend.
pub struct EchoItems {
    pub kind: ResourceKind,
    pub label: &'static str,
    pub calls: AtomicUsize,
}

impl EchoItems {
    pub fn new(kind: ResourceKind, label: &'static str) -> Self {
        Self {
            kind,
            label,
            calls: AtomicUsize::new(0),
        }
    }

    fn echo(&self, op: &str, scope: &BackendScope, collection: &str, extra: Value) -> Value {
        self.calls.fetch_add(1, Ordering::SeqCst);
        json!({
            "backend": self.label,
            "op": op,
            "project_id": scope.project_id,
            "environment_id": scope.environment_id,
            "collection": collection,
            "extra": extra,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ItemsBackend for EchoItems {
    fn kind(&self) -> ResourceKind {
        self.kind
    }

    async fn list(
        &self,
        scope: &BackendScope,
        collection: &str,
        query: Value,
    ) -> Result<Value, ServiceError> {
        Ok(self.echo("list", scope, collection, query))
    }

    async fn get(
        &self,
        scope: &BackendScope,
        collection: &str,
        id: &str,
    ) -> Result<Value, ServiceError> {
        Ok(self.echo("get", scope, collection, json!(id)))
    }

    async fn create(
        &self,
        scope: &BackendScope,
        collection: &str,
        body: Value,
    ) -> Result<Value, ServiceError> {
        Ok(self.echo("create", scope, collection, body))
    }

    async fn update(
        &self,
        scope: &BackendScope,
        collection: &str,
        id: Option<&str>,
        body: Value,
    ) -> Result<Value, ServiceError> {
        Ok(self.echo("update", scope, collection, json!({"id": id, "body": body})))
    }

    async fn delete(
        &self,
        scope: &BackendScope,
        collection: &str,
        id: &str,
    ) -> Result<Value, ServiceError> {
        Ok(self.echo("delete", scope, collection, json!(id)))
    }
}

#[derive(Default)]
pub struct MockNotifications {
    pub sent: Mutex<Vec<SendCode>>,
}

#[async_trait]
impl NotificationService for MockNotifications {
    async fn send_code(&self, request: SendCode) -> Result<Value, ServiceError> {
        self.sent.lock().push(request);
        Ok(json!({"sms_id": "sms-1"}))
    }
}

pub struct EchoFunctions;

#[async_trait]
impl FunctionService for EchoFunctions {
    async fn invoke(&self, path: &str, payload: Value) -> Result<Value, ServiceError> {
        Ok(json!({"function": path, "payload": payload}))
    }
}

pub fn descriptor(env: &str, project: &str, kind: ResourceKind, node: NodeType) -> ResourceDescriptor {
    ResourceDescriptor {
        resource_id: format!("r-{env}"),
        project_id: project.to_string(),
        environment_id: env.to_string(),
        resource_environment_id: String::new(),
        kind,
        node_type: node,
    }
}

/// Everything a test may want to poke at after building the app.
pub struct Harness {
    pub state: AppState,
    pub identity: Arc<MockIdentity>,
    pub tenants: Arc<MockTenants>,
    pub document: Arc<EchoItems>,
    pub relational: Arc<EchoItems>,
    pub notifications: Arc<MockNotifications>,
}

pub fn bundle(
    identity: &Arc<MockIdentity>,
    tenants: &Arc<MockTenants>,
    document: &Arc<EchoItems>,
    relational: &Arc<EchoItems>,
    notifications: &Arc<MockNotifications>,
) -> ServiceBundle {
    ServiceBundle::builder()
        .identity(identity.clone())
        .tenants(tenants.clone())
        .document(document.clone())
        .relational(relational.clone())
        .notifications(notifications.clone())
        .functions(Arc::new(EchoFunctions))
        .build()
        .expect("complete bundle")
}

pub fn harness_with(config: AppConfig, identity: MockIdentity) -> Harness {
    let identity = Arc::new(identity);
    let tenants = Arc::new(MockTenants::default());
    let document = Arc::new(EchoItems::new(ResourceKind::Document, "document"));
    let relational = Arc::new(EchoItems::new(ResourceKind::Relational, "relational"));
    let notifications = Arc::new(MockNotifications::default());

    let registry = Arc::new(TenantRegistry::new());
    registry
        .add(
            bundle(&identity, &tenants, &document, &relational, &notifications),
            TenantKey::new(SHARED),
        )
        .expect("register shared bundle");

    let cache = Arc::new(single_store(
        LocalTier::new(10_000),
        Arc::new(MemoryStore::new()),
    ));
    let ctx = GatewayContext::new(
        config,
        registry,
        cache,
        identity.clone(),
        tenants.clone(),
    )
    .expect("valid gateway context");

    Harness {
        state: Arc::new(ctx),
        identity,
        tenants,
        document,
        relational,
        notifications,
    }
}

pub fn harness() -> Harness {
    harness_with(AppConfig::default(), MockIdentity::default())
}
