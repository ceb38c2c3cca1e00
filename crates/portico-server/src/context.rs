//! Gateway context: everything a request needs, built once at startup and
//! torn down at shutdown.

use std::sync::Arc;

use portico_cache::{CacheFrontend, StampedeGuard, StoreScope};
use portico_core::{IdentityService, ResourceDescriptor, TenantRegistry, TenantService};
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::gateway::{AuthResolver, PathRedirector, RateLimiter, store_scope};

pub type AppState = Arc<GatewayContext>;

pub struct GatewayContext {
    pub config: AppConfig,
    pub registry: Arc<TenantRegistry>,
    pub cache: Arc<CacheFrontend>,
    pub guard: Arc<StampedeGuard>,
    pub auth: AuthResolver,
    pub redirector: PathRedirector,
    pub limiter: RateLimiter,
    shutdown: CancellationToken,
}

impl GatewayContext {
    /// Wires the components together. `identity` and `tenants` are the
    /// platform-level services used for credential resolution.
    pub fn new(
        config: AppConfig,
        registry: Arc<TenantRegistry>,
        cache: Arc<CacheFrontend>,
        identity: Arc<dyn IdentityService>,
        tenants: Arc<dyn TenantService>,
    ) -> Result<Self, String> {
        let guard_config = config.cache.guard_config();
        guard_config.validate()?;

        let shutdown = CancellationToken::new();
        let guard = Arc::new(StampedeGuard::new(Arc::clone(&cache), guard_config));
        let namespace = config.tenancy.shared_namespace.clone();

        let auth = AuthResolver::new(identity, tenants, Arc::clone(&guard), shutdown.clone());
        let redirector = PathRedirector::new(
            Arc::clone(&guard),
            Arc::clone(&registry),
            namespace,
            shutdown.clone(),
        );
        let limiter = RateLimiter::new(Arc::clone(cache.tiers()), &config.rate_limit);

        Ok(Self {
            config,
            registry,
            cache,
            guard,
            auth,
            redirector,
            limiter,
            shutdown,
        })
    }

    pub fn shared_namespace(&self) -> &str {
        &self.config.tenancy.shared_namespace
    }

    pub fn scope_for(&self, descriptor: &ResourceDescriptor) -> StoreScope {
        store_scope(descriptor)
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Cancels in-flight cache waits, then drops tenant bundles and the
    /// local cache tier.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        let tenants = self.registry.len();
        self.registry.clear();
        self.cache.clear_local();
        tracing::info!(tenants, "gateway context shut down");
    }
}

impl std::fmt::Debug for GatewayContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayContext")
            .field("tenants", &self.registry.tenants())
            .field("cache", &self.cache)
            .field("shutting_down", &self.is_shutting_down())
            .finish_non_exhaustive()
    }
}
