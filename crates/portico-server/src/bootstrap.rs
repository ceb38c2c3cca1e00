//! Startup wiring: cache tiers, tenant bundles, rate limits.

use std::sync::Arc;

use anyhow::Context;
use portico_cache::{
    CacheFrontend, DistributedStore, LocalTier, MemoryStore, RedisStore, TierRouter,
};
use portico_core::{ServiceEndpoints, TenantKey, TenantRegistry, TenantService};

use crate::clients;
use crate::config::{AppConfig, RedisConfig};
use crate::context::{AppState, GatewayContext};

pub async fn build_context(config: AppConfig) -> anyhow::Result<AppState> {
    let http = reqwest::Client::builder()
        .timeout(config.services.timeout())
        .build()
        .context("failed to build HTTP client")?;

    let tiers = Arc::new(TierRouter::new(create_store(&config.redis).await));
    let cache = Arc::new(CacheFrontend::new(
        LocalTier::new(config.cache.local_max_entries),
        Arc::clone(&tiers),
    ));

    let registry = Arc::new(TenantRegistry::new());
    let shared_bundle = clients::http_bundle(&http, &config.services.endpoints)
        .map_err(anyhow::Error::msg)
        .context("invalid service endpoints")?;
    let identity = Arc::clone(shared_bundle.identity());
    let tenants = Arc::clone(shared_bundle.tenants());
    registry.add(
        shared_bundle,
        TenantKey::new(config.tenancy.shared_namespace.clone()),
    )?;

    register_dedicated(&http, &config, &registry, &tiers, tenants.as_ref()).await;

    let ctx = GatewayContext::new(config, registry, cache, identity, tenants)
        .map_err(anyhow::Error::msg)?;
    ctx.limiter.seed(&ctx.config.rate_limit.project_limits).await;

    tracing::info!(
        tenants = ctx.registry.len(),
        cache_mode = ctx.cache.stats().mode,
        rate_limit = ctx.limiter.is_enabled(),
        "gateway context ready"
    );
    Ok(Arc::new(ctx))
}

/// Shared distributed tier: Redis when enabled and reachable, otherwise an
/// in-process store.
pub async fn create_store(config: &RedisConfig) -> Arc<dyn DistributedStore> {
    if !config.enabled {
        tracing::info!("Redis disabled, using in-memory distributed tier");
        return Arc::new(MemoryStore::new());
    }

    match RedisStore::connect(&config.url, config.pool_size, config.timeout()).await {
        Ok(store) => {
            tracing::info!(url = %config.url, pool_size = config.pool_size, "Redis connected");
            Arc::new(store)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Redis unavailable, falling back to in-memory distributed tier");
            Arc::new(MemoryStore::new())
        }
    }
}

/// Registers a bundle (and optionally a cache instance) for each dedicated
/// project. A project that cannot be set up is logged and skipped; its
/// requests answer 503 until the next start.
async fn register_dedicated(
    http: &reqwest::Client,
    config: &AppConfig,
    registry: &TenantRegistry,
    tiers: &TierRouter,
    tenants: &dyn TenantService,
) {
    let projects = match tenants.dedicated_projects().await {
        Ok(projects) => projects,
        Err(e) => {
            tracing::warn!(error = %e, "could not list dedicated projects, serving shared tenant only");
            return;
        }
    };

    for project in projects {
        let endpoints = with_fallback(&project.endpoints, &config.services.endpoints);
        let bundle = match clients::http_bundle(http, &endpoints) {
            Ok(bundle) => bundle,
            Err(e) => {
                tracing::warn!(project_id = %project.project_id, error = %e, "skipping dedicated project");
                continue;
            }
        };
        if let Err(e) = registry.add(bundle, TenantKey::new(project.project_id.clone())) {
            tracing::warn!(project_id = %project.project_id, error = %e, "skipping dedicated project");
            continue;
        }

        if let Some(url) = project.redis_url.as_deref().filter(|u| !u.is_empty()) {
            match RedisStore::connect(url, config.redis.pool_size, config.redis.timeout()).await {
                Ok(store) => tiers.add_dedicated(project.project_id.clone(), Arc::new(store)),
                Err(e) => tracing::warn!(
                    project_id = %project.project_id,
                    error = %e,
                    "dedicated Redis unavailable, using shared tier"
                ),
            }
        }
        tracing::info!(project_id = %project.project_id, "dedicated project registered");
    }
}

/// Fills empty endpoint fields of a dedicated project from the shared ones.
pub fn with_fallback(own: &ServiceEndpoints, shared: &ServiceEndpoints) -> ServiceEndpoints {
    let pick = |own: &String, shared: &String| {
        if own.trim().is_empty() {
            shared.clone()
        } else {
            own.clone()
        }
    };
    ServiceEndpoints {
        identity_url: pick(&own.identity_url, &shared.identity_url),
        tenant_url: pick(&own.tenant_url, &shared.tenant_url),
        document_url: pick(&own.document_url, &shared.document_url),
        document_high_url: pick(&own.document_high_url, &shared.document_high_url),
        relational_url: pick(&own.relational_url, &shared.relational_url),
        notification_url: pick(&own.notification_url, &shared.notification_url),
        function_url: pick(&own.function_url, &shared.function_url),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedicated_endpoints_fall_back_to_shared() {
        let shared = crate::config::ServicesConfig::default().endpoints;
        let own = ServiceEndpoints {
            document_url: "http://dedicated-docs:1".into(),
            ..ServiceEndpoints::default()
        };

        let merged = with_fallback(&own, &shared);
        assert_eq!(merged.document_url, "http://dedicated-docs:1");
        assert_eq!(merged.identity_url, shared.identity_url);
        assert_eq!(merged.relational_url, shared.relational_url);
    }

    #[tokio::test]
    async fn test_disabled_redis_uses_memory_store() {
        let store = create_store(&RedisConfig::default()).await;
        assert_eq!(store.mode(), "memory");
    }

    #[tokio::test]
    async fn test_unreachable_redis_falls_back() {
        let config = RedisConfig {
            enabled: true,
            url: "redis://127.0.0.1:1".into(),
            timeout_ms: 200,
            ..RedisConfig::default()
        };
        let store = create_store(&config).await;
        assert_eq!(store.mode(), "memory");
    }

    #[tokio::test]
    async fn test_build_context_survives_unreachable_tenant_service() {
        let mut config = AppConfig::default();
        config.services.endpoints.tenant_url = "http://127.0.0.1:1".into();
        config.services.timeout_ms = 500;

        let ctx = build_context(config).await.unwrap();
        assert_eq!(ctx.registry.tenants(), vec![TenantKey::new("u-code")]);
    }
}
