//! Fixed-window rate limiting on the distributed tier.
//!
//! Per project: the limit lives at `rate_limit:{project}:limit` and the
//! window counter at `rate_limit:{project}:count`. The counter gets its TTL on
//! the first hit of a window. A request that would be rejected first checks
//! that the counter still has a TTL and restarts the window if it lost one,
//! so a failed `expire` cannot block a project for good. A project without a
//! limit key is not limited. Store failures never reject a request.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use portico_cache::{DistributedStore, StoreError, StoreScope, TierRouter};
use portico_core::RequestContext;

use super::error::GatewayError;
use super::store_scope;
use crate::config::RateLimitConfig;
use crate::context::AppState;
use crate::metrics;

pub struct RateLimiter {
    tiers: Arc<TierRouter>,
    enabled: bool,
    window: Duration,
    send_code_limit: u64,
    send_code_window: Duration,
}

impl RateLimiter {
    pub fn new(tiers: Arc<TierRouter>, config: &RateLimitConfig) -> Self {
        Self {
            tiers,
            enabled: config.enabled,
            window: Duration::from_millis(config.window_ms),
            send_code_limit: config.send_code_limit,
            send_code_window: Duration::from_secs(config.send_code_window_secs),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn limit_key(project_id: &str) -> String {
        format!("rate_limit:{project_id}:limit")
    }

    pub fn count_key(project_id: &str) -> String {
        format!("rate_limit:{project_id}:count")
    }

    /// Writes per-project limits into the store serving each project.
    pub async fn seed(&self, limits: &HashMap<String, u64>) {
        for (project_id, limit) in limits {
            let store = self.tiers.store_for(&StoreScope::dedicated(project_id.clone()));
            let key = Self::limit_key(project_id);
            match store.set(&key, limit.to_string().as_bytes(), None).await {
                Ok(()) => tracing::debug!(project_id = %project_id, limit, "rate limit seeded"),
                Err(e) => {
                    tracing::warn!(project_id = %project_id, error = %e, "failed to seed rate limit")
                }
            }
        }
    }

    pub async fn allow_project(&self, project_id: &str, scope: &StoreScope) -> bool {
        if !self.enabled {
            return true;
        }
        let store = self.tiers.store_for(scope);
        match self.check_project(store.as_ref(), project_id).await {
            Ok(allowed) => allowed,
            Err(e) => {
                tracing::warn!(project_id = %project_id, error = %e, "rate limit check failed, allowing");
                true
            }
        }
    }

    async fn check_project(
        &self,
        store: &dyn DistributedStore,
        project_id: &str,
    ) -> Result<bool, StoreError> {
        let Some(raw) = store.get(&Self::limit_key(project_id)).await? else {
            return Ok(true);
        };
        let Some(limit) = std::str::from_utf8(&raw)
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok())
        else {
            tracing::warn!(project_id = %project_id, "rate limit value is not a number, ignoring");
            return Ok(true);
        };

        within_window_limit(store, &Self::count_key(project_id), self.window, limit).await
    }

    /// Code deliveries per recipient per window.
    pub async fn allow_send_code(&self, recipient: &str) -> bool {
        if !self.enabled {
            return true;
        }
        let store = self.tiers.shared();
        let key = format!("rate_limit:send-code:{recipient}");
        match within_window_limit(store.as_ref(), &key, self.send_code_window, self.send_code_limit)
            .await
        {
            Ok(allowed) => allowed,
            Err(e) => {
                tracing::warn!(error = %e, "send-code rate limit check failed, allowing");
                true
            }
        }
    }
}

/// Counts one hit against `key` and reports whether it stays within `limit`.
async fn within_window_limit(
    store: &dyn DistributedStore,
    key: &str,
    window: Duration,
    limit: u64,
) -> Result<bool, StoreError> {
    let count = store.incr(key, 1).await?.max(0) as u64;
    if count == 1 {
        store.expire(key, window).await?;
    } else if count > limit && store.ttl(key).await?.is_none() {
        tracing::warn!(key = %key, count, "window counter had no TTL, restarting window");
        store.expire(key, window).await?;
    }
    Ok(count <= limit)
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("enabled", &self.enabled)
            .field("window", &self.window)
            .field("send_code_limit", &self.send_code_limit)
            .finish_non_exhaustive()
    }
}

/// Rejects requests over their project's limit. Runs after authentication.
pub async fn project_limit(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if let Some(ctx) = req.extensions().get::<RequestContext>() {
        let scope = store_scope(&ctx.resource);
        if !state.limiter.allow_project(&ctx.project_id, &scope).await {
            tracing::info!(project_id = %ctx.project_id, "project rate limit exceeded");
            metrics::record_rate_limited("project");
            return GatewayError::TooManyRequests("project request limit exceeded".into())
                .into_response();
        }
    }
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use portico_cache::MemoryStore;

    /// Memory store whose first `expire` call fails.
    #[derive(Default)]
    struct FailingFirstExpire {
        inner: MemoryStore,
        expire_calls: AtomicUsize,
    }

    #[async_trait]
    impl DistributedStore for FailingFirstExpire {
        fn mode(&self) -> &'static str {
            "failing-first-expire"
        }

        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
            self.inner.get(key).await
        }

        async fn set(
            &self,
            key: &str,
            value: &[u8],
            ttl: Option<Duration>,
        ) -> Result<(), StoreError> {
            self.inner.set(key, value, ttl).await
        }

        async fn delete(&self, key: &str) -> Result<(), StoreError> {
            self.inner.delete(key).await
        }

        async fn incr(&self, key: &str, by: i64) -> Result<i64, StoreError> {
            self.inner.incr(key, by).await
        }

        async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
            if self.expire_calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(StoreError::Pool("connection reset".into()));
            }
            self.inner.expire(key, ttl).await
        }

        async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
            self.inner.ttl(key).await
        }

        async fn ping(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn limiter(enabled: bool) -> (RateLimiter, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let tiers = Arc::new(TierRouter::new(store.clone()));
        let config = RateLimitConfig {
            enabled,
            send_code_limit: 2,
            ..RateLimitConfig::default()
        };
        (RateLimiter::new(tiers, &config), store)
    }

    #[tokio::test(start_paused = true)]
    async fn test_project_limit_resets_each_window() {
        let (limiter, _) = limiter(true);
        limiter
            .seed(&HashMap::from([("p-1".to_string(), 3)]))
            .await;

        for _ in 0..3 {
            assert!(limiter.allow_project("p-1", &StoreScope::Shared).await);
        }
        assert!(!limiter.allow_project("p-1", &StoreScope::Shared).await);

        tokio::time::advance(Duration::from_millis(1100)).await;
        assert!(limiter.allow_project("p-1", &StoreScope::Shared).await);
    }

    #[tokio::test]
    async fn test_project_without_limit_is_allowed() {
        let (limiter, store) = limiter(true);
        for _ in 0..50 {
            assert!(limiter.allow_project("free", &StoreScope::Shared).await);
        }
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_limiter_allows_everything() {
        let (limiter, _) = limiter(false);
        limiter
            .seed(&HashMap::from([("p-1".to_string(), 0)]))
            .await;
        assert!(limiter.allow_project("p-1", &StoreScope::Shared).await);
        assert!(limiter.allow_send_code("a@b.c").await);
    }

    #[tokio::test]
    async fn test_send_code_limit_per_recipient() {
        let (limiter, _) = limiter(true);
        assert!(limiter.allow_send_code("a@b.c").await);
        assert!(limiter.allow_send_code("a@b.c").await);
        assert!(!limiter.allow_send_code("a@b.c").await);
        assert!(limiter.allow_send_code("other@b.c").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_counter_that_lost_its_ttl_recovers_next_window() {
        let store = Arc::new(FailingFirstExpire::default());
        let tiers = Arc::new(TierRouter::new(store.clone()));
        let config = RateLimitConfig {
            enabled: true,
            ..RateLimitConfig::default()
        };
        let limiter = RateLimiter::new(tiers, &config);
        limiter
            .seed(&HashMap::from([("p-1".to_string(), 2)]))
            .await;

        // The first hit's expire fails: allowed, but the counter has no TTL.
        assert!(limiter.allow_project("p-1", &StoreScope::Shared).await);
        assert_eq!(store.ttl(&RateLimiter::count_key("p-1")).await.unwrap(), None);
        assert!(limiter.allow_project("p-1", &StoreScope::Shared).await);
        assert!(!limiter.allow_project("p-1", &StoreScope::Shared).await);
        assert!(
            store
                .ttl(&RateLimiter::count_key("p-1"))
                .await
                .unwrap()
                .is_some()
        );

        tokio::time::advance(Duration::from_millis(config.window_ms + 100)).await;
        assert!(limiter.allow_project("p-1", &StoreScope::Shared).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_code_window_resets() {
        let (limiter, _) = limiter(true);
        assert!(limiter.allow_send_code("a@b.c").await);
        assert!(limiter.allow_send_code("a@b.c").await);
        assert!(!limiter.allow_send_code("a@b.c").await);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(limiter.allow_send_code("a@b.c").await);
    }

    #[tokio::test]
    async fn test_garbage_limit_is_ignored() {
        let (limiter, store) = limiter(true);
        store
            .set(&RateLimiter::limit_key("p-1"), b"lots", None)
            .await
            .unwrap();
        assert!(limiter.allow_project("p-1", &StoreScope::Shared).await);
    }
}
