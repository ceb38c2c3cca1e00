//! Two-tier cache frontend.

use std::sync::Arc;
use std::time::Duration;

use crate::local::LocalTier;
use crate::metrics;
use crate::store::{DistributedStore, StoreScope, TierRouter};

/// Keys with this prefix are wait sentinels.
pub const SENTINEL_PREFIX: &str = "WAIT-";

/// TTL given to a sentinel promoted from the distributed tier.
const PROMOTED_SENTINEL_TTL: Duration = Duration::from_secs(1);

/// What a key is for, which decides the tier it is written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPurpose {
    /// Short-lived "population in progress" marker. Local only.
    Sentinel,
    /// Derived value of upstream truth. Distributed, with a local near copy.
    Durable,
}

impl KeyPurpose {
    pub fn of(key: &str) -> Self {
        if key.starts_with(SENTINEL_PREFIX) {
            Self::Sentinel
        } else {
            Self::Durable
        }
    }
}

/// Cache statistics (local tier only).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub local_entries: u64,
    pub dedicated_stores: usize,
    pub mode: &'static str,
}

/// Two-tier cache: local LRU in front of a per-tenant distributed store.
///
/// ## Lookup Order
///
/// 1. Local tier
/// 2. Distributed tier selected by [`StoreScope`]
///
/// A distributed hit is copied into the local tier only for sentinels.
///
/// ## Write Strategy
///
/// - **Sentinel**: local tier only
/// - **Durable**: local tier (same TTL), then the distributed tier. The
///   distributed write is fire-and-forget.
pub struct CacheFrontend {
    local: LocalTier,
    tiers: Arc<TierRouter>,
}

impl CacheFrontend {
    pub fn new(local: LocalTier, tiers: Arc<TierRouter>) -> Self {
        Self { local, tiers }
    }

    pub fn tiers(&self) -> &Arc<TierRouter> {
        &self.tiers
    }

    pub fn local(&self) -> &LocalTier {
        &self.local
    }

    pub async fn get(&self, key: &str, scope: &StoreScope) -> Option<Arc<Vec<u8>>> {
        if let Some(data) = self.local.get(key).await {
            tracing::trace!(key = %key, "cache hit (local)");
            metrics::record_cache_hit("local");
            return Some(data);
        }

        let store = self.tiers.store_for(scope);
        match store.get(key).await {
            Ok(Some(data)) => {
                tracing::trace!(key = %key, mode = store.mode(), "cache hit (distributed)");
                metrics::record_cache_hit("distributed");
                let data = Arc::new(data);
                if KeyPurpose::of(key) == KeyPurpose::Sentinel {
                    self.local
                        .insert(key, Arc::clone(&data), PROMOTED_SENTINEL_TTL)
                        .await;
                }
                Some(data)
            }
            Ok(None) => {
                metrics::record_cache_miss();
                None
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "distributed cache GET error");
                metrics::record_cache_miss();
                None
            }
        }
    }

    pub async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration, scope: &StoreScope) {
        let data = Arc::new(value);
        self.local.insert(key, Arc::clone(&data), ttl).await;

        if KeyPurpose::of(key) == KeyPurpose::Sentinel {
            return;
        }

        let store = self.tiers.store_for(scope);
        let key = key.to_string();
        tokio::spawn(async move {
            if let Err(e) = store.set(&key, &data, Some(ttl)).await {
                tracing::warn!(key = %key, error = %e, "distributed cache SET error");
                metrics::record_write_error();
            } else {
                tracing::trace!(key = %key, ttl_ms = ttl.as_millis() as u64, "cache set (local+distributed)");
            }
        });
    }

    /// Atomically writes `sentinel` if no live entry exists. Returns whether
    /// the caller now holds it.
    pub async fn try_claim(&self, sentinel: &str, ttl: Duration) -> bool {
        self.local
            .insert_if_absent(sentinel, Arc::new(sentinel.as_bytes().to_vec()), ttl)
            .await
    }

    pub async fn release(&self, sentinel: &str) {
        self.local.remove(sentinel).await;
    }

    /// Removes a key from both tiers. The distributed delete is
    /// fire-and-forget.
    pub async fn delete(&self, key: &str, scope: &StoreScope) {
        self.local.remove(key).await;

        let store = self.tiers.store_for(scope);
        let key = key.to_string();
        tokio::spawn(async move {
            if let Err(e) = store.delete(&key).await {
                tracing::warn!(key = %key, error = %e, "distributed cache DEL error");
            }
        });
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            local_entries: self.local.entry_count(),
            dedicated_stores: self.tiers.dedicated_count(),
            mode: self.tiers.shared().mode(),
        }
    }

    /// Health check for the distributed instance serving `scope`.
    pub async fn is_distributed_available(&self, scope: &StoreScope) -> bool {
        self.tiers.store_for(scope).ping().await.is_ok()
    }

    /// Drops every local entry. Used at shutdown.
    pub fn clear_local(&self) {
        self.local.clear();
    }
}

impl std::fmt::Debug for CacheFrontend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheFrontend")
            .field("stats", &self.stats())
            .finish()
    }
}

/// Convenience for tests and single-instance setups: a frontend over one
/// shared store.
pub fn single_store(local: LocalTier, store: Arc<dyn DistributedStore>) -> CacheFrontend {
    CacheFrontend::new(local, Arc::new(TierRouter::new(store)))
}
