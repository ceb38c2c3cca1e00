//! Distributed tier: a TTL-keyed store shared across gateway instances.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use deadpool_redis::{Pool, PoolConfig, Runtime, Timeouts};
use redis::AsyncCommands;
use tokio::time::Instant;

use crate::error::StoreError;

/// Wire contract of the distributed tier: string key to opaque value with
/// optional TTL, plus the counter primitives used by rate limiting.
#[async_trait]
pub trait DistributedStore: Send + Sync {
    /// Short name for logs and stats.
    fn mode(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Writes a value; `None` keeps it until deleted.
    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Increments an integer value, creating it at zero first. Returns the
    /// new value.
    async fn incr(&self, key: &str, by: i64) -> Result<i64, StoreError>;

    /// Sets a TTL on an existing key. Returns false if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Remaining TTL of a key. `None` when the key is absent or never
    /// expires.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

// =============================================================================
// Redis
// =============================================================================

/// Redis-backed store over a deadpool connection pool.
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
}

impl RedisStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Builds a pool and checks that a connection can be made.
    pub async fn connect(
        url: &str,
        pool_size: usize,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let mut config = deadpool_redis::Config::from_url(url);
        let mut pool_config = PoolConfig::new(pool_size);
        pool_config.timeouts = Timeouts {
            wait: Some(timeout),
            create: Some(timeout),
            recycle: Some(timeout),
        };
        config.pool = Some(pool_config);

        let pool = config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| StoreError::Pool(e.to_string()))?;

        let store = Self::new(pool);
        store.ping().await?;
        Ok(store)
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Pool(e.to_string()))
    }
}

#[async_trait]
impl DistributedStore for RedisStore {
    fn mode(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut conn = self.conn().await?;
        Ok(conn.get::<_, Option<Vec<u8>>>(key).await?)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        match ttl {
            Some(ttl) => {
                let millis = ttl.as_millis().max(1) as u64;
                conn.pset_ex::<_, _, ()>(key, value, millis).await?;
            }
            None => conn.set::<_, _, ()>(key, value).await?,
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn incr(&self, key: &str, by: i64) -> Result<i64, StoreError> {
        let mut conn = self.conn().await?;
        Ok(conn.incr::<_, _, i64>(key, by).await?)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        let millis = ttl.as_millis().max(1) as i64;
        Ok(conn.pexpire::<_, bool>(key, millis).await?)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let mut conn = self.conn().await?;
        // PTTL: -2 for a missing key, -1 for a key without expiry.
        let millis = conn.pttl::<_, i64>(key).await?;
        Ok(u64::try_from(millis).ok().map(Duration::from_millis))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}

// =============================================================================
// In-memory
// =============================================================================

#[derive(Debug, Clone)]
struct MemoryValue {
    data: Vec<u8>,
    expires_at: Option<Instant>,
}

impl MemoryValue {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Process-local stand-in for the distributed tier.
///
/// Used when Redis is disabled or unreachable, and in tests. Expiry follows
/// the tokio clock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, MemoryValue>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| !e.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DistributedStore for MemoryStore {
    fn mode(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.data.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove_if(key, |_, v| v.is_expired(now));
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), StoreError> {
        self.entries.insert(
            key.to_string(),
            MemoryValue {
                data: value.to_vec(),
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn incr(&self, key: &str, by: i64) -> Result<i64, StoreError> {
        let now = Instant::now();
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| MemoryValue {
                data: b"0".to_vec(),
                expires_at: None,
            });
        if entry.is_expired(now) {
            entry.data = b"0".to_vec();
            entry.expires_at = None;
        }

        let current = std::str::from_utf8(&entry.data)
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(|| StoreError::NotAnInteger(key.to_string()))?;
        let next = current + by;
        entry.data = next.to_string().into_bytes();
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let now = Instant::now();
        match self.entries.get_mut(key) {
            Some(mut entry) if !entry.is_expired(now) => {
                entry.expires_at = Some(now + ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let now = Instant::now();
        Ok(self
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .and_then(|entry| entry.expires_at)
            .map(|at| at.saturating_duration_since(now)))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

// =============================================================================
// Per-tenant routing
// =============================================================================

/// Which distributed instance a key lives in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StoreScope {
    Shared,
    Dedicated(String),
}

impl StoreScope {
    pub fn dedicated(project_id: impl Into<String>) -> Self {
        Self::Dedicated(project_id.into())
    }
}

/// Selects the distributed instance for a tenant: the shared one, or the
/// dedicated project's own.
pub struct TierRouter {
    shared: Arc<dyn DistributedStore>,
    dedicated: DashMap<String, Arc<dyn DistributedStore>>,
}

impl TierRouter {
    pub fn new(shared: Arc<dyn DistributedStore>) -> Self {
        Self {
            shared,
            dedicated: DashMap::new(),
        }
    }

    pub fn add_dedicated(&self, project_id: impl Into<String>, store: Arc<dyn DistributedStore>) {
        self.dedicated.insert(project_id.into(), store);
    }

    pub fn remove_dedicated(&self, project_id: &str) -> bool {
        self.dedicated.remove(project_id).is_some()
    }

    pub fn shared(&self) -> &Arc<dyn DistributedStore> {
        &self.shared
    }

    /// Unknown dedicated projects fall back to the shared instance.
    pub fn store_for(&self, scope: &StoreScope) -> Arc<dyn DistributedStore> {
        match scope {
            StoreScope::Shared => Arc::clone(&self.shared),
            StoreScope::Dedicated(project_id) => self
                .dedicated
                .get(project_id)
                .map(|store| Arc::clone(store.value()))
                .unwrap_or_else(|| Arc::clone(&self.shared)),
        }
    }

    pub fn dedicated_count(&self) -> usize {
        self.dedicated.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_memory_store_expires_values() {
        let store = MemoryStore::new();
        store
            .set("k", b"v", Some(Duration::from_secs(5)))
            .await
            .unwrap();
        store.set("forever", b"v", None).await.unwrap();

        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));
        tokio::time::advance(Duration::from_secs(6)).await;

        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.get("forever").await.unwrap(), Some(b"v".to_vec()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_store_counter_window() {
        let store = MemoryStore::new();
        assert_eq!(store.incr("c", 1).await.unwrap(), 1);
        assert!(store.expire("c", Duration::from_secs(1)).await.unwrap());
        assert_eq!(store.incr("c", 1).await.unwrap(), 2);

        tokio::time::advance(Duration::from_millis(1100)).await;
        assert_eq!(store.incr("c", 1).await.unwrap(), 1);
        assert!(!store.expire("missing", Duration::from_secs(1)).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_store_reports_remaining_ttl() {
        let store = MemoryStore::new();
        store
            .set("k", b"v", Some(Duration::from_secs(10)))
            .await
            .unwrap();
        store.incr("counter", 1).await.unwrap();

        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(store.ttl("k").await.unwrap(), Some(Duration::from_secs(6)));
        assert_eq!(store.ttl("counter").await.unwrap(), None);
        assert_eq!(store.ttl("missing").await.unwrap(), None);

        tokio::time::advance(Duration::from_secs(7)).await;
        assert_eq!(store.ttl("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_store_incr_rejects_non_integer() {
        let store = MemoryStore::new();
        store.set("k", b"nope", None).await.unwrap();
        assert!(matches!(
            store.incr("k", 1).await,
            Err(StoreError::NotAnInteger(_))
        ));
    }

    #[tokio::test]
    async fn test_router_falls_back_to_shared() {
        let shared = Arc::new(MemoryStore::new());
        let dedicated = Arc::new(MemoryStore::new());
        let router = TierRouter::new(shared.clone());
        router.add_dedicated("p-1", dedicated.clone());

        router
            .store_for(&StoreScope::dedicated("p-1"))
            .set("k", b"d", None)
            .await
            .unwrap();
        router
            .store_for(&StoreScope::dedicated("unknown"))
            .set("k", b"s", None)
            .await
            .unwrap();

        assert_eq!(dedicated.get("k").await.unwrap(), Some(b"d".to_vec()));
        assert_eq!(shared.get("k").await.unwrap(), Some(b"s".to_vec()));
        assert_eq!(router.dedicated_count(), 1);
    }
}
