//! In-process cache tier.

use std::sync::Arc;
use std::time::{Duration, Instant as WallInstant};

use moka::Expiry;
use moka::future::Cache;
use moka::ops::compute::{CompResult, Op};
use moka::policy::EvictionPolicy;
use tokio::time::Instant;

use crate::clock::{Clock, TokioClock};

/// Default local tier capacity, in entries.
pub const DEFAULT_MAX_ENTRIES: u64 = 10_000;

/// A locally cached value.
///
/// The data is wrapped in `Arc` so hits hand out a cheap clone.
#[derive(Clone, Debug)]
pub struct LocalEntry {
    pub data: Arc<Vec<u8>>,
    pub ttl: Duration,
    /// Deadline on the tier's [`Clock`]. Authoritative for reads.
    pub expires_at: Instant,
}

impl LocalEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Lets moka reclaim memory once an entry's TTL has also passed on the wall
/// clock. Whether an entry is still live is decided by `expires_at`.
struct EntryTtl;

impl Expiry<String, LocalEntry> for EntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &LocalEntry,
        _created_at: WallInstant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &LocalEntry,
        _updated_at: WallInstant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Bounded LRU with per-entry TTL. An entry leaves on capacity pressure or
/// TTL expiry, whichever comes first. Expiry is measured on the injected
/// [`Clock`], so paused tokio time drives it in tests.
#[derive(Clone)]
pub struct LocalTier {
    cache: Cache<String, LocalEntry>,
    clock: Arc<dyn Clock>,
}

impl LocalTier {
    pub fn new(max_entries: u64) -> Self {
        Self::with_clock(max_entries, Arc::new(TokioClock))
    }

    pub fn with_clock(max_entries: u64, clock: Arc<dyn Clock>) -> Self {
        let cache = Cache::builder()
            .name("portico-local")
            .max_capacity(max_entries)
            .eviction_policy(EvictionPolicy::lru())
            .expire_after(EntryTtl)
            .build();
        Self { cache, clock }
    }

    fn entry(&self, data: Arc<Vec<u8>>, ttl: Duration) -> LocalEntry {
        LocalEntry {
            data,
            ttl,
            expires_at: self.clock.now() + ttl,
        }
    }

    pub async fn get(&self, key: &str) -> Option<Arc<Vec<u8>>> {
        let entry = self.cache.get(key).await?;
        entry.is_live(self.clock.now()).then_some(entry.data)
    }

    pub async fn insert(&self, key: &str, data: Arc<Vec<u8>>, ttl: Duration) {
        let entry = self.entry(data, ttl);
        self.cache.insert(key.to_string(), entry).await;
    }

    /// Inserts only if no live entry exists. An expired entry counts as
    /// absent and is replaced. Returns whether this call inserted.
    pub async fn insert_if_absent(&self, key: &str, data: Arc<Vec<u8>>, ttl: Duration) -> bool {
        let now = self.clock.now();
        let fresh = self.entry(data, ttl);
        let result = self
            .cache
            .entry(key.to_string())
            .and_compute_with(move |current| {
                let live = current.is_some_and(|e| e.value().is_live(now));
                async move {
                    if live { Op::Nop } else { Op::Put(fresh) }
                }
            })
            .await;
        matches!(result, CompResult::Inserted(_) | CompResult::ReplacedWith(_))
    }

    pub async fn remove(&self, key: &str) {
        self.cache.invalidate(key).await;
    }

    pub fn clear(&self) {
        self.cache.invalidate_all();
    }

    /// Approximate; pending evictions are applied lazily.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Applies pending evictions and expirations now.
    pub async fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks().await;
    }
}

impl Default for LocalTier {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}
