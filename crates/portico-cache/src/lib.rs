//! Two-tier caching for the Portico gateway.
//!
//! ## Architecture
//!
//! - **Local tier (moka)**: in-process, bounded LRU with per-entry TTL.
//!   Authoritative for short-lived wait sentinels.
//! - **Distributed tier**: a TTL-keyed store shared across gateway instances
//!   (Redis, or an in-memory stand-in when Redis is disabled). Authoritative
//!   for durable derived values. Dedicated tenants may bring their own
//!   instance.
//! - **StampedeGuard**: read-through population on top of both tiers that
//!   keeps at most one upstream call in flight per key class, best-effort.
//!
//! ```text
//! get_or_populate → local → distributed → sentinel claim → populate()
//!                                              ↓
//!                                  followers poll until data or deadline
//! ```
//!
//! ## Graceful Degradation
//!
//! Distributed writes are fire-and-forget and distributed read errors count as
//! misses, so an unreachable store costs latency, never correctness.

pub mod clock;
pub mod error;
pub mod frontend;
pub mod local;
pub mod metrics;
pub mod stampede;
pub mod store;

pub use clock::{Clock, TokioClock};
pub use error::{GuardError, StoreError};
pub use frontend::{CacheFrontend, CacheStats, KeyPurpose, SENTINEL_PREFIX, single_store};
pub use local::LocalTier;
pub use stampede::{GuardConfig, SentinelScope, StampedeGuard};
pub use store::{DistributedStore, MemoryStore, RedisStore, StoreScope, TierRouter};
