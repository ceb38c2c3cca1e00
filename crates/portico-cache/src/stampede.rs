//! Stampede-guarded read-through population.
//!
//! Per key class the guard moves through three states:
//!
//! - **idle**: no sentinel, no value
//! - **filling**: a sentinel is present, one caller is populating
//! - **ready**: the value is cached; the sentinel may already be gone
//!
//! The first caller to miss claims the class sentinel and populates. Everyone
//! else polls the data key on a short interval until the value shows up or the
//! poll deadline passes, then populates on their own. There is no distributed
//! lock: liveness comes from the sentinel TTL and the poll deadline, and
//! duplicate fills are harmless because `populate` is a pure upstream read.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::clock::{Clock, TokioClock};
use crate::error::GuardError;
use crate::frontend::{CacheFrontend, SENTINEL_PREFIX};
use crate::metrics;
use crate::store::StoreScope;

/// How wide a sentinel is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentinelScope {
    /// One sentinel per key class: concurrent misses on different keys of the
    /// same class queue behind one filler.
    #[default]
    PerClass,
    /// One sentinel per data key.
    PerKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardConfig {
    pub sentinel_ttl: Duration,
    pub data_ttl: Duration,
    pub poll_interval: Duration,
    pub poll_deadline: Duration,
    pub sentinel_scope: SentinelScope,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            sentinel_ttl: Duration::from_secs(280),
            data_ttl: Duration::from_secs(300),
            poll_interval: Duration::from_millis(100),
            poll_deadline: Duration::from_secs(1),
            sentinel_scope: SentinelScope::PerClass,
        }
    }
}

impl GuardConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.sentinel_ttl >= self.data_ttl {
            return Err("sentinel TTL must be shorter than data TTL".into());
        }
        if self.poll_interval.is_zero() {
            return Err("poll interval must be > 0".into());
        }
        if self.poll_interval > self.poll_deadline {
            return Err("poll interval must not exceed poll deadline".into());
        }
        Ok(())
    }
}

enum Wait<T> {
    Ready(T),
    Claimed(SentinelLease),
    DeadlineExpired,
}

/// Ownership of a claimed sentinel.
///
/// Dropped while still armed (populate failed, or the caller's future was
/// dropped) it releases the sentinel so waiters can take over early.
struct SentinelLease {
    frontend: Arc<CacheFrontend>,
    key: String,
    armed: bool,
}

impl SentinelLease {
    fn new(frontend: Arc<CacheFrontend>, key: String) -> Self {
        Self {
            frontend,
            key,
            armed: true,
        }
    }

    /// Leaves the sentinel to expire on its own.
    fn keep(mut self) {
        self.armed = false;
    }

    async fn release(mut self) {
        self.armed = false;
        self.frontend.release(&self.key).await;
    }
}

impl Drop for SentinelLease {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let frontend = Arc::clone(&self.frontend);
        let key = std::mem::take(&mut self.key);
        handle.spawn(async move {
            frontend.release(&key).await;
            tracing::debug!(sentinel = %key, "abandoned sentinel released");
        });
    }
}

/// Read-through cache that keeps upstream population to one call per key
/// class (best-effort, per instance).
pub struct StampedeGuard {
    frontend: Arc<CacheFrontend>,
    clock: Arc<dyn Clock>,
    config: GuardConfig,
}

impl StampedeGuard {
    pub fn new(frontend: Arc<CacheFrontend>, config: GuardConfig) -> Self {
        Self::with_clock(frontend, config, Arc::new(TokioClock))
    }

    pub fn with_clock(
        frontend: Arc<CacheFrontend>,
        config: GuardConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            frontend,
            clock,
            config,
        }
    }

    pub fn frontend(&self) -> &Arc<CacheFrontend> {
        &self.frontend
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    pub fn sentinel_key(&self, class: &str, data_key: &str) -> String {
        match self.config.sentinel_scope {
            SentinelScope::PerClass => format!("{SENTINEL_PREFIX}{class}"),
            SentinelScope::PerKey => format!("{SENTINEL_PREFIX}{class}-{data_key}"),
        }
    }

    /// Returns the cached value for `data_key`, populating it at most once
    /// per sentinel window.
    ///
    /// `populate` is only called on a miss and must be an idempotent upstream
    /// read. Its error is returned as-is and nothing is cached.
    pub async fn get_or_populate<T, E, F, Fut>(
        &self,
        class: &str,
        data_key: &str,
        scope: &StoreScope,
        populate: F,
    ) -> Result<T, GuardError<E>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.lookup(data_key, scope).await {
            metrics::record_fast_path(class);
            return Ok(value);
        }

        let sentinel = self.sentinel_key(class, data_key);
        let lease = match self.claim(&sentinel).await {
            Some(lease) => Some(lease),
            None => match self.wait_for(class, data_key, &sentinel, scope).await {
                Wait::Ready(value) => return Ok(value),
                Wait::Claimed(lease) => Some(lease),
                Wait::DeadlineExpired => None,
            },
        };

        self.fill(class, data_key, scope, lease, populate).await
    }

    /// Like [`get_or_populate`](Self::get_or_populate), but gives up with
    /// [`GuardError::Cancelled`] as soon as `cancel` fires.
    pub async fn get_or_populate_cancellable<T, E, F, Fut>(
        &self,
        class: &str,
        data_key: &str,
        scope: &StoreScope,
        cancel: &CancellationToken,
        populate: F,
    ) -> Result<T, GuardError<E>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(GuardError::Cancelled),
            result = self.get_or_populate(class, data_key, scope, populate) => result,
        }
    }

    async fn lookup<T: DeserializeOwned>(&self, data_key: &str, scope: &StoreScope) -> Option<T> {
        let bytes = self.frontend.get(data_key, scope).await?;
        match rmp_serde::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key = %data_key, error = %e, "undecodable cached value, treating as miss");
                None
            }
        }
    }

    async fn claim(&self, sentinel: &str) -> Option<SentinelLease> {
        self.frontend
            .try_claim(sentinel, self.config.sentinel_ttl)
            .await
            .then(|| SentinelLease::new(Arc::clone(&self.frontend), sentinel.to_string()))
    }

    async fn wait_for<T: DeserializeOwned>(
        &self,
        class: &str,
        data_key: &str,
        sentinel: &str,
        scope: &StoreScope,
    ) -> Wait<T> {
        metrics::record_follower_wait(class);
        let deadline = self.clock.now() + self.config.poll_deadline;

        loop {
            self.clock.sleep(self.config.poll_interval).await;

            if let Some(value) = self.lookup(data_key, scope).await {
                return Wait::Ready(value);
            }
            if let Some(lease) = self.claim(sentinel).await {
                tracing::debug!(class = %class, key = %data_key, "sentinel gone, taking over population");
                return Wait::Claimed(lease);
            }
            if self.clock.now() >= deadline {
                tracing::debug!(class = %class, key = %data_key, "poll deadline passed, populating");
                metrics::record_deadline_expiry(class);
                return Wait::DeadlineExpired;
            }
        }
    }

    async fn fill<T, E, F, Fut>(
        &self,
        class: &str,
        data_key: &str,
        scope: &StoreScope,
        lease: Option<SentinelLease>,
        populate: F,
    ) -> Result<T, GuardError<E>>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        metrics::record_population(class);

        let value = match populate().await {
            Ok(value) => value,
            Err(e) => {
                if let Some(lease) = lease {
                    lease.release().await;
                }
                return Err(GuardError::Upstream(e));
            }
        };

        match rmp_serde::to_vec(&value) {
            Ok(bytes) => {
                self.frontend
                    .put(data_key, bytes, self.config.data_ttl, scope)
                    .await
            }
            Err(e) => {
                tracing::warn!(key = %data_key, error = %e, "value not cacheable, returning uncached");
            }
        }

        if let Some(lease) = lease {
            lease.keep();
        }
        Ok(value)
    }
}

impl std::fmt::Debug for StampedeGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StampedeGuard")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
