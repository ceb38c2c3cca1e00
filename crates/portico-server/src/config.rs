use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use portico_cache::{GuardConfig, SentinelScope};
use portico_core::ServiceEndpoints;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub tenancy: TenancyConfig,
    /// Platform service endpoints
    #[serde(default)]
    pub services: ServicesConfig,
    /// Redis configuration (optional, for horizontal scaling)
    #[serde(default)]
    pub redis: RedisConfig,
    /// Cache and stampede guard configuration
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.request_timeout_ms == 0 {
            return Err("server.request_timeout_ms must be > 0".into());
        }
        if self.tenancy.shared_namespace.trim().is_empty() {
            return Err("tenancy.shared_namespace must not be empty".into());
        }

        let endpoints = &self.services.endpoints;
        for (name, url) in [
            ("identity_url", &endpoints.identity_url),
            ("tenant_url", &endpoints.tenant_url),
            ("document_url", &endpoints.document_url),
            ("relational_url", &endpoints.relational_url),
            ("notification_url", &endpoints.notification_url),
            ("function_url", &endpoints.function_url),
        ] {
            if url.trim().is_empty() {
                return Err(format!("services.{name} must be set"));
            }
        }
        if self.services.timeout_ms == 0 {
            return Err("services.timeout_ms must be > 0".into());
        }

        if self.redis.enabled && self.redis.url.trim().is_empty() {
            return Err("redis.url must be set when redis is enabled".into());
        }
        if self.cache.local_max_entries == 0 {
            return Err("cache.local_max_entries must be > 0".into());
        }
        self.cache
            .guard_config()
            .validate()
            .map_err(|e| format!("cache: {e}"))?;

        if self.rate_limit.window_ms == 0 || self.rate_limit.send_code_window_secs == 0 {
            return Err("rate_limit windows must be > 0".into());
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        let ip: std::net::IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(std::net::IpAddr::from([0, 0, 0, 0]));
        SocketAddr::from((ip, self.server.port))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Whole-request deadline. Dropping the handler also aborts cache waits.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}
fn default_request_timeout_ms() -> u64 {
    30_000
}
fn default_body_limit() -> usize {
    4 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_ms: default_request_timeout_ms(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenancyConfig {
    /// Registry key of the shared platform bundle.
    #[serde(default = "default_shared_namespace")]
    pub shared_namespace: String,
}

fn default_shared_namespace() -> String {
    "u-code".into()
}

impl Default for TenancyConfig {
    fn default() -> Self {
        Self {
            shared_namespace: default_shared_namespace(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    /// Per-call timeout for outbound service requests
    #[serde(default = "default_services_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(flatten)]
    pub endpoints: ServiceEndpoints,
}

fn default_services_timeout_ms() -> u64 {
    10_000
}

fn default_endpoints() -> ServiceEndpoints {
    ServiceEndpoints {
        identity_url: "http://localhost:9101".into(),
        tenant_url: "http://localhost:9102".into(),
        document_url: "http://localhost:9103".into(),
        document_high_url: String::new(),
        relational_url: "http://localhost:9104".into(),
        notification_url: "http://localhost:9105".into(),
        function_url: "http://localhost:9106".into(),
    }
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_services_timeout_ms(),
            endpoints: default_endpoints(),
        }
    }
}

impl ServicesConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Redis configuration for the distributed cache tier.
///
/// When disabled, or when Redis is unreachable at startup, the gateway runs
/// with an in-process store instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Enable Redis (gracefully degrades without it)
    #[serde(default)]
    pub enabled: bool,

    /// Redis connection URL (e.g., "redis://localhost:6379")
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Connection pool size
    #[serde(default = "default_redis_pool_size")]
    pub pool_size: usize,

    /// Connection timeout in milliseconds
    #[serde(default = "default_redis_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_redis_url() -> String {
    "redis://localhost:6379".into()
}
fn default_redis_pool_size() -> usize {
    10
}
fn default_redis_timeout_ms() -> u64 {
    5000
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_redis_url(),
            pool_size: default_redis_pool_size(),
            timeout_ms: default_redis_timeout_ms(),
        }
    }
}

impl RedisConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Local tier capacity, in entries
    #[serde(default = "default_local_max_entries")]
    pub local_max_entries: u64,
    /// TTL of cached lookups
    #[serde(default = "default_data_ttl_secs")]
    pub data_ttl_secs: u64,
    /// TTL of wait sentinels; must be shorter than `data_ttl_secs`
    #[serde(default = "default_sentinel_ttl_secs")]
    pub sentinel_ttl_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// How long a waiter polls before populating on its own
    #[serde(default = "default_poll_deadline_ms")]
    pub poll_deadline_ms: u64,
    #[serde(default)]
    pub sentinel_scope: SentinelScope,
}

fn default_local_max_entries() -> u64 {
    portico_cache::local::DEFAULT_MAX_ENTRIES
}
fn default_data_ttl_secs() -> u64 {
    300
}
fn default_sentinel_ttl_secs() -> u64 {
    280
}
fn default_poll_interval_ms() -> u64 {
    100
}
fn default_poll_deadline_ms() -> u64 {
    1000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            local_max_entries: default_local_max_entries(),
            data_ttl_secs: default_data_ttl_secs(),
            sentinel_ttl_secs: default_sentinel_ttl_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            poll_deadline_ms: default_poll_deadline_ms(),
            sentinel_scope: SentinelScope::default(),
        }
    }
}

impl CacheConfig {
    pub fn guard_config(&self) -> GuardConfig {
        GuardConfig {
            sentinel_ttl: Duration::from_secs(self.sentinel_ttl_secs),
            data_ttl: Duration::from_secs(self.data_ttl_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            poll_deadline: Duration::from_millis(self.poll_deadline_ms),
            sentinel_scope: self.sentinel_scope,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Requests per window, by project id. Projects without an entry are not
    /// limited.
    #[serde(default)]
    pub project_limits: HashMap<String, u64>,
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
    /// `POST /v2/send-code` requests per recipient per window
    #[serde(default = "default_send_code_limit")]
    pub send_code_limit: u64,
    #[serde(default = "default_send_code_window_secs")]
    pub send_code_window_secs: u64,
}

fn default_window_ms() -> u64 {
    1000
}
fn default_send_code_limit() -> u64 {
    5
}
fn default_send_code_window_secs() -> u64 {
    60
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            project_limits: HashMap::new(),
            window_ms: default_window_ms(),
            send_code_limit: default_send_code_limit(),
            send_code_window_secs: default_send_code_window_secs(),
        }
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    pub const DEFAULT_CONFIG_PATH: &str = "portico.toml";

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_PATH));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., PORTICO__SERVER__PORT=9090
        builder = builder.add_source(
            Environment::with_prefix("PORTICO")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}
