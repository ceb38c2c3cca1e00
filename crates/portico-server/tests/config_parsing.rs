use std::{env, fs};

use portico_cache::SentinelScope;
use portico_server::config::loader::load_config;

#[test]
fn config_parsing_and_env_overrides_and_validation() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("portico.toml");

    let toml_content = r#"
[server]
host = "127.0.0.1"
port = 8181
request_timeout_ms = 5000

[logging]
level = "debug"

[tenancy]
shared_namespace = "shared"

[services]
timeout_ms = 2000
identity_url = "http://identity.internal:9101"
tenant_url = "http://tenant.internal:9102"
document_url = "http://docs.internal:9103"
relational_url = "http://rel.internal:9104"
notification_url = "http://notify.internal:9105"
function_url = "http://fn.internal:9106"

[cache]
data_ttl_secs = 120
sentinel_ttl_secs = 100
sentinel_scope = "per_key"

[rate_limit]
enabled = true
send_code_limit = 3

[rate_limit.project_limits]
p-1 = 50
"#;
    fs::write(&path, toml_content).expect("write toml");

    // 1) File values land in their sections
    let cfg = load_config(path.to_str()).expect("should parse config");
    assert_eq!(cfg.server.port, 8181);
    assert_eq!(cfg.logging.level.to_ascii_lowercase(), "debug");
    assert_eq!(cfg.tenancy.shared_namespace, "shared");
    assert_eq!(cfg.services.timeout_ms, 2000);
    assert_eq!(
        cfg.services.endpoints.identity_url,
        "http://identity.internal:9101"
    );
    assert_eq!(cfg.cache.sentinel_scope, SentinelScope::PerKey);
    assert_eq!(cfg.cache.poll_interval_ms, 100);
    assert!(cfg.rate_limit.enabled);
    assert_eq!(cfg.rate_limit.send_code_limit, 3);
    assert_eq!(cfg.rate_limit.project_limits.get("p-1"), Some(&50));
    assert!(!cfg.redis.enabled);

    // 2) Env override should win over file
    unsafe {
        env::set_var("PORTICO__CACHE__POLL_DEADLINE_MS", "2500");
    }
    let cfg_env = load_config(path.to_str()).expect("should parse config with env overrides");
    assert_eq!(cfg_env.cache.poll_deadline_ms, 2500);
    unsafe {
        env::remove_var("PORTICO__CACHE__POLL_DEADLINE_MS");
    }

    // 3) Sentinel outliving its data is rejected
    let invalid_path = dir.path().join("invalid.toml");
    let invalid_toml = r#"
[cache]
data_ttl_secs = 60
sentinel_ttl_secs = 90
"#;
    fs::write(&invalid_path, invalid_toml).expect("write invalid toml");
    let err = load_config(invalid_path.to_str()).expect_err("expected validation error");
    assert!(err.starts_with("cache:"), "{err}");
}

#[test]
fn missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("absent.toml");

    let cfg = load_config(path.to_str()).expect("defaults are valid");
    assert_eq!(cfg.tenancy.shared_namespace, "u-code");
    assert_eq!(cfg.cache.data_ttl_secs, 300);
    assert_eq!(cfg.cache.sentinel_ttl_secs, 280);
    assert_eq!(cfg.rate_limit.send_code_limit, 5);
}
