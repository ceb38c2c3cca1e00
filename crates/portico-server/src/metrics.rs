//! Prometheus metrics for the gateway.
//!
//! HTTP request counters and latency, authentication and redirect outcomes,
//! and rate-limit rejections. Cache and stampede-guard counters are recorded
//! by `portico-cache` through the same `metrics` facade.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub mod names {
    pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";

    pub const AUTH_RESOLUTIONS_TOTAL: &str = "portico_auth_resolutions_total";
    pub const REDIRECTS_TOTAL: &str = "portico_redirects_total";
    pub const RATE_LIMITED_TOTAL: &str = "portico_rate_limited_total";
}

/// Installs the Prometheus recorder.
///
/// Returns `false` if it was already installed.
pub fn init_metrics() -> bool {
    if PROMETHEUS_HANDLE.get().is_some() {
        tracing::debug!("Prometheus metrics already initialized");
        return false;
    }

    // Pull-based: /metrics renders the handle.
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if PROMETHEUS_HANDLE.set(handle).is_err() {
                tracing::warn!("Failed to store Prometheus handle (already set)");
                return false;
            }
            tracing::info!("Prometheus metrics initialized");
            true
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to install Prometheus recorder");
            false
        }
    }
}

/// Returns `None` if metrics were not initialized.
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|handle| handle.render())
}

pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    let status_class = match status {
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        500..=599 => "5xx",
        _ => "other",
    };

    let normalized_path = normalize_path(path);

    counter!(
        names::HTTP_REQUESTS_TOTAL,
        "method" => method.to_string(),
        "path" => normalized_path.clone(),
        "status" => status.to_string(),
        "status_class" => status_class.to_string()
    )
    .increment(1);

    histogram!(
        names::HTTP_REQUEST_DURATION_SECONDS,
        "method" => method.to_string(),
        "path" => normalized_path
    )
    .record(duration.as_secs_f64());
}

/// `scheme` is `bearer` or `api-key`; `outcome` is `ok` or an error class.
pub fn record_auth(scheme: &'static str, outcome: &'static str) {
    counter!(names::AUTH_RESOLUTIONS_TOTAL, "scheme" => scheme, "outcome" => outcome).increment(1);
}

pub fn record_redirect(outcome: &'static str) {
    counter!(names::REDIRECTS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_rate_limited(kind: &'static str) {
    counter!(names::RATE_LIMITED_TOTAL, "kind" => kind).increment(1);
}

/// Collapses record ids and redirect tails so label cardinality stays bounded.
///
/// `/v2/items/orders/42` -> `/v2/items/{collection}/{id}`,
/// `/x-api/anything/else` -> `/x-api/{path}`.
fn normalize_path(path: &str) -> String {
    let parts: Vec<&str> = path.split('/').collect();

    match parts.as_slice() {
        ["", "x-api", ..] => "/x-api/{path}".to_string(),
        ["", "v1", "invoke_function", ..] => "/v1/invoke_function/{path}".to_string(),
        ["", "v2", "items", _] => "/v2/items/{collection}".to_string(),
        ["", "v2", "items", _, _] => "/v2/items/{collection}/{id}".to_string(),
        _ => parts
            .iter()
            .map(|part| if is_likely_id(part) { "{id}" } else { part })
            .collect::<Vec<_>>()
            .join("/"),
    }
}

/// UUIDs and plain numbers.
fn is_likely_id(s: &str) -> bool {
    if s.is_empty() {
        return false;
    }
    if s.len() == 36 && s.chars().filter(|c| *c == '-').count() == 4 {
        return s.chars().all(|c| c.is_ascii_hexdigit() || c == '-');
    }
    s.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/healthz"), "/healthz");
        assert_eq!(
            normalize_path("/v2/items/orders/42"),
            "/v2/items/{collection}/{id}"
        );
        assert_eq!(normalize_path("/v2/items/orders"), "/v2/items/{collection}");
        assert_eq!(normalize_path("/x-api/orders/7"), "/x-api/{path}");
        assert_eq!(
            normalize_path("/v1/invoke_function/reports/daily"),
            "/v1/invoke_function/{path}"
        );
        assert_eq!(
            normalize_path("/v1/thing/550e8400-e29b-41d4-a716-446655440000"),
            "/v1/thing/{id}"
        );
    }

    #[test]
    fn test_is_likely_id() {
        assert!(is_likely_id("12345"));
        assert!(is_likely_id("550e8400-e29b-41d4-a716-446655440000"));
        assert!(!is_likely_id("orders"));
        assert!(!is_likely_id(""));
    }
}
