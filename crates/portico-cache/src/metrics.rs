//! Cache and guard counters.
//!
//! Recorded through the `metrics` facade; the server installs the Prometheus
//! recorder. Without a recorder these are no-ops.

use metrics::counter;

/// Metric names as constants for consistency.
pub mod names {
    pub const CACHE_HITS_TOTAL: &str = "portico_cache_hits_total";
    pub const CACHE_MISSES_TOTAL: &str = "portico_cache_misses_total";
    pub const CACHE_WRITE_ERRORS_TOTAL: &str = "portico_cache_write_errors_total";

    pub const GUARD_FAST_PATH_TOTAL: &str = "portico_guard_fast_path_total";
    pub const GUARD_POPULATIONS_TOTAL: &str = "portico_guard_populations_total";
    pub const GUARD_FOLLOWER_WAITS_TOTAL: &str = "portico_guard_follower_waits_total";
    pub const GUARD_DEADLINE_EXPIRIES_TOTAL: &str = "portico_guard_deadline_expiries_total";
}

pub fn record_cache_hit(tier: &'static str) {
    counter!(names::CACHE_HITS_TOTAL, "tier" => tier).increment(1);
}

pub fn record_cache_miss() {
    counter!(names::CACHE_MISSES_TOTAL).increment(1);
}

pub fn record_write_error() {
    counter!(names::CACHE_WRITE_ERRORS_TOTAL).increment(1);
}

pub fn record_fast_path(class: &str) {
    counter!(names::GUARD_FAST_PATH_TOTAL, "class" => class.to_string()).increment(1);
}

pub fn record_population(class: &str) {
    counter!(names::GUARD_POPULATIONS_TOTAL, "class" => class.to_string()).increment(1);
}

pub fn record_follower_wait(class: &str) {
    counter!(names::GUARD_FOLLOWER_WAITS_TOTAL, "class" => class.to_string()).increment(1);
}

pub fn record_deadline_expiry(class: &str) {
    counter!(names::GUARD_DEADLINE_EXPIRIES_TOTAL, "class" => class.to_string()).increment(1);
}
