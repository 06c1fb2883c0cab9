//! Prometheus metrics for the profile cache.
//!
//! This module provides:
//! - HTTP request metrics (count, latency)
//! - Cache metrics (hits per tier, misses, memory tier size)
//! - Upstream fetch outcomes and persistent-tier write results

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;

/// Global Prometheus handle for rendering metrics.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";

    // Cache metrics
    pub const CACHE_HITS_TOTAL: &str = "cache_hits_total";
    pub const CACHE_MISSES_TOTAL: &str = "cache_misses_total";
    pub const CACHE_ENTRIES: &str = "cache_entries";

    // Upstream and persistent tier
    pub const UPSTREAM_REQUESTS_TOTAL: &str = "upstream_requests_total";
    pub const UPSTREAM_REQUEST_DURATION_SECONDS: &str = "upstream_request_duration_seconds";
    pub const STORE_WRITES_TOTAL: &str = "store_writes_total";
    pub const STORE_ERRORS_TOTAL: &str = "store_errors_total";
}

/// Cache tier labels.
pub mod tier {
    pub const MEMORY: &str = "memory";
    pub const PERSISTENT: &str = "persistent";
    pub const STALE: &str = "stale";
}

/// Initialize the Prometheus metrics exporter.
///
/// This should be called once at server startup.
/// Returns `true` if initialization succeeded, `false` if already initialized.
pub fn init_metrics() -> bool {
    if PROMETHEUS_HANDLE.get().is_some() {
        tracing::debug!("Prometheus metrics already initialized");
        return false;
    }

    // Pull-based: /metrics is served by the application router
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

/// Render all metrics in Prometheus text format.
///
/// Returns `None` if metrics were not initialized.
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|handle| handle.render())
}

// =============================================================================
// HTTP Metrics
// =============================================================================

/// Record an HTTP request. `route` is the matched route template, never the
/// raw path, to keep label cardinality bounded.
pub fn record_http_request(method: &str, route: &str, status: u16, duration: Duration) {
    let status_class = match status {
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        500..=599 => "5xx",
        _ => "other",
    };

    counter!(
        names::HTTP_REQUESTS_TOTAL,
        "method" => method.to_string(),
        "route" => route.to_string(),
        "status" => status.to_string(),
        "status_class" => status_class
    )
    .increment(1);

    histogram!(
        names::HTTP_REQUEST_DURATION_SECONDS,
        "method" => method.to_string(),
        "route" => route.to_string()
    )
    .record(duration.as_secs_f64());
}

// =============================================================================
// Cache Metrics
// =============================================================================

/// Record a cache hit.
pub fn record_cache_hit(tier: &'static str) {
    counter!(names::CACHE_HITS_TOTAL, "tier" => tier).increment(1);
}

/// Record a cache miss (request reached the upstream service).
pub fn record_cache_miss() {
    counter!(names::CACHE_MISSES_TOTAL).increment(1);
}

/// Set the number of cache entries.
pub fn set_cache_entries(tier: &'static str, count: usize) {
    gauge!(names::CACHE_ENTRIES, "tier" => tier).set(count as f64);
}

// =============================================================================
// Upstream / Store Metrics
// =============================================================================

/// Record an upstream fetch by outcome (`found`, `not_found`, `transient`).
pub fn record_upstream_request(outcome: &'static str, duration: Duration) {
    counter!(names::UPSTREAM_REQUESTS_TOTAL, "outcome" => outcome).increment(1);
    histogram!(names::UPSTREAM_REQUEST_DURATION_SECONDS, "outcome" => outcome)
        .record(duration.as_secs_f64());
}

/// Record a persistent-tier write by result (`written`, `suppressed`, `failed`).
pub fn record_store_write(result: &'static str) {
    counter!(names::STORE_WRITES_TOTAL, "result" => result).increment(1);
}

/// Record a failed persistent-tier read or write.
pub fn record_store_error(operation: &'static str, category: String) {
    counter!(
        names::STORE_ERRORS_TOTAL,
        "operation" => operation,
        "category" => category
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_recorder_is_noop() {
        record_cache_hit(tier::MEMORY);
        record_cache_miss();
        record_upstream_request("found", Duration::from_millis(5));
        record_store_write("suppressed");
        record_http_request("GET", "/v1/user/{id}", 200, Duration::from_millis(1));
    }

    #[test]
    fn render_after_init() {
        init_metrics();
        record_cache_hit(tier::PERSISTENT);
        let rendered = render_metrics().expect("metrics initialized");
        assert!(rendered.contains(names::CACHE_HITS_TOTAL));
    }
}
