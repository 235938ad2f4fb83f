//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the Boxdio server:
//! - HTTP request metrics (latency, counts, in flight)
//! - Cache occupancy per class (collected dynamically)
//! - Core catalog, session and upstream metrics (registered from core)

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use regex_lite::Regex;
use tracing::error;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "boxdio_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("boxdio_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "boxdio_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Cache Metrics (collected dynamically)
// =============================================================================

/// Entries per cache class.
pub static CACHE_ENTRIES: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("boxdio_cache_entries", "Current entries per cache class"),
        &["cache"],
    )
    .unwrap()
});

/// Capacity per cache class.
pub static CACHE_CAPACITY: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("boxdio_cache_capacity", "Maximum entries per cache class"),
        &["cache"],
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // Cache
    registry.register(Box::new(CACHE_ENTRIES.clone())).unwrap();
    registry.register(Box::new(CACHE_CAPACITY.clone())).unwrap();

    // Core metrics (catalog, sessions, upstream)
    for metric in boxdio_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Collect dynamic metrics from current application state.
///
/// Called before encoding so the cache gauges reflect current occupancy.
pub fn collect_dynamic_metrics(state: &crate::state::AppState) {
    for (name, stats) in state.catalog().cache_stats() {
        CACHE_ENTRIES
            .with_label_values(&[&name])
            .set(stats.size as i64);
        CACHE_CAPACITY
            .with_label_values(&[&name])
            .set(stats.max as i64);
    }
}

static ADDON_OWNER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^/(u|s)/[^/]+").unwrap());
static USER_SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"/users/[^/]+").unwrap());
static FILM_SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"/films/[^/]+").unwrap());
static CATALOG_TAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/catalog/([^/]+)/[^/]+(/[^/]+)?$").unwrap());

/// Normalize a path for metric labels (replace user ids, shared blobs, film
/// and catalog ids with placeholders).
pub fn normalize_path(path: &str) -> String {
    let result = ADDON_OWNER.replace(path, |caps: &regex_lite::Captures| {
        if &caps[1] == "u" {
            "/u/{user}".to_string()
        } else {
            "/s/{blob}".to_string()
        }
    });
    let result = USER_SEGMENT.replace_all(&result, "/users/{user}");
    let result = FILM_SEGMENT.replace_all(&result, "/films/{film}");
    let result = CATALOG_TAIL.replace_all(&result, "/catalog/$1/{catalog}");
    result.to_string()
}
