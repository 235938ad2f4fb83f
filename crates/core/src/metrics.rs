//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Catalog orchestration (hits, misses, fetch durations)
//! - Invalidation and sessions
//! - The upstream API (requests, pages fetched)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Catalog Metrics
// =============================================================================

/// Catalog page requests by catalog kind and outcome.
pub static CATALOG_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "boxdio_catalog_requests_total",
            "Total catalog page requests",
        ),
        &["kind", "outcome"], // outcome: "hit", "miss", "error", "unknown"
    )
    .unwrap()
});

/// Duration of a full catalog fetch (all pages plus transform) on a miss.
pub static CATALOG_FETCH_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "boxdio_catalog_fetch_duration_seconds",
            "Duration of catalog fetches on cache miss",
        )
        .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["kind"],
    )
    .unwrap()
});

/// Items stored per fetched collection.
pub static CATALOG_COLLECTION_SIZE: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "boxdio_catalog_collection_size",
            "Number of items per fetched catalog collection",
        )
        .buckets(vec![0.0, 10.0, 50.0, 100.0, 250.0, 500.0, 1000.0]),
        &["kind"],
    )
    .unwrap()
});

// =============================================================================
// Invalidation & Session Metrics
// =============================================================================

/// User invalidations total.
pub static CACHE_INVALIDATIONS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "boxdio_cache_invalidations_total",
        "Total per-user cache invalidations",
    )
    .unwrap()
});

/// Session credential refreshes by result.
pub static SESSION_REFRESHES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "boxdio_session_refreshes_total",
            "Total session credential refreshes",
        ),
        &["result"], // "success", "failed"
    )
    .unwrap()
});

/// Mutations by action and result.
pub static MUTATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("boxdio_mutations_total", "Total user mutations"),
        &["action", "result"], // action: "rate", "watched", "liked", "watchlist"
    )
    .unwrap()
});

// =============================================================================
// Upstream Metrics
// =============================================================================

/// Upstream request duration.
pub static UPSTREAM_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "boxdio_upstream_request_duration_seconds",
            "Duration of upstream API calls",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["operation"],
    )
    .unwrap()
});

/// Upstream requests total.
pub static UPSTREAM_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "boxdio_upstream_requests_total",
            "Total upstream API requests",
        ),
        &["operation", "status"], // status: "success", "error"
    )
    .unwrap()
});

/// Pages fetched by the paginated fetcher, per catalog resource.
pub static UPSTREAM_PAGES_FETCHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "boxdio_upstream_pages_fetched_total",
            "Total upstream pages fetched for catalogs",
        ),
        &["resource"],
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Catalog
        Box::new(CATALOG_REQUESTS.clone()),
        Box::new(CATALOG_FETCH_DURATION.clone()),
        Box::new(CATALOG_COLLECTION_SIZE.clone()),
        // Invalidation & sessions
        Box::new(CACHE_INVALIDATIONS.clone()),
        Box::new(SESSION_REFRESHES.clone()),
        Box::new(MUTATIONS.clone()),
        // Upstream
        Box::new(UPSTREAM_REQUEST_DURATION.clone()),
        Box::new(UPSTREAM_REQUESTS.clone()),
        Box::new(UPSTREAM_PAGES_FETCHED.clone()),
    ]
}
