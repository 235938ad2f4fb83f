use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::{actions, addon, handlers, middleware::metrics_middleware, users};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Management API
    let api_routes = Router::new()
        .route("/config", get(handlers::get_config))
        .route("/cache/stats", get(handlers::cache_stats))
        // Users
        .route("/users/{user_id}", put(users::upsert_user))
        .route(
            "/users/{user_id}/preferences",
            get(users::get_preferences).put(users::update_preferences),
        )
        .route("/users/{user_id}/cache", delete(users::invalidate_cache))
        // Film state and mutations
        .route(
            "/users/{user_id}/films/{film_id}/state",
            get(actions::film_state),
        )
        .route("/users/{user_id}/films/{film_id}/rating", post(actions::rate))
        .route(
            "/users/{user_id}/films/{film_id}/watched",
            post(actions::set_watched),
        )
        .route(
            "/users/{user_id}/films/{film_id}/liked",
            post(actions::set_liked),
        )
        .route(
            "/users/{user_id}/films/{film_id}/watchlist",
            post(actions::set_in_watchlist),
        );

    // Addon protocol, per user and per shared configuration
    let addon_routes = Router::new()
        .route("/u/{user_id}/manifest.json", get(addon::user_manifest))
        .route(
            "/u/{user_id}/catalog/{kind}/{id}",
            get(addon::user_catalog),
        )
        .route(
            "/u/{user_id}/catalog/{kind}/{id}/{extra}",
            get(addon::user_catalog),
        )
        .route("/s/{blob}/manifest.json", get(addon::shared_manifest))
        .route("/s/{blob}/catalog/{kind}/{id}", get(addon::shared_catalog))
        .route(
            "/s/{blob}/catalog/{kind}/{id}/{extra}",
            get(addon::shared_catalog),
        );

    // Addon clients fetch from arbitrary origins
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .nest("/api/v1", api_routes)
        .merge(addon_routes)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
