//! Film state and mutation handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use boxdio_core::{
    transform::is_external_id, upstream::FilmRelationship, ActionError, CatalogError,
    SessionError, UpstreamError,
};
use serde::Deserialize;

use super::handlers::{api_error, ApiError};
use crate::state::AppState;

// ============================================================================
// Request types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct FilmPath {
    pub user_id: String,
    pub film_id: String,
}

/// `{"rating": null}` clears the rating.
#[derive(Debug, Deserialize)]
pub struct RatingBody {
    pub rating: Option<f32>,
}

#[derive(Debug, Deserialize)]
pub struct WatchedBody {
    pub watched: bool,
}

#[derive(Debug, Deserialize)]
pub struct LikedBody {
    pub liked: bool,
}

#[derive(Debug, Deserialize)]
pub struct WatchlistBody {
    pub in_watchlist: bool,
}

// ============================================================================
// Error mapping
// ============================================================================

fn upstream_status(e: &UpstreamError) -> StatusCode {
    match e {
        UpstreamError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        UpstreamError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        UpstreamError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::BAD_GATEWAY,
    }
}

fn session_status(e: &SessionError) -> StatusCode {
    match e {
        SessionError::UserNotFound(_) => StatusCode::NOT_FOUND,
        SessionError::NoCredential(_) => StatusCode::UNAUTHORIZED,
        SessionError::Refresh(upstream) => upstream_status(upstream),
        SessionError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn catalog_status(e: &CatalogError) -> StatusCode {
    match e {
        CatalogError::Session(session) => session_status(session),
        CatalogError::Upstream(upstream) => upstream_status(upstream),
        CatalogError::MemberNotFound(_) | CatalogError::UnknownCatalog(_) => StatusCode::NOT_FOUND,
        CatalogError::Unavailable { .. } => StatusCode::BAD_REQUEST,
    }
}

fn action_error(e: ActionError) -> ApiError {
    let status = match &e {
        ActionError::InvalidRating(_) => StatusCode::BAD_REQUEST,
        ActionError::FilmNotFound(_) => StatusCode::NOT_FOUND,
        ActionError::Session(session) => session_status(session),
        ActionError::Upstream(upstream) => upstream_status(upstream),
        ActionError::Catalog(catalog) => catalog_status(catalog),
    };
    api_error(status, e)
}

/// Accept either an upstream film id or an IMDb id.
async fn resolve_film(state: &AppState, film_id: &str) -> Result<String, ApiError> {
    if is_external_id(film_id) {
        state.actions().resolve_film(film_id).await.map_err(action_error)
    } else {
        Ok(film_id.to_string())
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/v1/users/{user_id}/films/{film_id}/state
pub async fn film_state(
    State(state): State<Arc<AppState>>,
    Path(path): Path<FilmPath>,
) -> Result<Json<FilmRelationship>, ApiError> {
    let film_id = resolve_film(&state, &path.film_id).await?;
    state
        .catalog()
        .film_state(&path.user_id, &film_id)
        .await
        .map(Json)
        .map_err(|e| api_error(catalog_status(&e), e))
}

/// POST /api/v1/users/{user_id}/films/{film_id}/rating
pub async fn rate(
    State(state): State<Arc<AppState>>,
    Path(path): Path<FilmPath>,
    Json(body): Json<RatingBody>,
) -> Result<Json<FilmRelationship>, ApiError> {
    let film_id = resolve_film(&state, &path.film_id).await?;
    state
        .actions()
        .rate(&path.user_id, &film_id, body.rating)
        .await
        .map(Json)
        .map_err(action_error)
}

/// POST /api/v1/users/{user_id}/films/{film_id}/watched
pub async fn set_watched(
    State(state): State<Arc<AppState>>,
    Path(path): Path<FilmPath>,
    Json(body): Json<WatchedBody>,
) -> Result<Json<FilmRelationship>, ApiError> {
    let film_id = resolve_film(&state, &path.film_id).await?;
    state
        .actions()
        .set_watched(&path.user_id, &film_id, body.watched)
        .await
        .map(Json)
        .map_err(action_error)
}

/// POST /api/v1/users/{user_id}/films/{film_id}/liked
pub async fn set_liked(
    State(state): State<Arc<AppState>>,
    Path(path): Path<FilmPath>,
    Json(body): Json<LikedBody>,
) -> Result<Json<FilmRelationship>, ApiError> {
    let film_id = resolve_film(&state, &path.film_id).await?;
    state
        .actions()
        .set_liked(&path.user_id, &film_id, body.liked)
        .await
        .map(Json)
        .map_err(action_error)
}

/// POST /api/v1/users/{user_id}/films/{film_id}/watchlist
pub async fn set_in_watchlist(
    State(state): State<Arc<AppState>>,
    Path(path): Path<FilmPath>,
    Json(body): Json<WatchlistBody>,
) -> Result<Json<FilmRelationship>, ApiError> {
    let film_id = resolve_film(&state, &path.film_id).await?;
    state
        .actions()
        .set_in_watchlist(&path.user_id, &film_id, body.in_watchlist)
        .await
        .map(Json)
        .map_err(action_error)
}
