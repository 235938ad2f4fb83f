//! User registration, preferences and cache invalidation.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use boxdio_core::{User, UserPreferences, UserStoreError};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::handlers::{api_error, ApiError};
use crate::state::AppState;

// ============================================================================
// Request/Response types
// ============================================================================

/// Request body for registering or updating a user.
#[derive(Debug, Deserialize)]
pub struct UpsertUserBody {
    /// Upstream username
    pub username: String,
    /// Upstream member id
    pub member_id: String,
    /// Refresh credential obtained from the upstream sign-in flow
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InvalidateResponse {
    pub removed: usize,
}

fn store_error(e: UserStoreError) -> ApiError {
    let status = match e {
        UserStoreError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(status, e)
}

fn find_user(state: &AppState, user_id: &str) -> Result<User, ApiError> {
    state
        .users()
        .find_by_id(user_id)
        .map_err(store_error)?
        .ok_or_else(|| store_error(UserStoreError::NotFound(user_id.to_string())))
}

// ============================================================================
// Handlers
// ============================================================================

/// PUT /api/v1/users/{user_id}
///
/// Existing preferences and creation time are kept.
pub async fn upsert_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(body): Json<UpsertUserBody>,
) -> Result<Json<User>, ApiError> {
    if body.username.trim().is_empty() || body.member_id.trim().is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "username and member_id are required",
        ));
    }

    let existing = state.users().find_by_id(&user_id).map_err(store_error)?;
    let previous_member = existing.as_ref().map(|u| u.member_id.clone());
    let mut user = User::new(&user_id, body.username, body.member_id);
    if let Some(existing) = existing {
        user.preferences = existing.preferences;
        user.created_at = existing.created_at;
        user.refresh_token = existing.refresh_token;
        user.updated_at = Utc::now();
    }
    if let Some(token) = body.refresh_token {
        user.refresh_token = Some(token);
    }

    state.users().upsert(&user).map_err(store_error)?;
    state.catalog().invalidate(&user_id);
    if let Some(previous) = previous_member.filter(|m| *m != user.member_id) {
        state.catalog().invalidate_member(&previous);
    }

    info!(user_id = %user.id, username = %user.username, "User registered");
    Ok(Json(user))
}

/// GET /api/v1/users/{user_id}/preferences
pub async fn get_preferences(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<UserPreferences>, ApiError> {
    state
        .users()
        .preferences(&user_id)
        .map(Json)
        .map_err(store_error)
}

/// PUT /api/v1/users/{user_id}/preferences
pub async fn update_preferences(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(preferences): Json<UserPreferences>,
) -> Result<Json<UserPreferences>, ApiError> {
    find_user(&state, &user_id)?;
    state
        .users()
        .update_preferences(&user_id, &preferences)
        .map_err(store_error)?;
    state.catalog().invalidate(&user_id);

    info!(user_id = %user_id, "Preferences updated");
    Ok(Json(preferences))
}

/// DELETE /api/v1/users/{user_id}/cache
pub async fn invalidate_cache(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Json<InvalidateResponse> {
    let removed = state.catalog().invalidate(&user_id);
    Json(InvalidateResponse { removed })
}
