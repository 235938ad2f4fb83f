//! Film mutations on behalf of a signed-in user.
//!
//! Every successful mutation invalidates the user's cached collections
//! before returning, so the next catalog read reflects the change.

use std::sync::Arc;

use tracing::{info, warn};

use crate::catalog::{film_state_key, CatalogError, CatalogService};
use crate::metrics::MUTATIONS;
use crate::session::{with_fresh_session, SessionError, SessionProvider};
use crate::upstream::{FilmRelationship, RelationshipUpdate, UpstreamApi, UpstreamError};

/// Errors from a mutation.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Ratings run from 0.5 to 5 in half-star steps.
    #[error("Invalid rating: {0}")]
    InvalidRating(f32),

    #[error("Film not found: {0}")]
    FilmNotFound(String),
}

/// A user-facing mutation kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilmAction {
    Rate(Option<f32>),
    Watched(bool),
    Liked(bool),
    Watchlist(bool),
}

impl FilmAction {
    /// Metric label.
    pub fn name(&self) -> &'static str {
        match self {
            FilmAction::Rate(_) => "rate",
            FilmAction::Watched(_) => "watched",
            FilmAction::Liked(_) => "liked",
            FilmAction::Watchlist(_) => "watchlist",
        }
    }

    fn update(&self) -> Result<RelationshipUpdate, ActionError> {
        let update = match *self {
            FilmAction::Rate(rating) => {
                if let Some(r) = rating {
                    if !is_valid_rating(r) {
                        return Err(ActionError::InvalidRating(r));
                    }
                }
                RelationshipUpdate {
                    rating: Some(rating),
                    ..Default::default()
                }
            }
            FilmAction::Watched(watched) => RelationshipUpdate {
                watched: Some(watched),
                ..Default::default()
            },
            FilmAction::Liked(liked) => RelationshipUpdate {
                liked: Some(liked),
                ..Default::default()
            },
            FilmAction::Watchlist(in_watchlist) => RelationshipUpdate {
                in_watchlist: Some(in_watchlist),
                ..Default::default()
            },
        };
        Ok(update)
    }
}

pub fn is_valid_rating(rating: f32) -> bool {
    (0.5..=5.0).contains(&rating) && (rating * 2.0).fract() == 0.0
}

/// Applies film mutations and keeps the catalog caches honest.
pub struct ActionService {
    upstream: Arc<dyn UpstreamApi>,
    sessions: Arc<dyn SessionProvider>,
    catalog: Arc<CatalogService>,
}

impl ActionService {
    pub fn new(
        upstream: Arc<dyn UpstreamApi>,
        sessions: Arc<dyn SessionProvider>,
        catalog: Arc<CatalogService>,
    ) -> Self {
        Self {
            upstream,
            sessions,
            catalog,
        }
    }

    /// Set or clear the user's rating.
    pub async fn rate(
        &self,
        user_id: &str,
        film_id: &str,
        rating: Option<f32>,
    ) -> Result<FilmRelationship, ActionError> {
        self.apply(user_id, film_id, FilmAction::Rate(rating)).await
    }

    pub async fn set_watched(
        &self,
        user_id: &str,
        film_id: &str,
        watched: bool,
    ) -> Result<FilmRelationship, ActionError> {
        self.apply(user_id, film_id, FilmAction::Watched(watched))
            .await
    }

    pub async fn set_liked(
        &self,
        user_id: &str,
        film_id: &str,
        liked: bool,
    ) -> Result<FilmRelationship, ActionError> {
        self.apply(user_id, film_id, FilmAction::Liked(liked)).await
    }

    pub async fn set_in_watchlist(
        &self,
        user_id: &str,
        film_id: &str,
        in_watchlist: bool,
    ) -> Result<FilmRelationship, ActionError> {
        self.apply(user_id, film_id, FilmAction::Watchlist(in_watchlist))
            .await
    }

    /// Upstream film id for an external (IMDb) id.
    pub async fn resolve_film(&self, external_id: &str) -> Result<String, ActionError> {
        self.catalog
            .film_by_external_id(external_id)
            .await?
            .map(|film| film.id)
            .ok_or_else(|| ActionError::FilmNotFound(external_id.to_string()))
    }

    /// Apply one mutation, then invalidate before returning.
    pub async fn apply(
        &self,
        user_id: &str,
        film_id: &str,
        action: FilmAction,
    ) -> Result<FilmRelationship, ActionError> {
        let update = action.update()?;
        let upstream = self.upstream.as_ref();

        let result = with_fresh_session(self.sessions.as_ref(), user_id, |session| {
            let update = &update;
            async move {
                upstream
                    .update_film_relationship(&session.access_token, film_id, update)
                    .await
                    .map_err(ActionError::from)
            }
        })
        .await;

        let state = match result {
            Ok(state) => state,
            Err(e) => {
                MUTATIONS.with_label_values(&[action.name(), "failed"]).inc();
                warn!(user_id, film_id, action = action.name(), error = %e, "Mutation failed");
                return Err(e);
            }
        };

        self.catalog.invalidate(user_id);
        self.catalog
            .caches()
            .user_ratings
            .set(film_state_key(user_id, film_id), state.clone());

        MUTATIONS.with_label_values(&[action.name(), "success"]).inc();
        info!(user_id, film_id, action = action.name(), "Mutation applied");
        Ok(state)
    }
}
