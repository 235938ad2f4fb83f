//! Upstream film-diary API.
//!
//! The catalog layer only talks to the upstream through the [`UpstreamApi`]
//! trait. [`HttpUpstreamClient`] is the production implementation; tests use
//! `testing::MockUpstream`.

mod client;
mod types;

pub use client::{HttpUpstreamClient, UpstreamClientConfig};
pub use types::*;

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur when calling the upstream API.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Rate limit exceeded.
    #[error("Rate limit exceeded, please wait before retrying")]
    RateLimited,

    /// The bearer credential was rejected.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Resource not found (404).
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// API returned an error.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Failed to parse response.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// Client not configured (missing client credentials, etc.).
    #[error("Client not configured: {0}")]
    NotConfigured(String),
}

/// Authenticated-fetch capability against the upstream service.
///
/// Every call that reads or writes member data takes the bearer `token` of
/// the session it runs under; the implementation never stores credentials.
#[async_trait]
pub trait UpstreamApi: Send + Sync {
    // Collections

    /// One page of a member's watchlist.
    async fn watchlist_page(
        &self,
        token: &str,
        member_id: &str,
        request: &PageRequest,
    ) -> Result<Page<FilmSummary>, UpstreamError>;

    /// One page of a member's diary (log entries with a diary date).
    async fn log_entries_page(
        &self,
        token: &str,
        member_id: &str,
        request: &PageRequest,
    ) -> Result<Page<LogEntry>, UpstreamError>;

    /// One page of a list's entries.
    async fn list_entries_page(
        &self,
        token: &str,
        list_id: &str,
        request: &PageRequest,
    ) -> Result<Page<ListEntry>, UpstreamError>;

    /// One page of the activity of the people a member follows.
    async fn friends_activity_page(
        &self,
        token: &str,
        member_id: &str,
        request: &PageRequest,
    ) -> Result<Page<ActivityItem>, UpstreamError>;

    /// One page of the generic film search.
    async fn films_page(
        &self,
        token: &str,
        query: &FilmQuery,
        request: &PageRequest,
    ) -> Result<Page<FilmSummary>, UpstreamError>;

    // Lookups

    /// Film detail by upstream id.
    async fn film(&self, token: &str, film_id: &str) -> Result<FilmSummary, UpstreamError>;

    /// Film detail by a cross-service id such as `tt0113277`.
    async fn film_by_external_id(
        &self,
        token: &str,
        external_id: &str,
    ) -> Result<Option<FilmSummary>, UpstreamError>;

    /// Resolve a username to a member id.
    async fn member_id(&self, token: &str, username: &str) -> Result<Option<String>, UpstreamError>;

    /// List summary (name) by id.
    async fn list(&self, token: &str, list_id: &str) -> Result<ListSummary, UpstreamError>;

    // Per-film state

    /// The session member's relationship with a film.
    async fn film_relationship(
        &self,
        token: &str,
        film_id: &str,
    ) -> Result<FilmRelationship, UpstreamError>;

    /// Apply a relationship update and return the resulting state.
    async fn update_film_relationship(
        &self,
        token: &str,
        film_id: &str,
        update: &RelationshipUpdate,
    ) -> Result<FilmRelationship, UpstreamError>;

    // Credentials

    /// Exchange a refresh credential for a new access credential.
    async fn refresh_credential(&self, refresh_token: &str) -> Result<TokenGrant, UpstreamError>;

    /// App-level credential for reading public data.
    async fn client_credential(&self) -> Result<TokenGrant, UpstreamError>;
}
