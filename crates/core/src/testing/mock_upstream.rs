//! Mock upstream API for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::upstream::{
    ActivityItem, FilmQuery, FilmRelationship, FilmSummary, ListEntry, ListSummary, LogEntry,
    MemberRelationship, Page, PageRequest, RelationshipUpdate, TokenGrant, UpstreamApi,
    UpstreamError,
};

/// A recorded upstream call for test assertions.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// Trait method name, e.g. "watchlist_page".
    pub operation: &'static str,
    /// Bearer token the call was made with (empty for credential grants).
    pub token: String,
    /// Member, list or film the call addressed.
    pub resource: String,
    /// Page parameters, for paginated calls.
    pub request: Option<PageRequest>,
}

#[derive(Debug, Default)]
struct Collections {
    watchlists: HashMap<String, Vec<FilmSummary>>,
    diaries: HashMap<String, Vec<LogEntry>>,
    lists: HashMap<String, (ListSummary, Vec<ListEntry>)>,
    activity: HashMap<String, Vec<ActivityItem>>,
    liked: HashMap<String, Vec<FilmSummary>>,
    popular: Vec<FilmSummary>,
    films: HashMap<String, FilmSummary>,
    members: HashMap<String, String>,
    relationships: HashMap<String, FilmRelationship>,
}

/// Mock implementation of the UpstreamApi trait.
///
/// Provides controllable behavior for testing:
/// - Configurable collections per member or list, paginated with offset cursors
/// - Call recording per operation
/// - Error injection, artificial latency and a never-ending cursor mode
///
/// # Example
///
/// ```rust,ignore
/// use boxdio_core::testing::{MockUpstream, fixtures};
///
/// let upstream = MockUpstream::new();
/// upstream.set_watchlist("m1", vec![fixtures::film("f1", "tt0113277", "Heat")]).await;
///
/// let page = upstream.watchlist_page("token", "m1", &PageRequest::default()).await?;
/// assert_eq!(upstream.call_count("watchlist_page").await, 1);
/// ```
#[derive(Debug)]
pub struct MockUpstream {
    collections: Arc<RwLock<Collections>>,
    /// Recorded calls.
    calls: Arc<RwLock<Vec<RecordedCall>>>,
    /// If set, the next operation will fail with this error.
    next_error: Arc<RwLock<Option<UpstreamError>>>,
    /// Always hand out a next cursor.
    endless_pages: Arc<RwLock<bool>>,
    /// Latency added to every paginated call.
    page_delay: Arc<RwLock<Option<Duration>>>,
    /// Lifetime of issued credentials, in seconds.
    token_lifetime: Arc<RwLock<u64>>,
    /// Number of credentials issued so far.
    grants: Arc<RwLock<u64>>,
}

impl Default for MockUpstream {
    fn default() -> Self {
        Self::new()
    }
}

impl MockUpstream {
    /// Create a new empty mock upstream.
    pub fn new() -> Self {
        Self {
            collections: Arc::new(RwLock::new(Collections::default())),
            calls: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
            endless_pages: Arc::new(RwLock::new(false)),
            page_delay: Arc::new(RwLock::new(None)),
            token_lifetime: Arc::new(RwLock::new(3600)),
            grants: Arc::new(RwLock::new(0)),
        }
    }

    // =========================================================================
    // Collection Configuration
    // =========================================================================

    /// Set a member's watchlist.
    pub async fn set_watchlist(&self, member_id: &str, films: Vec<FilmSummary>) {
        self.collections
            .write()
            .await
            .watchlists
            .insert(member_id.to_string(), films);
    }

    /// Set a member's diary.
    pub async fn set_diary(&self, member_id: &str, entries: Vec<LogEntry>) {
        self.collections
            .write()
            .await
            .diaries
            .insert(member_id.to_string(), entries);
    }

    /// Set a list's name and entries.
    pub async fn set_list(&self, list_id: &str, name: &str, entries: Vec<ListEntry>) {
        let summary = ListSummary {
            id: list_id.to_string(),
            name: name.to_string(),
        };
        self.collections
            .write()
            .await
            .lists
            .insert(list_id.to_string(), (summary, entries));
    }

    /// Set the activity feed seen by a member.
    pub async fn set_activity(&self, member_id: &str, items: Vec<ActivityItem>) {
        self.collections
            .write()
            .await
            .activity
            .insert(member_id.to_string(), items);
    }

    /// Set a member's liked films.
    pub async fn set_liked(&self, member_id: &str, films: Vec<FilmSummary>) {
        self.collections
            .write()
            .await
            .liked
            .insert(member_id.to_string(), films);
    }

    /// Set the popular-this-week films.
    pub async fn set_popular(&self, films: Vec<FilmSummary>) {
        self.collections.write().await.popular = films;
    }

    /// Add a film retrievable by id and by IMDb id.
    pub async fn add_film(&self, film: FilmSummary) {
        self.collections
            .write()
            .await
            .films
            .insert(film.id.clone(), film);
    }

    /// Register a username to member id mapping.
    pub async fn add_member(&self, username: &str, member_id: &str) {
        self.collections
            .write()
            .await
            .members
            .insert(username.to_lowercase(), member_id.to_string());
    }

    /// Set the session member's relationship with a film.
    pub async fn set_relationship(&self, film_id: &str, relationship: FilmRelationship) {
        self.collections
            .write()
            .await
            .relationships
            .insert(film_id.to_string(), relationship);
    }

    // =========================================================================
    // Behaviour Configuration
    // =========================================================================

    /// Hand out a next cursor on every page, even past the end of the data.
    pub async fn set_endless_pages(&self, endless: bool) {
        *self.endless_pages.write().await = endless;
    }

    /// Add latency to every paginated call.
    pub async fn set_page_delay(&self, delay: Duration) {
        *self.page_delay.write().await = Some(delay);
    }

    /// Lifetime of credentials issued from now on.
    pub async fn set_token_lifetime(&self, seconds: u64) {
        *self.token_lifetime.write().await = seconds;
    }

    // =========================================================================
    // Call Recording
    // =========================================================================

    /// Get all recorded calls.
    pub async fn recorded_calls(&self) -> Vec<RecordedCall> {
        self.calls.read().await.clone()
    }

    /// Number of calls to one operation.
    pub async fn call_count(&self, operation: &str) -> usize {
        self.calls
            .read()
            .await
            .iter()
            .filter(|call| call.operation == operation)
            .count()
    }

    /// Number of user credential refreshes.
    pub async fn refresh_count(&self) -> usize {
        self.call_count("refresh_credential").await
    }

    /// Clear recorded calls.
    pub async fn clear_recorded(&self) {
        self.calls.write().await.clear();
    }

    // =========================================================================
    // Error Injection
    // =========================================================================

    /// Configure the next operation to fail with the given error.
    pub async fn set_next_error(&self, error: UpstreamError) {
        *self.next_error.write().await = Some(error);
    }

    /// Clear any pending error.
    pub async fn clear_next_error(&self) {
        *self.next_error.write().await = None;
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn record(
        &self,
        operation: &'static str,
        token: &str,
        resource: &str,
        request: Option<&PageRequest>,
    ) -> Result<(), UpstreamError> {
        self.calls.write().await.push(RecordedCall {
            operation,
            token: token.to_string(),
            resource: resource.to_string(),
            request: request.cloned(),
        });

        match self.next_error.write().await.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Slice `items` using the request's offset cursor.
    async fn paginate<T: Clone>(&self, items: &[T], request: &PageRequest) -> Page<T> {
        if let Some(delay) = *self.page_delay.read().await {
            tokio::time::sleep(delay).await;
        }

        let per_page = request.per_page.max(1) as usize;
        let start = request
            .cursor
            .as_deref()
            .and_then(|c| c.parse::<usize>().ok())
            .unwrap_or(0);
        let end = start.saturating_add(per_page).min(items.len());
        let page_items = items.get(start..end).map(<[T]>::to_vec).unwrap_or_default();

        let has_more = end < items.len() || *self.endless_pages.read().await;
        let next = has_more.then(|| (start + per_page).to_string());
        Page::new(page_items, next)
    }

    async fn issue_grant(&self, prefix: &str, with_refresh: bool) -> TokenGrant {
        let mut grants = self.grants.write().await;
        *grants += 1;
        TokenGrant {
            access_token: format!("{}-{}", prefix, *grants),
            refresh_token: with_refresh.then(|| format!("refresh-{}", *grants)),
            expires_in_secs: *self.token_lifetime.read().await,
        }
    }

    fn not_found(what: &str, id: &str) -> UpstreamError {
        UpstreamError::NotFound(format!("{} {}", what, id))
    }
}

#[async_trait]
impl UpstreamApi for MockUpstream {
    async fn watchlist_page(
        &self,
        token: &str,
        member_id: &str,
        request: &PageRequest,
    ) -> Result<Page<FilmSummary>, UpstreamError> {
        self.record("watchlist_page", token, member_id, Some(request))
            .await?;
        let items = self
            .collections
            .read()
            .await
            .watchlists
            .get(member_id)
            .cloned()
            .unwrap_or_default();
        Ok(self.paginate(&items, request).await)
    }

    async fn log_entries_page(
        &self,
        token: &str,
        member_id: &str,
        request: &PageRequest,
    ) -> Result<Page<LogEntry>, UpstreamError> {
        self.record("log_entries_page", token, member_id, Some(request))
            .await?;
        let items = self
            .collections
            .read()
            .await
            .diaries
            .get(member_id)
            .cloned()
            .unwrap_or_default();
        Ok(self.paginate(&items, request).await)
    }

    async fn list_entries_page(
        &self,
        token: &str,
        list_id: &str,
        request: &PageRequest,
    ) -> Result<Page<ListEntry>, UpstreamError> {
        self.record("list_entries_page", token, list_id, Some(request))
            .await?;
        let items = self
            .collections
            .read()
            .await
            .lists
            .get(list_id)
            .map(|(_, entries)| entries.clone())
            .ok_or_else(|| Self::not_found("list", list_id))?;
        Ok(self.paginate(&items, request).await)
    }

    async fn friends_activity_page(
        &self,
        token: &str,
        member_id: &str,
        request: &PageRequest,
    ) -> Result<Page<ActivityItem>, UpstreamError> {
        self.record("friends_activity_page", token, member_id, Some(request))
            .await?;
        let items = self
            .collections
            .read()
            .await
            .activity
            .get(member_id)
            .cloned()
            .unwrap_or_default();
        Ok(self.paginate(&items, request).await)
    }

    async fn films_page(
        &self,
        token: &str,
        query: &FilmQuery,
        request: &PageRequest,
    ) -> Result<Page<FilmSummary>, UpstreamError> {
        let resource = match query {
            FilmQuery::Member { member_id, .. } => member_id.as_str(),
            FilmQuery::All => "all",
        };
        self.record("films_page", token, resource, Some(request))
            .await?;

        let items = {
            let collections = self.collections.read().await;
            match query {
                FilmQuery::Member {
                    member_id,
                    relationship: MemberRelationship::Liked,
                } => collections.liked.get(member_id).cloned().unwrap_or_default(),
                FilmQuery::Member { .. } => Vec::new(),
                FilmQuery::All => collections.popular.clone(),
            }
        };
        Ok(self.paginate(&items, request).await)
    }

    async fn film(&self, token: &str, film_id: &str) -> Result<FilmSummary, UpstreamError> {
        self.record("film", token, film_id, None).await?;
        self.collections
            .read()
            .await
            .films
            .get(film_id)
            .cloned()
            .ok_or_else(|| Self::not_found("film", film_id))
    }

    async fn film_by_external_id(
        &self,
        token: &str,
        external_id: &str,
    ) -> Result<Option<FilmSummary>, UpstreamError> {
        self.record("film_by_external_id", token, external_id, None)
            .await?;
        Ok(self
            .collections
            .read()
            .await
            .films
            .values()
            .find(|film| film.link_id("imdb") == Some(external_id))
            .cloned())
    }

    async fn member_id(&self, token: &str, username: &str) -> Result<Option<String>, UpstreamError> {
        self.record("member_id", token, username, None).await?;
        Ok(self
            .collections
            .read()
            .await
            .members
            .get(&username.to_lowercase())
            .cloned())
    }

    async fn list(&self, token: &str, list_id: &str) -> Result<ListSummary, UpstreamError> {
        self.record("list", token, list_id, None).await?;
        self.collections
            .read()
            .await
            .lists
            .get(list_id)
            .map(|(summary, _)| summary.clone())
            .ok_or_else(|| Self::not_found("list", list_id))
    }

    async fn film_relationship(
        &self,
        token: &str,
        film_id: &str,
    ) -> Result<FilmRelationship, UpstreamError> {
        self.record("film_relationship", token, film_id, None)
            .await?;
        Ok(self
            .collections
            .read()
            .await
            .relationships
            .get(film_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn update_film_relationship(
        &self,
        token: &str,
        film_id: &str,
        update: &RelationshipUpdate,
    ) -> Result<FilmRelationship, UpstreamError> {
        self.record("update_film_relationship", token, film_id, None)
            .await?;

        let mut collections = self.collections.write().await;
        let relationship = collections
            .relationships
            .entry(film_id.to_string())
            .or_default();
        if let Some(watched) = update.watched {
            relationship.watched = watched;
        }
        if let Some(liked) = update.liked {
            relationship.liked = liked;
        }
        if let Some(in_watchlist) = update.in_watchlist {
            relationship.in_watchlist = in_watchlist;
        }
        if let Some(rating) = update.rating {
            relationship.rating = rating;
            if rating.is_some() {
                relationship.watched = true;
            }
        }
        Ok(relationship.clone())
    }

    async fn refresh_credential(&self, refresh_token: &str) -> Result<TokenGrant, UpstreamError> {
        self.record("refresh_credential", "", refresh_token, None)
            .await?;
        Ok(self.issue_grant("access", true).await)
    }

    async fn client_credential(&self) -> Result<TokenGrant, UpstreamError> {
        self.record("client_credential", "", "", None).await?;
        Ok(self.issue_grant("service", false).await)
    }
}
