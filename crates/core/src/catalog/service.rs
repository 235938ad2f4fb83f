//! Catalog orchestration: cache lookup, fetch on miss, page slicing.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

use super::types::{
    key_component, member_identity, user_identity, CacheKey, CatalogError, CatalogItem,
    CatalogKind, CatalogOptions, CatalogScope, CatalogSettings, Subject, GLOBAL_IDENTITY,
    PUBLIC_IDENTITY,
};
use crate::cache::{CacheClass, CacheRegistry, CacheStats, CachedCollection};
use crate::fetcher::{fetch_all_pages, run_chunked};
use crate::metrics::{
    CACHE_INVALIDATIONS, CATALOG_COLLECTION_SIZE, CATALOG_FETCH_DURATION, CATALOG_REQUESTS,
};
use crate::session::{with_fresh_session, SessionHandle, SessionProvider};
use crate::share::SharedConfig;
use crate::transform::Transformer;
use crate::upstream::{FilmQuery, FilmRelationship, FilmSummary, MemberRelationship, UpstreamApi};
use crate::users::UserStore;

/// Concurrent name lookups when resolving list titles.
const LIST_NAME_CONCURRENCY: usize = 5;

/// Which credential a fetch runs under.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Access {
    User(String),
    Service,
}

/// Everything needed to serve one catalog request.
#[derive(Debug, Clone)]
struct FetchPlan {
    /// Identity the collection is cached under.
    identity: String,
    scope: CatalogScope,
    access: Access,
    member_id: Option<String>,
}

impl FetchPlan {
    fn member_id(&self) -> Result<&str, CatalogError> {
        self.member_id
            .as_deref()
            .ok_or_else(|| CatalogError::Unavailable {
                kind: self.scope.key.to_string(),
                reason: "no member to read from".to_string(),
            })
    }
}

/// Serves paginated catalogs out of whole-collection caches.
pub struct CatalogService {
    upstream: Arc<dyn UpstreamApi>,
    sessions: Arc<dyn SessionProvider>,
    users: Arc<dyn UserStore>,
    caches: Arc<CacheRegistry>,
    transformer: Transformer,
    settings: CatalogSettings,
    /// Per-key fetch locks so concurrent misses share one fetch.
    inflight: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    /// Invalidation count per identity. A fetch only stores its result if
    /// the count did not move while it ran.
    generations: Mutex<HashMap<String, u64>>,
}

impl CatalogService {
    pub fn new(
        upstream: Arc<dyn UpstreamApi>,
        sessions: Arc<dyn SessionProvider>,
        users: Arc<dyn UserStore>,
        caches: Arc<CacheRegistry>,
        transformer: Transformer,
        settings: CatalogSettings,
    ) -> Self {
        Self {
            upstream,
            sessions,
            users,
            caches,
            transformer,
            settings,
            inflight: Mutex::new(HashMap::new()),
            generations: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &CatalogSettings {
        &self.settings
    }

    pub fn caches(&self) -> &Arc<CacheRegistry> {
        &self.caches
    }

    // ========================================================================
    // Pages
    // ========================================================================

    /// One page of a catalog. Never fails: any error is logged and served as
    /// an empty page.
    pub async fn get_page(
        &self,
        subject: &Subject,
        kind: &CatalogKind,
        options: &CatalogOptions,
        skip: usize,
        page_size: usize,
    ) -> Vec<CatalogItem> {
        match self.collection(subject, kind, options).await {
            Ok(collection) => page_of(&collection.items, options.shuffle, skip, page_size),
            Err(e) => {
                CATALOG_REQUESTS
                    .with_label_values(&[kind.name(), "error"])
                    .inc();
                warn!(
                    subject = %subject.identity(),
                    catalog = %kind,
                    error = %e,
                    "Catalog request failed, serving empty page"
                );
                Vec::new()
            }
        }
    }

    /// Like [`get_page`](Self::get_page), addressed by addon catalog id.
    pub async fn get_page_by_id(
        &self,
        subject: &Subject,
        catalog_id: &str,
        options: &CatalogOptions,
        skip: usize,
        page_size: usize,
    ) -> Vec<CatalogItem> {
        match CatalogKind::parse(catalog_id) {
            Some(kind) => self.get_page(subject, &kind, options, skip, page_size).await,
            None => {
                CATALOG_REQUESTS
                    .with_label_values(&["unknown", "unknown"])
                    .inc();
                warn!(catalog_id, "Unknown catalog requested");
                Vec::new()
            }
        }
    }

    /// The whole cached collection for a request, fetching it on a miss.
    pub async fn collection(
        &self,
        subject: &Subject,
        kind: &CatalogKind,
        options: &CatalogOptions,
    ) -> Result<Arc<CachedCollection>, CatalogError> {
        let plan = self.plan(subject, kind, options).await?;
        let cache = self.caches.collections(plan.scope.class).ok_or_else(|| {
            CatalogError::Unavailable {
                kind: kind.to_string(),
                reason: format!("{} does not hold collections", plan.scope.class.name()),
            }
        })?;
        let key = plan.scope.key.as_str();
        let generation = self.generation(&plan.identity);

        if let Some(hit) = cache.get(key) {
            CATALOG_REQUESTS.with_label_values(&[kind.name(), "hit"]).inc();
            debug!(key, items = hit.len(), "Catalog cache hit");
            return Ok(hit);
        }

        // Requests after an invalidation never join a flight started before it
        let flight_key = format!("{}#{}", key, generation);
        let flight = self.flight(&flight_key);
        let result = {
            let _guard = flight.lock().await;
            // Another request may have filled the entry while we waited
            match cache.get(key) {
                Some(hit) => {
                    CATALOG_REQUESTS.with_label_values(&[kind.name(), "hit"]).inc();
                    debug!(key, "Catalog filled by concurrent request");
                    Ok(hit)
                }
                None => {
                    CATALOG_REQUESTS.with_label_values(&[kind.name(), "miss"]).inc();
                    debug!(key, "Catalog cache miss");

                    let started = Instant::now();
                    let fetched = self.fetch(&plan, kind, options).await;
                    CATALOG_FETCH_DURATION
                        .with_label_values(&[kind.name()])
                        .observe(started.elapsed().as_secs_f64());

                    fetched.map(|items| {
                        CATALOG_COLLECTION_SIZE
                            .with_label_values(&[kind.name()])
                            .observe(items.len() as f64);
                        let collection = Arc::new(CachedCollection::new(items));
                        let stored = self.store_if_current(&plan.identity, generation, || {
                            cache.set(key, collection.clone())
                        });
                        if !stored {
                            debug!(key, "Invalidated during fetch, result not cached");
                        }
                        collection
                    })
                }
            }
        };
        self.release_flight(&flight_key, &flight);

        result
    }

    fn lock_generations(&self) -> MutexGuard<'_, HashMap<String, u64>> {
        self.generations.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn generation(&self, identity: &str) -> u64 {
        self.lock_generations().get(identity).copied().unwrap_or(0)
    }

    /// Run `store` only if `identity` is still at `generation`. The check and
    /// the store happen under one lock so an invalidation cannot slip between.
    fn store_if_current(&self, identity: &str, generation: u64, store: impl FnOnce()) -> bool {
        let generations = self.lock_generations();
        let current = generations.get(identity).copied().unwrap_or(0) == generation;
        if current {
            store();
        }
        current
    }

    fn lock_inflight(&self) -> MutexGuard<'_, HashMap<String, Arc<tokio::sync::Mutex<()>>>> {
        self.inflight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn flight(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.lock_inflight()
            .entry(key.to_string())
            .or_default()
            .clone()
    }

    fn release_flight(&self, key: &str, flight: &Arc<tokio::sync::Mutex<()>>) {
        let mut inflight = self.lock_inflight();
        if inflight
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, flight))
        {
            inflight.remove(key);
        }
    }

    /// Resolve cache placement and credentials for a request.
    async fn plan(
        &self,
        subject: &Subject,
        kind: &CatalogKind,
        options: &CatalogOptions,
    ) -> Result<FetchPlan, CatalogError> {
        let plan = |identity: &str, class: CacheClass, access: Access, member_id: Option<String>| {
            FetchPlan {
                identity: identity.to_string(),
                scope: CatalogScope {
                    key: CacheKey::new(identity, kind, options),
                    class,
                },
                access,
                member_id,
            }
        };

        match (kind, subject) {
            (CatalogKind::Popular, _) => {
                Ok(plan(GLOBAL_IDENTITY, CacheClass::Popular, Access::Service, None))
            }
            (CatalogKind::TopRated, _) => {
                Ok(plan(GLOBAL_IDENTITY, CacheClass::TopRated, Access::Service, None))
            }
            (CatalogKind::ExternalWatchlist(username), _) => {
                let member_id = self.resolve_member_id(username).await?;
                Ok(plan(
                    &member_identity(&member_id),
                    CacheClass::PublicWatchlist,
                    Access::Service,
                    Some(member_id),
                ))
            }
            (_, Subject::User { user_id, member_id }) => {
                let class = match kind {
                    CatalogKind::Liked => CacheClass::LikedFilms,
                    _ => CacheClass::UserLists,
                };
                Ok(plan(
                    &user_identity(user_id),
                    class,
                    Access::User(user_id.clone()),
                    Some(member_id.clone()),
                ))
            }
            (CatalogKind::Friends, Subject::Shared { .. }) => Err(CatalogError::Unavailable {
                kind: kind.to_string(),
                reason: "the friends feed requires a signed-in user".to_string(),
            }),
            (CatalogKind::List(_), Subject::Shared { .. }) => Ok(plan(
                PUBLIC_IDENTITY,
                CacheClass::PublicList,
                Access::Service,
                None,
            )),
            (_, Subject::Shared { member_id }) => {
                let member_id = member_id.clone().ok_or_else(|| CatalogError::Unavailable {
                    kind: kind.to_string(),
                    reason: "shared configuration names no member".to_string(),
                })?;
                let class = match kind {
                    CatalogKind::Liked => CacheClass::LikedFilms,
                    CatalogKind::Diary => CacheClass::PublicList,
                    _ => CacheClass::PublicWatchlist,
                };
                Ok(plan(
                    &member_identity(&member_id),
                    class,
                    Access::Service,
                    Some(member_id),
                ))
            }
        }
    }

    async fn session(&self, access: &Access) -> Result<SessionHandle, CatalogError> {
        let session = match access {
            Access::User(user_id) => self.sessions.acquire(user_id).await?,
            Access::Service => self.sessions.acquire_service().await?,
        };
        Ok(session)
    }

    /// Fetch every page of the upstream collection and transform it.
    async fn fetch(
        &self,
        plan: &FetchPlan,
        kind: &CatalogKind,
        options: &CatalogOptions,
    ) -> Result<Vec<CatalogItem>, CatalogError> {
        let session = self.session(&plan.access).await?;
        let token = session.access_token.as_str();
        let upstream = self.upstream.as_ref();
        let limit = kind.page_limit();
        let sort = kind.effective_sort(options);
        let resource = kind.name();
        let show_ratings = options.show_ratings;

        let items = match kind {
            CatalogKind::Watchlist | CatalogKind::ExternalWatchlist(_) => {
                let member_id = plan.member_id()?;
                let films = fetch_all_pages(resource, limit, sort, move |req| async move {
                    upstream.watchlist_page(token, member_id, &req).await
                })
                .await?;
                self.transformer.films(&films, show_ratings)
            }
            CatalogKind::Diary => {
                let member_id = plan.member_id()?;
                let entries = fetch_all_pages(resource, limit, sort, move |req| async move {
                    upstream.log_entries_page(token, member_id, &req).await
                })
                .await?;
                self.transformer.log_entries(&entries, show_ratings)
            }
            CatalogKind::Friends => {
                let member_id = plan.member_id()?;
                let activity = fetch_all_pages(resource, limit, sort, move |req| async move {
                    upstream.friends_activity_page(token, member_id, &req).await
                })
                .await?;
                self.transformer
                    .activities(&activity, Some(member_id), show_ratings)
            }
            CatalogKind::Liked => {
                let query = FilmQuery::Member {
                    member_id: plan.member_id()?.to_string(),
                    relationship: MemberRelationship::Liked,
                };
                let query = &query;
                let films = fetch_all_pages(resource, limit, sort, move |req| async move {
                    upstream.films_page(token, query, &req).await
                })
                .await?;
                self.transformer.films(&films, show_ratings)
            }
            CatalogKind::Popular => {
                let films = fetch_all_pages(resource, limit, sort, move |req| async move {
                    upstream.films_page(token, &FilmQuery::All, &req).await
                })
                .await?;
                self.transformer.films(&films, show_ratings)
            }
            CatalogKind::List(list_id) => {
                self.list_items(token, list_id, kind, options).await?
            }
            CatalogKind::TopRated => {
                let list_id = self.settings.top_rated_list_id.as_deref().ok_or_else(|| {
                    CatalogError::Unavailable {
                        kind: kind.to_string(),
                        reason: "no top-rated list configured".to_string(),
                    }
                })?;
                self.list_items(token, list_id, kind, options).await?
            }
        };

        debug!(catalog = %kind, items = items.len(), "Fetched catalog collection");
        Ok(items)
    }

    async fn list_items(
        &self,
        token: &str,
        list_id: &str,
        kind: &CatalogKind,
        options: &CatalogOptions,
    ) -> Result<Vec<CatalogItem>, CatalogError> {
        let upstream = self.upstream.as_ref();
        let entries = fetch_all_pages(
            kind.name(),
            kind.page_limit(),
            kind.effective_sort(options),
            move |req| async move { upstream.list_entries_page(token, list_id, &req).await },
        )
        .await?;
        Ok(self.transformer.list_entries(&entries, options.show_ratings))
    }

    // ========================================================================
    // Invalidation & stats
    // ========================================================================

    /// Drop every cached entry belonging to a user: collections under every
    /// kind and option variant, film state snapshots, and the public
    /// collections of the user's member profile.
    ///
    /// Fetches still running for these identities finish but do not cache
    /// their result, and later requests do not wait on them.
    pub fn invalidate(&self, user_id: &str) -> usize {
        let mut identities = vec![user_identity(user_id)];
        match self.users.find_by_id(user_id) {
            Ok(Some(user)) => identities.push(member_identity(&user.member_id)),
            Ok(None) => {}
            Err(e) => warn!(user_id, error = %e, "Could not load user for member invalidation"),
        }

        let removed = self.invalidate_identities(&identities);
        CACHE_INVALIDATIONS.inc();
        info!(user_id, removed, "Invalidated user caches");
        removed
    }

    /// Drop the public collections of one member profile.
    pub fn invalidate_member(&self, member_id: &str) -> usize {
        let removed = self.invalidate_identities(&[member_identity(member_id)]);
        CACHE_INVALIDATIONS.inc();
        info!(member_id, removed, "Invalidated member caches");
        removed
    }

    fn invalidate_identities(&self, identities: &[String]) -> usize {
        let mut generations = self.lock_generations();
        identities
            .iter()
            .map(|identity| {
                *generations.entry(identity.clone()).or_default() += 1;
                self.caches.remove_prefix(&CacheKey::identity_prefix(identity))
            })
            .sum()
    }

    /// Size and capacity of every cache instance.
    pub fn cache_stats(&self) -> BTreeMap<String, CacheStats> {
        self.caches.stats()
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    /// Virtual subject for a shared configuration. An unresolvable username
    /// yields a subject without a member.
    pub async fn shared_subject(&self, config: &SharedConfig) -> Subject {
        let member_id = match &config.username {
            Some(username) => match self.resolve_member_id(username).await {
                Ok(member_id) => Some(member_id),
                Err(e) => {
                    warn!(username = %username, error = %e, "Could not resolve shared member");
                    None
                }
            },
            None => None,
        };
        Subject::Shared { member_id }
    }

    /// Upstream member id for a username.
    pub async fn resolve_member_id(&self, username: &str) -> Result<String, CatalogError> {
        let key = username.to_lowercase();
        if let Some(member_id) = self.caches.member_id.get(&key) {
            return Ok(member_id);
        }

        let session = self.sessions.acquire_service().await?;
        let member_id = self
            .upstream
            .member_id(&session.access_token, username)
            .await?
            .ok_or_else(|| CatalogError::MemberNotFound(username.to_string()))?;

        self.caches.member_id.set(key, member_id.clone());
        Ok(member_id)
    }

    /// The user's current relationship with a film. Served from a short-lived
    /// snapshot when one exists; mutations purge it.
    pub async fn film_state(
        &self,
        user_id: &str,
        film_id: &str,
    ) -> Result<FilmRelationship, CatalogError> {
        let key = film_state_key(user_id, film_id);
        if let Some(state) = self.caches.user_ratings.get(&key) {
            return Ok(state);
        }

        let identity = user_identity(user_id);
        let generation = self.generation(&identity);

        let upstream = self.upstream.as_ref();
        let state = with_fresh_session(self.sessions.as_ref(), user_id, |session| async move {
            upstream
                .film_relationship(&session.access_token, film_id)
                .await
                .map_err(CatalogError::from)
        })
        .await?;

        self.store_if_current(&identity, generation, || {
            self.caches.user_ratings.set(key, state.clone())
        });
        Ok(state)
    }

    /// Film detail by external (IMDb) id, via the id mapping recorded by
    /// transforms or an upstream search.
    pub async fn film_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<FilmSummary>, CatalogError> {
        let mapped = self.caches.id_mapping.get(external_id);
        if let Some(film) = mapped.as_deref().and_then(|id| self.caches.films.get(id)) {
            return Ok(Some(film));
        }

        let session = self.sessions.acquire_service().await?;
        let film = match mapped {
            Some(film_id) => self.upstream.film(&session.access_token, &film_id).await?,
            None => {
                let found = self
                    .upstream
                    .film_by_external_id(&session.access_token, external_id)
                    .await?;
                match found {
                    Some(film) => film,
                    None => {
                        debug!(external_id, "No upstream film for external id");
                        return Ok(None);
                    }
                }
            }
        };

        self.caches
            .id_mapping
            .set(external_id.to_string(), film.id.clone());
        self.caches.films.set(film.id.clone(), film.clone());
        Ok(Some(film))
    }

    /// Raw poster recorded for an external id by a previous transform.
    pub fn poster_url(&self, external_id: &str) -> Option<String> {
        self.caches.poster_image.get(external_id)
    }

    /// Display name of a list.
    pub async fn list_name(&self, list_id: &str) -> Result<String, CatalogError> {
        if let Some(name) = self.caches.list_names.get(list_id) {
            return Ok(name);
        }

        let session = self.sessions.acquire_service().await?;
        let list = self.upstream.list(&session.access_token, list_id).await?;
        self.caches.list_names.set(list_id.to_string(), list.name.clone());
        Ok(list.name)
    }

    /// Names of several lists, resolved a few at a time. Lists whose name
    /// cannot be resolved are left out.
    pub async fn list_names(&self, list_ids: &[String]) -> HashMap<String, String> {
        let results = run_chunked(list_ids, LIST_NAME_CONCURRENCY, |list_id| async move {
            (list_id, self.list_name(list_id).await)
        })
        .await;

        results
            .into_iter()
            .filter_map(|(list_id, result)| match result {
                Ok(name) => Some((list_id.clone(), name)),
                Err(e) => {
                    warn!(list_id = %list_id, error = %e, "Could not resolve list name");
                    None
                }
            })
            .collect()
    }
}

/// Key of a per-film state snapshot; lives under the user's identity so
/// invalidation removes it.
pub fn film_state_key(user_id: &str, film_id: &str) -> String {
    format!(
        "{}film:{}",
        CacheKey::identity_prefix(&user_identity(user_id)),
        key_component(film_id)
    )
}

/// Slice a page out of a collection, shuffling first if requested.
fn page_of(items: &[CatalogItem], shuffle: bool, skip: usize, page_size: usize) -> Vec<CatalogItem> {
    if !shuffle {
        return items.iter().skip(skip).take(page_size).cloned().collect();
    }

    let mut order: Vec<&CatalogItem> = items.iter().collect();
    order.shuffle(&mut rand::thread_rng());
    order.into_iter().skip(skip).take(page_size).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(n: usize) -> Vec<CatalogItem> {
        (0..n)
            .map(|i| CatalogItem {
                external_id: format!("tt{:07}", i),
                kind: "movie".to_string(),
                title: format!("Film {}", i),
                poster_url: None,
                release_year: None,
                genres: vec![],
                directors: vec![],
                runtime: None,
                description: None,
            })
            .collect()
    }

    #[test]
    fn test_page_of_slices() {
        let all = items(5);
        assert_eq!(page_of(&all, false, 0, 2), all[0..2].to_vec());
        assert_eq!(page_of(&all, false, 4, 2), all[4..5].to_vec());
        assert!(page_of(&all, false, 5, 2).is_empty());
        assert!(page_of(&all, false, 100, 2).is_empty());
    }

    #[test]
    fn test_page_of_shuffle_is_permutation() {
        let all = items(50);
        let mut shuffled = page_of(&all, true, 0, 50);
        assert_eq!(shuffled.len(), 50);
        shuffled.sort_by(|a, b| a.external_id.cmp(&b.external_id));
        assert_eq!(shuffled, all);
    }

    #[test]
    fn test_film_state_key_is_under_user_prefix() {
        let key = film_state_key("7", "f1");
        assert_eq!(key, "user:7:film:f1");
        assert!(key.starts_with(&CacheKey::identity_prefix(&user_identity("7"))));
    }
}
