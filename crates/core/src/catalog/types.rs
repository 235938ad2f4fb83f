//! Catalog kinds, options, subjects and cache keys.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cache::CacheClass;
use crate::fetcher::PageLimit;
use crate::upstream::FilmSort;

/// Prefix shared by every addon catalog id.
pub const CATALOG_ID_PREFIX: &str = "boxdio-";

// ============================================================================
// Catalog Item
// ============================================================================

/// One entry of a catalog as served to the addon client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    /// Cross-service id (IMDb), unique within a collection.
    #[serde(rename = "id")]
    pub external_id: String,
    /// Always "movie".
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "name")]
    pub title: String,
    #[serde(rename = "poster", default, skip_serializing_if = "Option::is_none")]
    pub poster_url: Option<String>,
    #[serde(rename = "year", default, skip_serializing_if = "Option::is_none")]
    pub release_year: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub genres: Vec<String>,
    #[serde(rename = "director", default, skip_serializing_if = "Vec::is_empty")]
    pub directors: Vec<String>,
    /// Display string such as "170 min".
    #[serde(rename = "runtime", default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

// ============================================================================
// Catalog Kind
// ============================================================================

/// The collections the addon can serve.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CatalogKind {
    Watchlist,
    Diary,
    Friends,
    Liked,
    /// A member list by upstream list id.
    List(String),
    Popular,
    TopRated,
    /// Another member's public watchlist, by username.
    ExternalWatchlist(String),
}

impl CatalogKind {
    /// Parse an addon catalog id such as `boxdio-list-2ZKlq`.
    pub fn parse(catalog_id: &str) -> Option<Self> {
        let rest = catalog_id.strip_prefix(CATALOG_ID_PREFIX)?;
        let kind = match rest {
            "watchlist" => CatalogKind::Watchlist,
            "diary" => CatalogKind::Diary,
            "friends" => CatalogKind::Friends,
            "liked" => CatalogKind::Liked,
            "popular" => CatalogKind::Popular,
            "top-rated" => CatalogKind::TopRated,
            _ => {
                if let Some(list_id) = rest.strip_prefix("list-").filter(|s| !s.is_empty()) {
                    CatalogKind::List(list_id.to_string())
                } else if let Some(username) =
                    rest.strip_prefix("watchlist-").filter(|s| !s.is_empty())
                {
                    CatalogKind::ExternalWatchlist(username.to_string())
                } else {
                    return None;
                }
            }
        };
        Some(kind)
    }

    /// The addon catalog id; the inverse of [`CatalogKind::parse`].
    pub fn catalog_id(&self) -> String {
        match self {
            CatalogKind::List(id) => format!("{}list-{}", CATALOG_ID_PREFIX, id),
            CatalogKind::ExternalWatchlist(username) => {
                format!("{}watchlist-{}", CATALOG_ID_PREFIX, username)
            }
            other => format!("{}{}", CATALOG_ID_PREFIX, other.name().replace('_', "-")),
        }
    }

    /// Stable label for logs and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            CatalogKind::Watchlist => "watchlist",
            CatalogKind::Diary => "diary",
            CatalogKind::Friends => "friends",
            CatalogKind::Liked => "liked",
            CatalogKind::List(_) => "list",
            CatalogKind::Popular => "popular",
            CatalogKind::TopRated => "top_rated",
            CatalogKind::ExternalWatchlist(_) => "external_watchlist",
        }
    }

    /// Default title shown in the addon manifest.
    pub fn display_name(&self) -> String {
        match self {
            CatalogKind::Watchlist => "Watchlist".to_string(),
            CatalogKind::Diary => "Diary".to_string(),
            CatalogKind::Friends => "Friends Activity".to_string(),
            CatalogKind::Liked => "Liked Films".to_string(),
            CatalogKind::List(_) => "List".to_string(),
            CatalogKind::Popular => "Popular This Week".to_string(),
            CatalogKind::TopRated => "Top Rated".to_string(),
            CatalogKind::ExternalWatchlist(username) => format!("{}'s Watchlist", username),
        }
    }

    /// Cache key segment. Includes the escaped resource id for
    /// parameterised kinds.
    pub fn segment(&self) -> String {
        match self {
            CatalogKind::List(id) => format!("list-{}", key_component(id)),
            // Keyed by the resolved member, so the username is not needed
            CatalogKind::ExternalWatchlist(_) => "watchlist".to_string(),
            other => other.name().to_string(),
        }
    }

    /// How many upstream pages are fetched at most.
    pub fn page_limit(&self) -> PageLimit {
        match self {
            CatalogKind::Watchlist
            | CatalogKind::Liked
            | CatalogKind::List(_)
            | CatalogKind::ExternalWatchlist(_) => PageLimit::pages(10),
            CatalogKind::Diary => PageLimit::pages(5),
            CatalogKind::Friends => PageLimit::pages(3),
            CatalogKind::Popular => PageLimit::pages(1),
            CatalogKind::TopRated => PageLimit::pages(3),
        }
    }

    /// Diary, friends and popular have a fixed upstream order.
    pub fn is_sortable(&self) -> bool {
        !matches!(
            self,
            CatalogKind::Diary | CatalogKind::Friends | CatalogKind::Popular
        )
    }

    /// Sort used when the request does not select one.
    pub fn default_sort(&self) -> Option<FilmSort> {
        match self {
            CatalogKind::Watchlist | CatalogKind::ExternalWatchlist(_) | CatalogKind::Liked => {
                Some(FilmSort::Added)
            }
            CatalogKind::List(_) | CatalogKind::TopRated => Some(FilmSort::ListRanking),
            CatalogKind::Popular => Some(FilmSort::FilmPopularityThisWeek),
            CatalogKind::Diary | CatalogKind::Friends => None,
        }
    }

    /// The sort actually sent upstream for the given options.
    pub fn effective_sort(&self, options: &CatalogOptions) -> Option<FilmSort> {
        if self.is_sortable() {
            options.sort.or_else(|| self.default_sort())
        } else {
            self.default_sort()
        }
    }
}

/// Drop repeated kinds, keeping the first occurrence of each.
pub fn unique_kinds(kinds: impl IntoIterator<Item = CatalogKind>) -> Vec<CatalogKind> {
    let mut seen = HashSet::new();
    kinds
        .into_iter()
        .filter(|kind| seen.insert(kind.clone()))
        .collect()
}

impl fmt::Display for CatalogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.catalog_id())
    }
}

// ============================================================================
// Sort & Options
// ============================================================================

/// A sort choice offered to the addon client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Upstream(FilmSort),
    /// Uniform random permutation of the cached collection, per request.
    Shuffle,
}

impl SortOrder {
    /// Every label in the order it is offered in the manifest.
    pub const LABELS: [&'static str; 8] = [
        "Recently Added",
        "Oldest Added",
        "Release Date (Newest)",
        "Release Date (Oldest)",
        "Highest Rated",
        "Lowest Rated",
        "Popularity",
        "Shuffle",
    ];

    pub fn from_label(label: &str) -> Option<Self> {
        let sort = match label.trim() {
            "Recently Added" => FilmSort::Added,
            "Oldest Added" => FilmSort::AddedEarliest,
            "Release Date (Newest)" => FilmSort::ReleaseDateLatestFirst,
            "Release Date (Oldest)" => FilmSort::ReleaseDateEarliestFirst,
            "Highest Rated" => FilmSort::AverageRatingHighToLow,
            "Lowest Rated" => FilmSort::AverageRatingLowToHigh,
            "Popularity" => FilmSort::FilmPopularity,
            "Shuffle" => return Some(SortOrder::Shuffle),
            _ => return None,
        };
        Some(SortOrder::Upstream(sort))
    }
}

/// Per-request catalog options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogOptions {
    /// Explicit upstream sort; `None` uses the kind's default.
    pub sort: Option<FilmSort>,
    /// Reshuffle the collection on every request. Not part of the cache key.
    pub shuffle: bool,
    /// Overlay rating badges on posters.
    pub show_ratings: bool,
}

impl CatalogOptions {
    pub fn new(show_ratings: bool) -> Self {
        Self {
            show_ratings,
            ..Default::default()
        }
    }

    /// Options for a sort label; unknown labels keep the default sort.
    pub fn from_label(label: Option<&str>, show_ratings: bool) -> Self {
        let mut options = Self::new(show_ratings);
        match label.and_then(SortOrder::from_label) {
            Some(SortOrder::Upstream(sort)) => options.sort = Some(sort),
            Some(SortOrder::Shuffle) => options.shuffle = true,
            None => {}
        }
        options
    }

    pub fn with_sort(mut self, sort: FilmSort) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn shuffled(mut self) -> Self {
        self.shuffle = true;
        self
    }
}

// ============================================================================
// Subject
// ============================================================================

/// Who a catalog request is scoped to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subject {
    /// An authenticated internal user.
    User { user_id: String, member_id: String },
    /// A shared configuration, resolved to an upstream member when it names one.
    Shared { member_id: Option<String> },
}

impl Subject {
    pub fn user(user_id: impl Into<String>, member_id: impl Into<String>) -> Self {
        Subject::User {
            user_id: user_id.into(),
            member_id: member_id.into(),
        }
    }

    /// The upstream member the subject's collections belong to.
    pub fn member_id(&self) -> Option<&str> {
        match self {
            Subject::User { member_id, .. } => Some(member_id),
            Subject::Shared { member_id } => member_id.as_deref(),
        }
    }

    /// Identity component of a cache key.
    pub fn identity(&self) -> String {
        match self {
            Subject::User { user_id, .. } => user_identity(user_id),
            Subject::Shared {
                member_id: Some(member_id),
            } => member_identity(member_id),
            Subject::Shared { member_id: None } => PUBLIC_IDENTITY.to_string(),
        }
    }
}

/// Identity for collections that are the same for every subject.
pub const GLOBAL_IDENTITY: &str = "global";
/// Identity for public collections not tied to a member.
pub const PUBLIC_IDENTITY: &str = "public";

pub fn user_identity(user_id: &str) -> String {
    format!("user:{}", key_component(user_id))
}

pub fn member_identity(member_id: &str) -> String {
    format!("member:{}", key_component(member_id))
}

/// Percent-encode a caller-supplied id so it cannot contain the `:`
/// separator of a cache key.
pub fn key_component(raw: &str) -> std::borrow::Cow<'_, str> {
    urlencoding::encode(raw)
}

// ============================================================================
// Cache Key
// ============================================================================

/// Deterministic key of one cached collection.
///
/// Format: `{identity}:{segment}:r{0|1}:s{sort}`. Ids inside the identity
/// and segment are percent-encoded. Pagination and shuffle are never part of
/// the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(identity: &str, kind: &CatalogKind, options: &CatalogOptions) -> Self {
        let sort = kind
            .effective_sort(options)
            .map_or("default", |s| s.as_str());
        Self(format!(
            "{}:{}:r{}:s{}",
            identity,
            kind.segment(),
            u8::from(options.show_ratings),
            sort
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Prefix matching every key of one identity.
    pub fn identity_prefix(identity: &str) -> String {
        format!("{}:", identity)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a catalog request's collection lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogScope {
    pub key: CacheKey,
    pub class: CacheClass,
}

// ============================================================================
// Settings & Errors
// ============================================================================

/// Orchestrator settings derived from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogSettings {
    /// Items per addon page.
    pub page_size: usize,
    /// Upstream list backing the top-rated catalog.
    pub top_rated_list_id: Option<String>,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            page_size: 100,
            top_rated_list_id: None,
        }
    }
}

/// Errors inside the catalog pipeline. Catalog reads never surface these;
/// they are logged and turned into an empty page.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Session error: {0}")]
    Session(#[from] crate::session::SessionError),

    #[error("Upstream error: {0}")]
    Upstream(#[from] crate::upstream::UpstreamError),

    /// The catalog id does not name a known catalog.
    #[error("Unknown catalog: {0}")]
    UnknownCatalog(String),

    /// The kind cannot be served for this subject.
    #[error("Catalog {kind} is not available: {reason}")]
    Unavailable { kind: String, reason: String },

    /// A username did not resolve to an upstream member.
    #[error("Member not found: {0}")]
    MemberNotFound(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_catalog_ids() {
        assert_eq!(CatalogKind::parse("boxdio-watchlist"), Some(CatalogKind::Watchlist));
        assert_eq!(CatalogKind::parse("boxdio-top-rated"), Some(CatalogKind::TopRated));
        assert_eq!(
            CatalogKind::parse("boxdio-list-2ZKlq"),
            Some(CatalogKind::List("2ZKlq".to_string()))
        );
        assert_eq!(
            CatalogKind::parse("boxdio-watchlist-davidehrlich"),
            Some(CatalogKind::ExternalWatchlist("davidehrlich".to_string()))
        );
        assert_eq!(CatalogKind::parse("boxdio-list-"), None);
        assert_eq!(CatalogKind::parse("boxdio-reviews"), None);
        assert_eq!(CatalogKind::parse("watchlist"), None);
    }

    #[test]
    fn test_catalog_id_round_trips() {
        let kinds = [
            CatalogKind::Watchlist,
            CatalogKind::Diary,
            CatalogKind::Friends,
            CatalogKind::Liked,
            CatalogKind::List("abc".to_string()),
            CatalogKind::Popular,
            CatalogKind::TopRated,
            CatalogKind::ExternalWatchlist("ann".to_string()),
        ];
        for kind in kinds {
            assert_eq!(CatalogKind::parse(&kind.catalog_id()), Some(kind));
        }
    }

    #[test]
    fn test_sort_labels() {
        assert_eq!(
            SortOrder::from_label("Release Date (Newest)"),
            Some(SortOrder::Upstream(FilmSort::ReleaseDateLatestFirst))
        );
        assert_eq!(SortOrder::from_label("Shuffle"), Some(SortOrder::Shuffle));
        assert_eq!(SortOrder::from_label("Alphabetical"), None);
        for label in SortOrder::LABELS {
            assert!(SortOrder::from_label(label).is_some(), "{}", label);
        }
    }

    #[test]
    fn test_options_from_unknown_label_keep_default() {
        let options = CatalogOptions::from_label(Some("Nope"), true);
        assert_eq!(options, CatalogOptions::new(true));

        let shuffled = CatalogOptions::from_label(Some("Shuffle"), false);
        assert!(shuffled.shuffle);
        assert_eq!(shuffled.sort, None);
    }

    #[test]
    fn test_cache_key_format() {
        let subject = Subject::user("7", "m7");
        let key = CacheKey::new(
            &subject.identity(),
            &CatalogKind::Watchlist,
            &CatalogOptions::new(true),
        );
        assert_eq!(key.as_str(), "user:7:watchlist:r1:sAdded");
    }

    #[test]
    fn test_cache_key_varies_with_sort_and_ratings_only() {
        let identity = Subject::user("7", "m7").identity();
        let kind = CatalogKind::Watchlist;
        let base = CatalogOptions::new(false);

        let plain = CacheKey::new(&identity, &kind, &base);
        let rated = CacheKey::new(&identity, &kind, &CatalogOptions::new(true));
        let sorted = CacheKey::new(&identity, &kind, &base.with_sort(FilmSort::FilmPopularity));
        let shuffled = CacheKey::new(&identity, &kind, &base.shuffled());
        let explicit_default = CacheKey::new(&identity, &kind, &base.with_sort(FilmSort::Added));

        assert_ne!(plain, rated);
        assert_ne!(plain, sorted);
        assert_eq!(plain, shuffled);
        assert_eq!(plain, explicit_default);
    }

    #[test]
    fn test_unsortable_kinds_ignore_sort() {
        let identity = Subject::user("7", "m7").identity();
        let options = CatalogOptions::new(false).with_sort(FilmSort::AverageRatingHighToLow);
        let key = CacheKey::new(&identity, &CatalogKind::Diary, &options);
        assert_eq!(key.as_str(), "user:7:diary:r0:sdefault");
    }

    #[test]
    fn test_user_prefix_does_not_match_longer_ids() {
        let prefix = CacheKey::identity_prefix(&user_identity("1"));
        let other = CacheKey::new(
            &user_identity("10"),
            &CatalogKind::Diary,
            &CatalogOptions::default(),
        );
        assert!(!other.as_str().starts_with(&prefix));
    }

    #[test]
    fn test_ids_containing_separators_do_not_collide() {
        let options = CatalogOptions::default();
        let watchlist = CacheKey::new(
            &user_identity("x:list-y"),
            &CatalogKind::Watchlist,
            &options.with_sort(FilmSort::Added),
        );
        let list = CacheKey::new(
            &user_identity("x"),
            &CatalogKind::List("y:watchlist".to_string()),
            &options.with_sort(FilmSort::Added),
        );
        assert_ne!(watchlist, list);
        assert_eq!(watchlist.as_str(), "user:x%3Alist-y:watchlist:r0:sAdded");

        let prefix = CacheKey::identity_prefix(&user_identity("x"));
        assert!(!watchlist.as_str().starts_with(&prefix));
        assert!(list.as_str().starts_with(&prefix));
    }

    #[test]
    fn test_unique_kinds_keeps_first_occurrence() {
        let kinds = unique_kinds([
            CatalogKind::List("a".to_string()),
            CatalogKind::Watchlist,
            CatalogKind::List("b".to_string()),
            CatalogKind::List("a".to_string()),
        ]);
        assert_eq!(
            kinds,
            vec![
                CatalogKind::List("a".to_string()),
                CatalogKind::Watchlist,
                CatalogKind::List("b".to_string()),
            ]
        );
    }

    #[test]
    fn test_shared_identity() {
        assert_eq!(
            Subject::Shared {
                member_id: Some("m1".to_string())
            }
            .identity(),
            "member:m1"
        );
        assert_eq!(Subject::Shared { member_id: None }.identity(), "public");
    }

    #[test]
    fn test_catalog_item_serializes_addon_meta() {
        let item = CatalogItem {
            external_id: "tt0113277".to_string(),
            kind: "movie".to_string(),
            title: "Heat".to_string(),
            poster_url: None,
            release_year: Some(1995),
            genres: vec![],
            directors: vec!["Michael Mann".to_string()],
            runtime: Some("170 min".to_string()),
            description: None,
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["id"], "tt0113277");
        assert_eq!(json["type"], "movie");
        assert_eq!(json["name"], "Heat");
        assert_eq!(json["director"][0], "Michael Mann");
        assert!(json.get("poster").is_none());
        assert!(json.get("genres").is_none());
    }
}
