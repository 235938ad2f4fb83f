//! Cache classes and their default sizing.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::catalog::CatalogItem;

/// One semantic resource class. Every class gets its own cache instance,
/// so keys from different classes can never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheClass {
    /// Single-film details by upstream film id.
    Films,
    /// Per-user film relationship snapshots (rating, liked, watched).
    UserRatings,
    /// External id (IMDb) to upstream film id.
    IdMapping,
    /// Authenticated users' watchlist, diary, friends feed and custom lists.
    UserLists,
    /// Popular-this-week collection.
    Popular,
    /// The fixed top-rated list.
    TopRated,
    /// Username to upstream member id.
    MemberId,
    /// List id to list display name.
    ListNames,
    /// Watchlists read through a shared configuration or external username.
    PublicWatchlist,
    /// Lists read through a shared configuration.
    PublicList,
    /// Liked films.
    LikedFilms,
    /// External id to raw poster URL.
    PosterImage,
    /// Authenticated session handles.
    Session,
}

impl CacheClass {
    pub const ALL: [CacheClass; 13] = [
        CacheClass::Films,
        CacheClass::UserRatings,
        CacheClass::IdMapping,
        CacheClass::UserLists,
        CacheClass::Popular,
        CacheClass::TopRated,
        CacheClass::MemberId,
        CacheClass::ListNames,
        CacheClass::PublicWatchlist,
        CacheClass::PublicList,
        CacheClass::LikedFilms,
        CacheClass::PosterImage,
        CacheClass::Session,
    ];

    /// Stable name used in stats output, metrics labels and config keys.
    pub fn name(&self) -> &'static str {
        match self {
            CacheClass::Films => "films",
            CacheClass::UserRatings => "user_ratings",
            CacheClass::IdMapping => "id_mapping",
            CacheClass::UserLists => "user_lists",
            CacheClass::Popular => "popular",
            CacheClass::TopRated => "top_rated",
            CacheClass::MemberId => "member_id",
            CacheClass::ListNames => "list_names",
            CacheClass::PublicWatchlist => "public_watchlist",
            CacheClass::PublicList => "public_list",
            CacheClass::LikedFilms => "liked_films",
            CacheClass::PosterImage => "poster_image",
            CacheClass::Session => "session",
        }
    }

    /// Capacity and TTL tuned to the volatility of the resource.
    pub fn default_settings(&self) -> CacheSettings {
        const MINUTE: u64 = 60;
        const HOUR: u64 = 60 * MINUTE;

        let (capacity, ttl_secs) = match self {
            CacheClass::Films => (5000, 6 * HOUR),
            CacheClass::UserRatings => (5000, 30),
            CacheClass::IdMapping => (20_000, 24 * HOUR),
            CacheClass::UserLists => (1000, 5 * MINUTE),
            CacheClass::Popular => (20, 6 * HOUR),
            CacheClass::TopRated => (20, 24 * HOUR),
            CacheClass::MemberId => (5000, 24 * HOUR),
            CacheClass::ListNames => (5000, 24 * HOUR),
            CacheClass::PublicWatchlist => (500, 10 * MINUTE),
            CacheClass::PublicList => (500, 10 * MINUTE),
            CacheClass::LikedFilms => (500, 5 * MINUTE),
            CacheClass::PosterImage => (2000, HOUR),
            CacheClass::Session => (5000, HOUR),
        };

        CacheSettings {
            capacity,
            ttl: Duration::from_secs(ttl_secs),
        }
    }
}

/// Sizing of one cache instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSettings {
    /// Maximum number of entries before least-recently-used eviction.
    pub capacity: usize,
    /// Default time-to-live for entries.
    pub ttl: Duration,
}

/// Size report for one cache instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub size: usize,
    pub max: usize,
}

/// A whole normalized catalog, stored once and sliced per page request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CachedCollection {
    pub items: Vec<CatalogItem>,
}

impl CachedCollection {
    pub fn new(items: Vec<CatalogItem>) -> Self {
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
