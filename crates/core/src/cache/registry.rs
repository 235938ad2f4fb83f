//! The set of named cache instances, built once at startup and shared.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::{CacheClass, CacheSettings, CacheStats, CachedCollection, TtlCache};
use crate::session::SessionHandle;
use crate::upstream::{FilmRelationship, FilmSummary};

/// Operations every cache instance supports regardless of its value type.
pub trait CacheInstance: Send + Sync {
    fn name(&self) -> &'static str;
    fn stats(&self) -> CacheStats;
    fn remove_prefix(&self, prefix: &str) -> usize;
    fn clear(&self);
}

impl<V: Clone + Send> CacheInstance for TtlCache<V> {
    fn name(&self) -> &'static str {
        TtlCache::name(self)
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.len(),
            max: self.capacity(),
        }
    }

    fn remove_prefix(&self, prefix: &str) -> usize {
        TtlCache::remove_prefix(self, prefix)
    }

    fn clear(&self) {
        TtlCache::clear(self)
    }
}

type Collections = TtlCache<Arc<CachedCollection>>;

fn build<V: Clone>(class: CacheClass, overrides: &HashMap<CacheClass, CacheSettings>) -> TtlCache<V> {
    let settings = overrides
        .get(&class)
        .copied()
        .unwrap_or_else(|| class.default_settings());
    TtlCache::new(class.name(), settings)
}

/// One cache instance per [`CacheClass`].
pub struct CacheRegistry {
    pub films: TtlCache<FilmSummary>,
    pub user_ratings: TtlCache<FilmRelationship>,
    pub id_mapping: TtlCache<String>,
    pub user_lists: Collections,
    pub popular: Collections,
    pub top_rated: Collections,
    pub member_id: TtlCache<String>,
    pub list_names: TtlCache<String>,
    pub public_watchlist: Collections,
    pub public_list: Collections,
    pub liked_films: Collections,
    pub poster_image: TtlCache<String>,
    pub session: TtlCache<SessionHandle>,
}

impl Default for CacheRegistry {
    fn default() -> Self {
        Self::new(&HashMap::new())
    }
}

impl CacheRegistry {
    /// Build every instance, applying `overrides` on top of the class defaults.
    pub fn new(overrides: &HashMap<CacheClass, CacheSettings>) -> Self {
        Self {
            films: build(CacheClass::Films, overrides),
            user_ratings: build(CacheClass::UserRatings, overrides),
            id_mapping: build(CacheClass::IdMapping, overrides),
            user_lists: build(CacheClass::UserLists, overrides),
            popular: build(CacheClass::Popular, overrides),
            top_rated: build(CacheClass::TopRated, overrides),
            member_id: build(CacheClass::MemberId, overrides),
            list_names: build(CacheClass::ListNames, overrides),
            public_watchlist: build(CacheClass::PublicWatchlist, overrides),
            public_list: build(CacheClass::PublicList, overrides),
            liked_films: build(CacheClass::LikedFilms, overrides),
            poster_image: build(CacheClass::PosterImage, overrides),
            session: build(CacheClass::Session, overrides),
        }
    }

    /// The collection cache for a class, if that class stores collections.
    pub fn collections(&self, class: CacheClass) -> Option<&TtlCache<Arc<CachedCollection>>> {
        match class {
            CacheClass::UserLists => Some(&self.user_lists),
            CacheClass::Popular => Some(&self.popular),
            CacheClass::TopRated => Some(&self.top_rated),
            CacheClass::PublicWatchlist => Some(&self.public_watchlist),
            CacheClass::PublicList => Some(&self.public_list),
            CacheClass::LikedFilms => Some(&self.liked_films),
            _ => None,
        }
    }

    fn instances(&self) -> [&dyn CacheInstance; 13] {
        [
            &self.films,
            &self.user_ratings,
            &self.id_mapping,
            &self.user_lists,
            &self.popular,
            &self.top_rated,
            &self.member_id,
            &self.list_names,
            &self.public_watchlist,
            &self.public_list,
            &self.liked_films,
            &self.poster_image,
            &self.session,
        ]
    }

    /// Remove every entry, in every instance, whose key starts with `prefix`.
    pub fn remove_prefix(&self, prefix: &str) -> usize {
        self.instances()
            .iter()
            .map(|cache| cache.remove_prefix(prefix))
            .sum()
    }

    pub fn stats(&self) -> BTreeMap<String, CacheStats> {
        self.instances()
            .iter()
            .map(|cache| (cache.name().to_string(), cache.stats()))
            .collect()
    }

    pub fn clear_all(&self) {
        for cache in self.instances() {
            cache.clear();
        }
    }
}
