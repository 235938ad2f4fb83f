//! Mapping of upstream records into addon catalog items.
//!
//! One function per upstream shape. A record whose film carries no IMDb id
//! cannot be cross-referenced by the addon client and is dropped. As a side
//! effect every mapped film records its external id to upstream id mapping
//! and raw poster in the long-lived caches.

use std::cmp::Reverse;
use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex_lite::Regex;

use crate::cache::CacheRegistry;
use crate::catalog::CatalogItem;
use crate::upstream::{ActivityItem, ActivityKind, FilmSummary, Image, ListEntry, LogEntry};

/// Poster width the addon client displays best.
const TARGET_POSTER_WIDTH: u32 = 300;

static IMDB_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^tt\d+$").unwrap());

/// Maps upstream records to [`CatalogItem`]s.
#[derive(Clone)]
pub struct Transformer {
    caches: Arc<CacheRegistry>,
    badge_base_url: Option<String>,
}

impl Transformer {
    /// `badge_base_url` is the rating-badge proxy endpoint; `None` disables
    /// badge overlays entirely.
    pub fn new(caches: Arc<CacheRegistry>, badge_base_url: Option<String>) -> Self {
        Self {
            caches,
            badge_base_url,
        }
    }

    // ========================================================================
    // Single records
    // ========================================================================

    /// A watchlist, liked or popular film. The badge shows the average rating.
    pub fn film(&self, film: &FilmSummary, show_ratings: bool) -> Option<CatalogItem> {
        let description = film
            .tagline
            .clone()
            .or_else(|| film.description.clone())
            .filter(|d| !d.is_empty());
        self.item(film, film.rating, show_ratings, description)
    }

    /// A diary entry. The badge shows the member's own rating.
    pub fn log_entry(&self, entry: &LogEntry, show_ratings: bool) -> Option<CatalogItem> {
        self.item(
            &entry.film,
            entry.rating,
            show_ratings,
            diary_description(entry),
        )
    }

    /// A list entry; ranked lists describe the rank.
    pub fn list_entry(&self, entry: &ListEntry, show_ratings: bool) -> Option<CatalogItem> {
        let description = entry.rank.map(|rank| format!("#{}", rank));
        self.item(&entry.film, entry.film.rating, show_ratings, description)
    }

    /// An activity-feed entry; described as a sentence naming the actor.
    pub fn activity(&self, activity: &ActivityItem, show_ratings: bool) -> Option<CatalogItem> {
        let film = activity.film()?;
        let description = activity_description(activity)?;
        self.item(film, activity.rating(), show_ratings, Some(description))
    }

    // ========================================================================
    // Batches (deduplicated by external id, first occurrence wins)
    // ========================================================================

    pub fn films(&self, films: &[FilmSummary], show_ratings: bool) -> Vec<CatalogItem> {
        dedup(films.iter().filter_map(|f| self.film(f, show_ratings)))
    }

    pub fn log_entries(&self, entries: &[LogEntry], show_ratings: bool) -> Vec<CatalogItem> {
        dedup(entries.iter().filter_map(|e| self.log_entry(e, show_ratings)))
    }

    pub fn list_entries(&self, entries: &[ListEntry], show_ratings: bool) -> Vec<CatalogItem> {
        dedup(entries.iter().filter_map(|e| self.list_entry(e, show_ratings)))
    }

    /// Activity of everyone but `viewer_member_id`.
    pub fn activities(
        &self,
        items: &[ActivityItem],
        viewer_member_id: Option<&str>,
        show_ratings: bool,
    ) -> Vec<CatalogItem> {
        dedup(
            items
                .iter()
                .filter(|item| Some(item.member.id.as_str()) != viewer_member_id)
                .filter_map(|item| self.activity(item, show_ratings)),
        )
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn item(
        &self,
        film: &FilmSummary,
        rating: Option<f32>,
        show_ratings: bool,
        description: Option<String>,
    ) -> Option<CatalogItem> {
        let external_id = external_id(film)?.to_string();
        let raw_poster = film.poster.as_ref().and_then(select_poster);

        self.caches.id_mapping.set(external_id.clone(), film.id.clone());
        if let Some(poster) = &raw_poster {
            self.caches.poster_image.set(external_id.clone(), poster.clone());
        }

        let poster_url = match (raw_poster, rating, &self.badge_base_url) {
            (Some(poster), Some(rating), Some(base)) if show_ratings => {
                Some(badge_url(base, &poster, rating))
            }
            (poster, _, _) => poster,
        };

        Some(CatalogItem {
            external_id,
            kind: "movie".to_string(),
            title: film.name.clone(),
            poster_url,
            release_year: film.release_year,
            genres: film.genres.iter().map(|g| g.name.clone()).collect(),
            directors: film.directors.iter().map(|d| d.name.clone()).collect(),
            runtime: film.run_time.map(|minutes| format!("{} min", minutes)),
            description,
        })
    }
}

/// The film's IMDb id, if it has a well-formed one.
pub fn external_id(film: &FilmSummary) -> Option<&str> {
    film.link_id("imdb").filter(|id| is_external_id(id))
}

/// Whether `id` is a well-formed IMDb id such as `tt0113277`.
pub fn is_external_id(id: &str) -> bool {
    IMDB_ID.is_match(id)
}

/// The size closest to the target width (ties go to the larger), falling
/// back to the largest image when no size reports a width.
pub fn select_poster(image: &Image) -> Option<String> {
    image
        .sizes
        .iter()
        .filter(|size| size.width > 0)
        .min_by_key(|size| {
            (
                size.width.abs_diff(TARGET_POSTER_WIDTH),
                Reverse(size.width),
            )
        })
        .or_else(|| image.sizes.iter().max_by_key(|size| size.height))
        .map(|size| size.url.clone())
}

/// Badge-proxy URL carrying the original poster and the rating.
pub fn badge_url(base: &str, poster: &str, rating: f32) -> String {
    format!(
        "{}?poster={}&rating={}",
        base,
        urlencoding::encode(poster),
        rating
    )
}

/// `★` per whole star and `½` for a half, e.g. 3.5 -> "★★★½".
pub fn stars(rating: f32) -> String {
    let halves = (rating * 2.0).round().clamp(0.0, 10.0) as usize;
    let mut out = "★".repeat(halves / 2);
    if halves % 2 == 1 {
        out.push('½');
    }
    out
}

/// "12 Jan 2024" from an ISO date; unparseable dates are kept verbatim.
fn display_date(iso: &str) -> String {
    NaiveDate::parse_from_str(iso, "%Y-%m-%d")
        .map(|date| date.format("%-d %b %Y").to_string())
        .unwrap_or_else(|_| iso.to_string())
}

fn diary_description(entry: &LogEntry) -> Option<String> {
    let mut parts = Vec::new();
    if entry.diary_details.as_ref().is_some_and(|d| d.rewatch) {
        parts.push("Rewatch".to_string());
    }
    if entry.like {
        parts.push("Liked".to_string());
    }
    if let Some(rating) = entry.rating {
        parts.push(format!("rated {}", stars(rating)));
    }
    if let Some(details) = &entry.diary_details {
        parts.push(display_date(&details.diary_date));
    }

    (!parts.is_empty()).then(|| parts.join(" · "))
}

fn activity_description(activity: &ActivityItem) -> Option<String> {
    let actor = activity.member.label();
    let rated = activity.rating().map(|r| format!("{} rated {}", actor, stars(r)));

    let sentence = match activity.kind {
        ActivityKind::FilmRatingActivity | ActivityKind::DiaryEntryActivity => {
            rated.unwrap_or_else(|| format!("{} watched", actor))
        }
        ActivityKind::FilmWatchActivity => format!("{} watched", actor),
        ActivityKind::FilmLikeActivity => format!("{} liked", actor),
        ActivityKind::WatchlistActivity => format!("{} added to watchlist", actor),
        ActivityKind::ReviewActivity => format!("{} reviewed", actor),
        ActivityKind::Other => return None,
    };
    Some(sentence)
}

fn dedup(items: impl Iterator<Item = CatalogItem>) -> Vec<CatalogItem> {
    let mut seen = HashSet::new();
    items
        .filter(|item| seen.insert(item.external_id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;
    use crate::upstream::{DiaryDetails, ImageSize, MemberSummary};

    fn transformer() -> (Transformer, Arc<CacheRegistry>) {
        let caches = Arc::new(CacheRegistry::default());
        let transformer = Transformer::new(
            caches.clone(),
            Some("http://localhost:7000/badge".to_string()),
        );
        (transformer, caches)
    }

    fn size(width: u32, height: u32) -> ImageSize {
        ImageSize {
            width,
            height,
            url: format!("https://img/{}x{}.jpg", width, height),
        }
    }

    #[test]
    fn test_film_without_imdb_is_dropped() {
        let (t, caches) = transformer();
        assert!(t.film(&fixtures::film_without_imdb("f1", "Obscure"), false).is_none());
        assert!(caches.id_mapping.is_empty());
    }

    #[test]
    fn test_malformed_imdb_id_is_dropped() {
        let (t, _) = transformer();
        let film = fixtures::film("f1", "nm0000001", "Person");
        assert!(t.film(&film, false).is_none());
    }

    #[test]
    fn test_film_maps_fields_and_records_id_mapping() {
        let (t, caches) = transformer();
        let mut film = fixtures::film("2bbs", "tt0113277", "Heat");
        film.release_year = Some(1995);
        film.run_time = Some(170);
        film.tagline = Some("A Los Angeles crime saga".to_string());

        let item = t.film(&film, false).unwrap();

        assert_eq!(item.external_id, "tt0113277");
        assert_eq!(item.kind, "movie");
        assert_eq!(item.title, "Heat");
        assert_eq!(item.release_year, Some(1995));
        assert_eq!(item.runtime.as_deref(), Some("170 min"));
        assert_eq!(item.description.as_deref(), Some("A Los Angeles crime saga"));
        assert_eq!(caches.id_mapping.get("tt0113277").as_deref(), Some("2bbs"));
        assert!(caches.poster_image.get("tt0113277").is_some());
    }

    #[test]
    fn test_poster_prefers_closest_to_target_width() {
        let image = Image {
            sizes: vec![size(150, 225), size(230, 345), size(500, 750), size(1000, 1500)],
        };
        assert_eq!(select_poster(&image).as_deref(), Some("https://img/230x345.jpg"));
    }

    #[test]
    fn test_poster_tie_prefers_larger() {
        let image = Image {
            sizes: vec![size(250, 375), size(350, 525)],
        };
        assert_eq!(select_poster(&image).as_deref(), Some("https://img/350x525.jpg"));
    }

    #[test]
    fn test_poster_without_widths_takes_largest() {
        let image = Image {
            sizes: vec![size(0, 300), size(0, 900), size(0, 600)],
        };
        assert_eq!(select_poster(&image).as_deref(), Some("https://img/0x900.jpg"));
        assert_eq!(select_poster(&Image::default()), None);
    }

    #[test]
    fn test_badge_applied_only_with_rating_and_flag() {
        let (t, _) = transformer();
        let mut film = fixtures::film("f1", "tt0000001", "Rated");
        film.rating = Some(3.5);

        let plain = t.film(&film, false).unwrap();
        let badged = t.film(&film, true).unwrap();

        let raw = plain.poster_url.unwrap();
        let badge = badged.poster_url.unwrap();
        assert!(badge.starts_with("http://localhost:7000/badge?poster="));
        assert!(badge.ends_with("&rating=3.5"));
        assert!(badge.contains(&*urlencoding::encode(&raw)));

        film.rating = None;
        let unrated = t.film(&film, true).unwrap();
        assert_eq!(unrated.poster_url.as_deref(), Some(raw.as_str()));
    }

    #[test]
    fn test_no_badge_without_proxy() {
        let t = Transformer::new(Arc::new(CacheRegistry::default()), None);
        let mut film = fixtures::film("f1", "tt0000001", "Rated");
        film.rating = Some(4.0);
        let item = t.film(&film, true).unwrap();
        assert!(!item.poster_url.unwrap().contains("rating="));
    }

    #[test]
    fn test_stars() {
        assert_eq!(stars(4.0), "★★★★");
        assert_eq!(stars(3.5), "★★★½");
        assert_eq!(stars(0.5), "½");
        assert_eq!(stars(5.0), "★★★★★");
    }

    #[test]
    fn test_diary_description() {
        let (t, _) = transformer();
        let mut entry = fixtures::log_entry("tt0000001", "Alien", Some(3.5));
        entry.like = true;
        entry.diary_details = Some(DiaryDetails {
            diary_date: "2024-01-12".to_string(),
            rewatch: false,
        });

        let item = t.log_entry(&entry, false).unwrap();
        assert_eq!(
            item.description.as_deref(),
            Some("Liked · rated ★★★½ · 12 Jan 2024")
        );

        entry.like = false;
        entry.rating = None;
        entry.diary_details = Some(DiaryDetails {
            diary_date: "2023-07-04".to_string(),
            rewatch: true,
        });
        let item = t.log_entry(&entry, false).unwrap();
        assert_eq!(item.description.as_deref(), Some("Rewatch · 4 Jul 2023"));
    }

    #[test]
    fn test_diary_badge_uses_member_rating() {
        let (t, _) = transformer();
        let mut entry = fixtures::log_entry("tt0000001", "Alien", Some(2.0));
        entry.film.rating = Some(4.1);
        let item = t.log_entry(&entry, true).unwrap();
        assert!(item.poster_url.unwrap().ends_with("&rating=2"));
    }

    #[test]
    fn test_ranked_list_entry_description() {
        let (t, _) = transformer();
        let entry = fixtures::list_entry("tt0000042", "Answer", Some(42));
        assert_eq!(t.list_entry(&entry, false).unwrap().description.as_deref(), Some("#42"));

        let unranked = fixtures::list_entry("tt0000043", "Other", None);
        assert_eq!(t.list_entry(&unranked, false).unwrap().description, None);
    }

    #[test]
    fn test_activity_sentences() {
        let (t, _) = transformer();
        let rated = fixtures::activity(
            ActivityKind::FilmRatingActivity,
            "m2",
            "Ann",
            "tt0000001",
            Some(4.0),
        );
        let watchlisted = fixtures::activity(
            ActivityKind::WatchlistActivity,
            "m2",
            "Ann",
            "tt0000002",
            None,
        );

        assert_eq!(
            t.activity(&rated, false).unwrap().description.as_deref(),
            Some("Ann rated ★★★★")
        );
        assert_eq!(
            t.activity(&watchlisted, false).unwrap().description.as_deref(),
            Some("Ann added to watchlist")
        );
    }

    #[test]
    fn test_activity_without_film_or_known_kind_is_dropped() {
        let (t, _) = transformer();
        let follow = ActivityItem {
            kind: ActivityKind::Other,
            member: MemberSummary {
                id: "m2".to_string(),
                username: "ann".to_string(),
                display_name: None,
            },
            film: Some(fixtures::film("f1", "tt0000001", "Alien")),
            diary_entry: None,
            review: None,
            rating: None,
        };
        assert!(t.activity(&follow, false).is_none());

        let mut no_film = follow.clone();
        no_film.kind = ActivityKind::FilmLikeActivity;
        no_film.film = None;
        assert!(t.activity(&no_film, false).is_none());
    }

    #[test]
    fn test_batch_dedups_keeping_first_occurrence() {
        let (t, _) = transformer();
        let films = vec![
            fixtures::film("a", "tt0000001", "First"),
            fixtures::film("b", "tt0000002", "Second"),
            fixtures::film("c", "tt0000001", "Duplicate"),
            fixtures::film_without_imdb("d", "Dropped"),
            fixtures::film("e", "tt0000003", "Third"),
        ];

        let items = t.films(&films, false);
        let titles: Vec<_> = items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["First", "Second", "Third"]);
    }

    #[test]
    fn test_activity_batch_excludes_viewer() {
        let (t, _) = transformer();
        let items = vec![
            fixtures::activity(ActivityKind::FilmWatchActivity, "me", "Me", "tt0000001", None),
            fixtures::activity(ActivityKind::FilmWatchActivity, "m2", "Ann", "tt0000002", None),
            fixtures::activity(ActivityKind::FilmLikeActivity, "m3", "Bob", "tt0000002", None),
        ];

        let out = t.activities(&items, Some("me"), false);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].external_id, "tt0000002");
        assert_eq!(out[0].description.as_deref(), Some("Ann watched"));
    }
}
