//! Wire types for the upstream film-diary API.

use serde::{Deserialize, Serialize};

// ============================================================================
// Pagination
// ============================================================================

/// One page of a cursor-paginated collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    /// Opaque cursor for the next page, absent on the last page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, next: Option<String>) -> Self {
        Self { items, next }
    }

    pub fn last(items: Vec<T>) -> Self {
        Self { items, next: None }
    }
}

/// Parameters for fetching one page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageRequest {
    pub cursor: Option<String>,
    pub per_page: u32,
    pub sort: Option<FilmSort>,
}

/// Upstream sort orders for film collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilmSort {
    Added,
    AddedEarliest,
    ReleaseDateLatestFirst,
    ReleaseDateEarliestFirst,
    AverageRatingHighToLow,
    AverageRatingLowToHigh,
    FilmPopularity,
    FilmPopularityThisWeek,
    ListRanking,
}

impl FilmSort {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilmSort::Added => "Added",
            FilmSort::AddedEarliest => "AddedEarliest",
            FilmSort::ReleaseDateLatestFirst => "ReleaseDateLatestFirst",
            FilmSort::ReleaseDateEarliestFirst => "ReleaseDateEarliestFirst",
            FilmSort::AverageRatingHighToLow => "AverageRatingHighToLow",
            FilmSort::AverageRatingLowToHigh => "AverageRatingLowToHigh",
            FilmSort::FilmPopularity => "FilmPopularity",
            FilmSort::FilmPopularityThisWeek => "FilmPopularityThisWeek",
            FilmSort::ListRanking => "ListRanking",
        }
    }
}

// ============================================================================
// Films
// ============================================================================

/// A film as it appears inside any upstream collection.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FilmSummary {
    /// Upstream film id.
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poster: Option<Image>,
    /// Cross-service links (IMDb, TMDB, ...).
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default)]
    pub genres: Vec<Genre>,
    #[serde(default)]
    pub directors: Vec<ContributorSummary>,
    /// Runtime in minutes (only on detail responses).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_time: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tagline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Average member rating (0.5 - 5.0).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f32>,
}

impl FilmSummary {
    /// The id of the first link of the given type.
    pub fn link_id(&self, link_type: &str) -> Option<&str> {
        self.links
            .iter()
            .find(|l| l.link_type.eq_ignore_ascii_case(link_type))
            .map(|l| l.id.as_str())
    }
}

/// A set of sized variants of one image.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Image {
    #[serde(default)]
    pub sizes: Vec<ImageSize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageSize {
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Link {
    #[serde(rename = "type")]
    pub link_type: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Genre {
    #[serde(default)]
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContributorSummary {
    #[serde(default)]
    pub id: String,
    pub name: String,
}

// ============================================================================
// Members, diary, lists, activity
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MemberSummary {
    pub id: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl MemberSummary {
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.username)
    }
}

/// A diary / log entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    #[serde(default)]
    pub id: String,
    pub film: FilmSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<MemberSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diary_details: Option<DiaryDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f32>,
    #[serde(default)]
    pub like: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DiaryDetails {
    /// ISO date (YYYY-MM-DD).
    pub diary_date: String,
    #[serde(default)]
    pub rewatch: bool,
}

/// An entry of a member list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<u32>,
    pub film: FilmSummary,
}

/// Summary of a member list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListSummary {
    pub id: String,
    pub name: String,
}

/// Kinds of activity-feed entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivityKind {
    DiaryEntryActivity,
    FilmRatingActivity,
    FilmLikeActivity,
    FilmWatchActivity,
    WatchlistActivity,
    ReviewActivity,
    #[serde(other)]
    Other,
}

/// One entry of a member's activity feed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActivityItem {
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    pub member: MemberSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub film: Option<FilmSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diary_entry: Option<LogEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review: Option<LogEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f32>,
}

impl ActivityItem {
    /// The film this activity is about, wherever the upstream nested it.
    pub fn film(&self) -> Option<&FilmSummary> {
        self.film
            .as_ref()
            .or_else(|| self.diary_entry.as_ref().map(|e| &e.film))
            .or_else(|| self.review.as_ref().map(|e| &e.film))
    }

    pub fn rating(&self) -> Option<f32> {
        self.rating
            .or_else(|| self.diary_entry.as_ref().and_then(|e| e.rating))
            .or_else(|| self.review.as_ref().and_then(|e| e.rating))
    }
}

// ============================================================================
// Relationships and credentials
// ============================================================================

/// The authenticated member's relationship to one film.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FilmRelationship {
    #[serde(default)]
    pub watched: bool,
    #[serde(default)]
    pub liked: bool,
    #[serde(default)]
    pub in_watchlist: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f32>,
}

/// A partial relationship update. `rating: Some(None)` clears the rating.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watched: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liked: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_watchlist: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<Option<f32>>,
}

/// Result of a credential grant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(rename = "expires_in")]
    pub expires_in_secs: u64,
}

/// Query for the generic film search endpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum FilmQuery {
    /// Films the member has the given relationship with.
    Member {
        member_id: String,
        relationship: MemberRelationship,
    },
    /// All films, ordered by the page request's sort.
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberRelationship {
    Liked,
    Watched,
}

impl MemberRelationship {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRelationship::Liked => "Liked",
            MemberRelationship::Watched => "Watched",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_film_summary_deserializes_camel_case() {
        let json = r#"{
            "id": "2bbs",
            "name": "Heat",
            "releaseYear": 1995,
            "links": [{"type": "letterboxd", "id": "2bbs"}, {"type": "imdb", "id": "tt0113277"}],
            "poster": {"sizes": [{"width": 230, "height": 345, "url": "https://img/230.jpg"}]},
            "genres": [{"id": "g1", "name": "Crime"}]
        }"#;
        let film: FilmSummary = serde_json::from_str(json).unwrap();
        assert_eq!(film.release_year, Some(1995));
        assert_eq!(film.link_id("imdb"), Some("tt0113277"));
        assert_eq!(film.link_id("tmdb"), None);
        assert_eq!(film.genres[0].name, "Crime");
        assert!(film.directors.is_empty());
    }

    #[test]
    fn test_page_without_next_is_last() {
        let page: Page<ListEntry> = serde_json::from_str(r#"{"items": []}"#).unwrap();
        assert!(page.next.is_none());
        assert!(page.items.is_empty());
    }

    #[test]
    fn test_unknown_activity_kind_maps_to_other() {
        let json = r#"{"type": "FollowActivity", "member": {"id": "m1", "username": "ann"}}"#;
        let item: ActivityItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.kind, ActivityKind::Other);
        assert!(item.film().is_none());
    }

    #[test]
    fn test_activity_film_falls_back_to_diary_entry() {
        let json = r#"{
            "type": "DiaryEntryActivity",
            "member": {"id": "m1", "username": "ann", "displayName": "Ann"},
            "diaryEntry": {"film": {"id": "f1", "name": "Alien"}, "rating": 4.5}
        }"#;
        let item: ActivityItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.film().map(|f| f.name.as_str()), Some("Alien"));
        assert_eq!(item.rating(), Some(4.5));
        assert_eq!(item.member.label(), "Ann");
    }

    #[test]
    fn test_relationship_update_serializes_cleared_rating_as_null() {
        let update = RelationshipUpdate {
            rating: Some(None),
            ..Default::default()
        };
        assert_eq!(serde_json::to_string(&update).unwrap(), r#"{"rating":null}"#);
    }
}
