//! Testing utilities and mock implementations.
//!
//! This module provides a mock of the upstream API so the catalog pipeline
//! can be tested end to end without network access. User storage needs no
//! mock: `SqliteUserStore::in_memory()` is used directly.
//!
//! # Example
//!
//! ```rust,ignore
//! use boxdio_core::testing::{MockUpstream, fixtures};
//!
//! let upstream = MockUpstream::new();
//! upstream.set_watchlist("m1", vec![fixtures::film("f1", "tt0113277", "Heat")]).await;
//! upstream.set_next_error(UpstreamError::RateLimited).await;
//!
//! // Use in CatalogService...
//! ```

mod mock_upstream;

pub use mock_upstream::{MockUpstream, RecordedCall};

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::upstream::{
        ActivityItem, ActivityKind, DiaryDetails, FilmSummary, Image, ImageSize, Link, ListEntry,
        LogEntry, MemberSummary,
    };

    /// Create a film with an IMDb link and a two-size poster.
    pub fn film(id: &str, imdb_id: &str, name: &str) -> FilmSummary {
        let mut film = film_without_imdb(id, name);
        film.links.push(Link {
            link_type: "imdb".to_string(),
            id: imdb_id.to_string(),
            url: None,
        });
        film
    }

    /// Create a film the addon cannot cross-reference.
    pub fn film_without_imdb(id: &str, name: &str) -> FilmSummary {
        FilmSummary {
            id: id.to_string(),
            name: name.to_string(),
            poster: Some(Image {
                sizes: vec![
                    ImageSize {
                        width: 230,
                        height: 345,
                        url: format!("https://img.test/{}/230.jpg", id),
                    },
                    ImageSize {
                        width: 1000,
                        height: 1500,
                        url: format!("https://img.test/{}/1000.jpg", id),
                    },
                ],
            }),
            links: vec![Link {
                link_type: "letterboxd".to_string(),
                id: id.to_string(),
                url: None,
            }],
            ..Default::default()
        }
    }

    /// Upstream film id used by the entry fixtures for an IMDb id.
    pub fn film_id(imdb_id: &str) -> String {
        format!("lb-{}", imdb_id)
    }

    /// Create a diary entry dated 12 Jan 2024.
    pub fn log_entry(imdb_id: &str, name: &str, rating: Option<f32>) -> LogEntry {
        LogEntry {
            id: format!("log-{}", imdb_id),
            film: film(&film_id(imdb_id), imdb_id, name),
            owner: None,
            diary_details: Some(DiaryDetails {
                diary_date: "2024-01-12".to_string(),
                rewatch: false,
            }),
            rating,
            like: false,
        }
    }

    /// Create a list entry.
    pub fn list_entry(imdb_id: &str, name: &str, rank: Option<u32>) -> ListEntry {
        ListEntry {
            rank,
            film: film(&film_id(imdb_id), imdb_id, name),
        }
    }

    /// Create an activity-feed entry by `member_id`.
    pub fn activity(
        kind: ActivityKind,
        member_id: &str,
        display_name: &str,
        imdb_id: &str,
        rating: Option<f32>,
    ) -> ActivityItem {
        ActivityItem {
            kind,
            member: MemberSummary {
                id: member_id.to_string(),
                username: display_name.to_lowercase(),
                display_name: Some(display_name.to_string()),
            },
            film: Some(film(&film_id(imdb_id), imdb_id, "Film")),
            diary_entry: None,
            review: None,
            rating,
        }
    }

    /// `count` distinct films with sequential IMDb ids.
    pub fn films(count: usize) -> Vec<FilmSummary> {
        (1..=count)
            .map(|n| {
                let imdb_id = format!("tt{:07}", n);
                film(&film_id(&imdb_id), &imdb_id, &format!("Film {}", n))
            })
            .collect()
    }
}
