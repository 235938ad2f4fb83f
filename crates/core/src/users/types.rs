//! User types.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::{unique_kinds, CatalogKind};

/// An authenticated addon user linked to an upstream member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Internal user id (used in addon URLs).
    pub id: String,
    /// Upstream username.
    pub username: String,
    /// Upstream member id.
    pub member_id: String,
    /// Stored refresh credential, absent until the user has signed in.
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    pub preferences: UserPreferences,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(
        id: impl Into<String>,
        username: impl Into<String>,
        member_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            username: username.into(),
            member_id: member_id.into(),
            refresh_token: None,
            preferences: UserPreferences::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
        self.refresh_token = Some(token.into());
        self
    }
}

/// Which built-in catalogs a user has enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogToggles {
    pub watchlist: bool,
    pub diary: bool,
    pub friends: bool,
    pub liked: bool,
    pub popular: bool,
    pub top_rated: bool,
}

impl Default for CatalogToggles {
    fn default() -> Self {
        Self {
            watchlist: true,
            diary: true,
            friends: true,
            liked: true,
            popular: true,
            top_rated: true,
        }
    }
}

/// Per-user display and catalog preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserPreferences {
    /// Overlay rating badges on posters.
    pub show_ratings: bool,
    /// Offer rate/watched/liked/watchlist actions.
    pub show_actions: bool,
    pub catalogs: CatalogToggles,
    /// Extra member lists to expose as catalogs.
    pub list_ids: Vec<String>,
    /// Other members whose public watchlists are exposed as catalogs.
    pub external_watchlists: Vec<String>,
    /// Catalog id to custom manifest title.
    pub custom_names: HashMap<String, String>,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            show_ratings: true,
            show_actions: true,
            catalogs: CatalogToggles::default(),
            list_ids: Vec::new(),
            external_watchlists: Vec::new(),
            custom_names: HashMap::new(),
        }
    }
}

impl UserPreferences {
    /// Enabled catalogs in manifest order.
    pub fn enabled_catalogs(&self) -> Vec<CatalogKind> {
        let toggles = self.catalogs;
        let mut kinds: Vec<CatalogKind> = [
            (toggles.watchlist, CatalogKind::Watchlist),
            (toggles.diary, CatalogKind::Diary),
            (toggles.friends, CatalogKind::Friends),
            (toggles.liked, CatalogKind::Liked),
            (toggles.popular, CatalogKind::Popular),
            (toggles.top_rated, CatalogKind::TopRated),
        ]
        .into_iter()
        .filter_map(|(enabled, kind)| enabled.then_some(kind))
        .collect();

        kinds.extend(self.list_ids.iter().cloned().map(CatalogKind::List));
        kinds.extend(
            self.external_watchlists
                .iter()
                .cloned()
                .map(CatalogKind::ExternalWatchlist),
        );
        unique_kinds(kinds)
    }
}
