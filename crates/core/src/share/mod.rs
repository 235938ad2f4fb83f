//! Shareable addon configuration.
//!
//! A shared configuration lets anyone install a read-only addon for a public
//! member profile without signing in. It travels inside the addon URL as
//! unpadded base64url JSON.

use std::collections::HashMap;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::catalog::{unique_kinds, CatalogKind, CATALOG_ID_PREFIX};

/// Longest blob accepted for decoding.
pub const MAX_BLOB_LEN: usize = 8 * 1024;

/// Errors decoding a shared configuration.
#[derive(Debug, thiserror::Error)]
pub enum ShareError {
    #[error("Shared configuration is too large ({0} bytes)")]
    TooLarge(usize),

    #[error("Invalid base64: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("Invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Public, credential-free addon configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SharedConfig {
    /// Member whose public collections are served.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Built-in catalogs by short name ("watchlist", "diary", "top-rated", ...).
    pub enabled_catalogs: Vec<String>,
    /// Public lists to expose.
    pub list_ids: Vec<String>,
    pub show_ratings: bool,
    /// Catalog id to custom manifest title.
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub custom_names: HashMap<String, String>,
    /// Other members whose watchlists are exposed.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub external_watchlist_usernames: Vec<String>,
}

impl SharedConfig {
    pub fn encode(&self) -> Result<String, ShareError> {
        let json = serde_json::to_vec(self)?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    pub fn decode(blob: &str) -> Result<Self, ShareError> {
        if blob.len() > MAX_BLOB_LEN {
            return Err(ShareError::TooLarge(blob.len()));
        }
        let json = URL_SAFE_NO_PAD.decode(blob.trim_end_matches('='))?;
        Ok(serde_json::from_slice(&json)?)
    }

    /// Catalogs this configuration exposes, in manifest order.
    ///
    /// The friends feed needs a signed-in member and is never shared.
    /// Member-scoped catalogs are skipped when no username is set.
    pub fn catalogs(&self) -> Vec<CatalogKind> {
        let mut kinds: Vec<CatalogKind> = self
            .enabled_catalogs
            .iter()
            .filter_map(|name| CatalogKind::parse(&format!("{}{}", CATALOG_ID_PREFIX, name)))
            .filter(|kind| match kind {
                CatalogKind::Friends => false,
                CatalogKind::Watchlist | CatalogKind::Diary | CatalogKind::Liked => {
                    self.username.is_some()
                }
                _ => true,
            })
            .collect();

        kinds.extend(self.list_ids.iter().cloned().map(CatalogKind::List));
        kinds.extend(
            self.external_watchlist_usernames
                .iter()
                .cloned()
                .map(CatalogKind::ExternalWatchlist),
        );
        unique_kinds(kinds)
    }

    /// Whether a catalog request is covered by this configuration.
    pub fn allows(&self, kind: &CatalogKind) -> bool {
        self.catalogs().contains(kind)
    }

    /// Manifest title for a catalog, honouring custom names.
    pub fn display_name(&self, kind: &CatalogKind) -> String {
        self.custom_names
            .get(&kind.catalog_id())
            .cloned()
            .unwrap_or_else(|| kind.display_name())
    }
}
