//! Addon protocol handlers: manifests and catalog pages.
//!
//! Catalog endpoints always answer `200 {"metas": [...]}`. Anything that
//! goes wrong on the way (unknown user, undecodable share blob, foreign
//! content type) is logged and served as an empty list.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use boxdio_core::{
    catalog::CATALOG_ID_PREFIX, CatalogItem, CatalogKind, CatalogOptions, SharedConfig,
    SortOrder, Subject,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::handlers::{api_error, ApiError};
use crate::state::AppState;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The only content type the addon serves.
const CONTENT_TYPE: &str = "movie";

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub id: String,
    pub version: &'static str,
    pub name: String,
    pub description: String,
    pub resources: Vec<&'static str>,
    pub types: Vec<&'static str>,
    pub id_prefixes: Vec<&'static str>,
    pub catalogs: Vec<ManifestCatalog>,
}

#[derive(Debug, Serialize)]
pub struct ManifestCatalog {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub id: String,
    pub name: String,
    pub extra: Vec<ManifestExtra>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestExtra {
    pub name: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<&'static str>>,
    pub is_required: bool,
}

#[derive(Debug, Serialize)]
pub struct CatalogResponse {
    pub metas: Vec<CatalogItem>,
}

impl CatalogResponse {
    fn empty() -> Json<Self> {
        Json(Self { metas: Vec::new() })
    }
}

#[derive(Debug, Deserialize)]
pub struct UserCatalogPath {
    pub user_id: String,
    pub kind: String,
    pub id: String,
    #[serde(default)]
    pub extra: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SharedCatalogPath {
    pub blob: String,
    pub kind: String,
    pub id: String,
    #[serde(default)]
    pub extra: Option<String>,
}

/// Extra properties of a catalog request (`skip=100&genre=Shuffle`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogExtra {
    pub skip: usize,
    pub genre: Option<String>,
}

impl CatalogExtra {
    pub fn parse(extra: &str) -> Self {
        let mut parsed = Self::default();
        for pair in extra.split('&') {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            let value = urlencoding::decode(value)
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| value.to_string());
            match key {
                "skip" => parsed.skip = value.parse().unwrap_or(0),
                "genre" => parsed.genre = Some(value),
                _ => {}
            }
        }
        parsed
    }
}

/// A parsed catalog request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRequest {
    pub catalog_id: String,
    pub extra: CatalogExtra,
}

impl CatalogRequest {
    /// Parse `{type}/{id}.json` or `{type}/{id}/{extra}.json`. `None` for
    /// content types the addon does not serve.
    pub fn parse(kind: &str, id: &str, extra: Option<&str>) -> Option<Self> {
        if kind != CONTENT_TYPE {
            return None;
        }
        let request = match extra {
            Some(extra) => Self {
                catalog_id: id.to_string(),
                extra: CatalogExtra::parse(strip_json(extra)),
            },
            None => Self {
                catalog_id: strip_json(id).to_string(),
                extra: CatalogExtra::default(),
            },
        };
        Some(request)
    }
}

fn strip_json(segment: &str) -> &str {
    segment.strip_suffix(".json").unwrap_or(segment)
}

// ============================================================================
// Manifest building
// ============================================================================

fn manifest_catalog(kind: &CatalogKind, name: String) -> ManifestCatalog {
    let genres = if kind.is_sortable() {
        SortOrder::LABELS.to_vec()
    } else {
        vec!["Shuffle"]
    };

    ManifestCatalog {
        kind: CONTENT_TYPE,
        id: kind.catalog_id(),
        name,
        extra: vec![
            ManifestExtra {
                name: "genre",
                options: Some(genres),
                is_required: false,
            },
            ManifestExtra {
                name: "skip",
                options: None,
                is_required: false,
            },
        ],
    }
}

/// Manifest title: custom name, then list name, then the built-in name.
fn catalog_name(
    kind: &CatalogKind,
    custom_names: &HashMap<String, String>,
    list_names: &HashMap<String, String>,
) -> String {
    if let Some(custom) = custom_names.get(&kind.catalog_id()) {
        return custom.clone();
    }
    match kind {
        CatalogKind::List(list_id) => list_names
            .get(list_id)
            .cloned()
            .unwrap_or_else(|| kind.display_name()),
        _ => kind.display_name(),
    }
}

fn manifest(id: String, name: String, description: String, catalogs: Vec<ManifestCatalog>) -> Manifest {
    Manifest {
        id,
        version: VERSION,
        name,
        description,
        resources: vec!["catalog"],
        types: vec![CONTENT_TYPE],
        id_prefixes: vec!["tt"],
        catalogs,
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /u/{user_id}/manifest.json
pub async fn user_manifest(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<Manifest>, ApiError> {
    let user = match state.users().find_by_id(&user_id) {
        Ok(Some(user)) => user,
        Ok(None) => {
            return Err(api_error(
                StatusCode::NOT_FOUND,
                format!("User not found: {}", user_id),
            ))
        }
        Err(e) => return Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e)),
    };

    let prefs = &user.preferences;
    let list_names = state.catalog().list_names(&prefs.list_ids).await;
    let catalogs = prefs
        .enabled_catalogs()
        .iter()
        .map(|kind| manifest_catalog(kind, catalog_name(kind, &prefs.custom_names, &list_names)))
        .collect();

    Ok(Json(manifest(
        format!("com.boxdio.{}", user.id),
        format!("Boxdio - {}", user.username),
        format!("Films from {}'s diary, lists and friends", user.username),
        catalogs,
    )))
}

/// GET /s/{blob}/manifest.json
pub async fn shared_manifest(
    State(state): State<Arc<AppState>>,
    Path(blob): Path<String>,
) -> Result<Json<Manifest>, ApiError> {
    let config = SharedConfig::decode(&blob).map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;

    let list_names = state.catalog().list_names(&config.list_ids).await;
    let catalogs = config
        .catalogs()
        .iter()
        .map(|kind| manifest_catalog(kind, catalog_name(kind, &config.custom_names, &list_names)))
        .collect();

    let (id, name) = match &config.username {
        Some(username) => (
            format!("com.boxdio.shared.{}", username.to_lowercase()),
            format!("Boxdio - {}", username),
        ),
        None => ("com.boxdio.shared".to_string(), "Boxdio".to_string()),
    };

    Ok(Json(manifest(
        id,
        name,
        "Public film collections".to_string(),
        catalogs,
    )))
}

/// GET /u/{user_id}/catalog/{type}/{id}.json
/// GET /u/{user_id}/catalog/{type}/{id}/{extra}.json
pub async fn user_catalog(
    State(state): State<Arc<AppState>>,
    Path(path): Path<UserCatalogPath>,
) -> Json<CatalogResponse> {
    let Some(request) = CatalogRequest::parse(&path.kind, &path.id, path.extra.as_deref()) else {
        debug!(kind = %path.kind, "Unsupported content type");
        return CatalogResponse::empty();
    };

    let user = match state.users().find_by_id(&path.user_id) {
        Ok(Some(user)) => user,
        Ok(None) => {
            warn!(user_id = %path.user_id, "Catalog requested for unknown user");
            return CatalogResponse::empty();
        }
        Err(e) => {
            warn!(user_id = %path.user_id, error = %e, "Could not load user");
            return CatalogResponse::empty();
        }
    };

    let subject = Subject::user(&user.id, &user.member_id);
    let options = CatalogOptions::from_label(
        request.extra.genre.as_deref(),
        user.preferences.show_ratings,
    );
    let catalog = state.catalog();
    let metas = catalog
        .get_page_by_id(
            &subject,
            &request.catalog_id,
            &options,
            request.extra.skip,
            catalog.settings().page_size,
        )
        .await;

    Json(CatalogResponse { metas })
}

/// GET /s/{blob}/catalog/{type}/{id}.json
/// GET /s/{blob}/catalog/{type}/{id}/{extra}.json
pub async fn shared_catalog(
    State(state): State<Arc<AppState>>,
    Path(path): Path<SharedCatalogPath>,
) -> Json<CatalogResponse> {
    let Some(request) = CatalogRequest::parse(&path.kind, &path.id, path.extra.as_deref()) else {
        return CatalogResponse::empty();
    };

    let config = match SharedConfig::decode(&path.blob) {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "Undecodable shared configuration");
            return CatalogResponse::empty();
        }
    };

    let Some(kind) = CatalogKind::parse(&request.catalog_id) else {
        warn!(catalog_id = %request.catalog_id, "Unknown catalog requested");
        return CatalogResponse::empty();
    };
    if !config.allows(&kind) {
        warn!(catalog = %kind, "Catalog not part of shared configuration");
        return CatalogResponse::empty();
    }

    let catalog = state.catalog();
    let subject = catalog.shared_subject(&config).await;
    let options = CatalogOptions::from_label(request.extra.genre.as_deref(), config.show_ratings);
    let metas = catalog
        .get_page(
            &subject,
            &kind,
            &options,
            request.extra.skip,
            catalog.settings().page_size,
        )
        .await;

    Json(CatalogResponse { metas })
}
