use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::cache::{CacheClass, CacheSettings};
use crate::catalog::CatalogSettings;
use crate::upstream::UpstreamClientConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub upstream: UpstreamClientConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub addon: AddonConfig,
    /// Per-class cache overrides keyed by class name (e.g. `user_lists`).
    #[serde(default)]
    pub cache: BTreeMap<String, CacheOverride>,
}

impl Config {
    /// Cache overrides resolved against the class defaults.
    ///
    /// Unknown class names are ignored here; [`validate_config`](super::validate_config)
    /// rejects them.
    pub fn cache_settings(&self) -> HashMap<CacheClass, CacheSettings> {
        CacheClass::ALL
            .iter()
            .filter_map(|class| {
                let over = self.cache.get(class.name())?;
                let defaults = class.default_settings();
                Some((
                    *class,
                    CacheSettings {
                        capacity: over.capacity.unwrap_or(defaults.capacity),
                        ttl: over.ttl_secs.map_or(defaults.ttl, Duration::from_secs),
                    },
                ))
            })
            .collect()
    }

    pub fn catalog_settings(&self) -> CatalogSettings {
        CatalogSettings {
            page_size: self.addon.page_size,
            top_rated_list_id: self.addon.top_rated_list_id.clone(),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Externally reachable base URL, used for links in manifests and
    /// rating badges (default: derived from host and port).
    #[serde(default)]
    pub public_base_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_base_url: None,
        }
    }
}

impl ServerConfig {
    pub fn base_url(&self) -> String {
        match &self.public_base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}:{}", self.host, self.port),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    7000
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("boxdio.db")
}

/// Addon behavior
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AddonConfig {
    /// Items per catalog page (default: 100)
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Overlay the user's rating on posters (default: true)
    #[serde(default = "default_true")]
    pub rating_badges: bool,
    /// Upstream list backing the top-rated catalog
    #[serde(default)]
    pub top_rated_list_id: Option<String>,
    /// Refresh sessions this long before expiry (default: 60)
    #[serde(default = "default_safety_margin")]
    pub session_safety_margin_secs: u64,
}

impl Default for AddonConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            rating_badges: true,
            top_rated_list_id: None,
            session_safety_margin_secs: default_safety_margin(),
        }
    }
}

impl AddonConfig {
    pub fn session_safety_margin(&self) -> Duration {
        Duration::from_secs(self.session_safety_margin_secs)
    }
}

fn default_page_size() -> usize {
    100
}

fn default_true() -> bool {
    true
}

fn default_safety_margin() -> u64 {
    60
}

/// Override of one cache class's sizing
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct CacheOverride {
    #[serde(default)]
    pub capacity: Option<usize>,
    #[serde(default)]
    pub ttl_secs: Option<u64>,
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub upstream: SanitizedUpstreamConfig,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub addon: AddonConfig,
    pub cache: BTreeMap<String, CacheOverride>,
}

/// Sanitized upstream config (client secret hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedUpstreamConfig {
    pub base_url: String,
    pub client_id: String,
    pub client_secret_configured: bool,
    pub timeout_secs: u64,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            upstream: SanitizedUpstreamConfig {
                base_url: config.upstream.base_url.clone(),
                client_id: config.upstream.client_id.clone(),
                client_secret_configured: !config.upstream.client_secret.is_empty(),
                timeout_secs: config.upstream.timeout_secs,
            },
            server: config.server.clone(),
            database: config.database.clone(),
            addon: config.addon.clone(),
            cache: config.cache.clone(),
        }
    }
}
