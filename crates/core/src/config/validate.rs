use super::{types::Config, ConfigError};
use crate::cache::CacheClass;

/// Validate configuration
/// Currently validates:
/// - Upstream credentials and base URL are present
/// - Server port is not 0
/// - Addon page size is not 0
/// - Cache overrides name known classes and have nonzero sizing
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.upstream.client_id.is_empty() || config.upstream.client_secret.is_empty() {
        return Err(ConfigError::ValidationError(
            "upstream.client_id and upstream.client_secret are required".to_string(),
        ));
    }

    if config.upstream.base_url.is_empty() {
        return Err(ConfigError::ValidationError(
            "upstream.base_url cannot be empty".to_string(),
        ));
    }

    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.addon.page_size == 0 {
        return Err(ConfigError::ValidationError(
            "addon.page_size cannot be 0".to_string(),
        ));
    }

    for (name, over) in &config.cache {
        if !CacheClass::ALL.iter().any(|class| class.name() == name) {
            return Err(ConfigError::ValidationError(format!(
                "unknown cache class: {}",
                name
            )));
        }
        if over.capacity == Some(0) || over.ttl_secs == Some(0) {
            return Err(ConfigError::ValidationError(format!(
                "cache.{} capacity and ttl_secs must be positive",
                name
            )));
        }
    }

    Ok(())
}
