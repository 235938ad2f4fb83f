pub mod actions;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod fetcher;
pub mod metrics;
pub mod session;
pub mod share;
pub mod testing;
pub mod transform;
pub mod upstream;
pub mod users;

pub use actions::{ActionError, ActionService, FilmAction};
pub use cache::{CacheClass, CacheRegistry, CacheSettings, CacheStats, CachedCollection, TtlCache};
pub use catalog::{
    CacheKey, CatalogError, CatalogItem, CatalogKind, CatalogOptions, CatalogService,
    CatalogSettings, SortOrder, Subject,
};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use fetcher::{fetch_all_pages, run_chunked, PageLimit};
pub use session::{
    with_fresh_session, CachedSessionProvider, SessionError, SessionHandle, SessionProvider,
};
pub use share::{ShareError, SharedConfig};
pub use transform::Transformer;
pub use upstream::{HttpUpstreamClient, UpstreamApi, UpstreamClientConfig, UpstreamError};
pub use users::{SqliteUserStore, User, UserPreferences, UserStore, UserStoreError};
