use std::sync::Arc;

use boxdio_core::{
    ActionService, CacheRegistry, CachedSessionProvider, CatalogService, Config, SanitizedConfig,
    SessionProvider, Transformer, UpstreamApi, UserStore,
};

/// Shared application state
pub struct AppState {
    config: Config,
    users: Arc<dyn UserStore>,
    catalog: Arc<CatalogService>,
    actions: Arc<ActionService>,
}

impl AppState {
    pub fn new(
        config: Config,
        users: Arc<dyn UserStore>,
        catalog: Arc<CatalogService>,
        actions: Arc<ActionService>,
    ) -> Self {
        Self {
            config,
            users,
            catalog,
            actions,
        }
    }

    /// Wire the catalog pipeline from configuration and its two collaborators.
    pub fn build(config: Config, upstream: Arc<dyn UpstreamApi>, users: Arc<dyn UserStore>) -> Self {
        let caches = Arc::new(CacheRegistry::new(&config.cache_settings()));
        let sessions: Arc<dyn SessionProvider> = Arc::new(
            CachedSessionProvider::new(Arc::clone(&upstream), Arc::clone(&users), Arc::clone(&caches))
                .with_safety_margin(config.addon.session_safety_margin()),
        );

        let badge_base_url = config
            .addon
            .rating_badges
            .then(|| format!("{}/badge", config.server.base_url()));
        let transformer = Transformer::new(Arc::clone(&caches), badge_base_url);

        let catalog = Arc::new(CatalogService::new(
            Arc::clone(&upstream),
            Arc::clone(&sessions),
            Arc::clone(&users),
            caches,
            transformer,
            config.catalog_settings(),
        ));
        let actions = Arc::new(ActionService::new(upstream, sessions, Arc::clone(&catalog)));

        Self::new(config, users, catalog, actions)
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn users(&self) -> &dyn UserStore {
        self.users.as_ref()
    }

    pub fn catalog(&self) -> &CatalogService {
        self.catalog.as_ref()
    }

    pub fn actions(&self) -> &ActionService {
        self.actions.as_ref()
    }
}
