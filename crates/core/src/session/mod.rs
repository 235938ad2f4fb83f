//! Authenticated upstream sessions.
//!
//! A [`SessionHandle`] is a bearer credential valid until `expires_at`.
//! [`CachedSessionProvider`] keeps handles in the session cache and refreshes
//! them from the stored refresh credential once they come within the safety
//! margin of expiry. The rotated refresh credential is persisted before the
//! new handle replaces the cached one.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::cache::CacheRegistry;
use crate::metrics::SESSION_REFRESHES;
use crate::upstream::{TokenGrant, UpstreamApi, UpstreamError};
use crate::users::{UserStore, UserStoreError};

/// Default safety margin before expiry at which a handle is refreshed.
pub const DEFAULT_SAFETY_MARGIN: Duration = Duration::from_secs(60);

const SERVICE_SESSION_KEY: &str = "session:__service__";

/// Upper bound on a credential's advertised lifetime.
const MAX_LIFETIME_SECS: u64 = 365 * 24 * 60 * 60;

/// Errors acquiring a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("User not found: {0}")]
    UserNotFound(String),

    /// The user has never signed in, or signed out.
    #[error("No stored credential for user {0}")]
    NoCredential(String),

    #[error("Credential refresh failed: {0}")]
    Refresh(#[from] UpstreamError),

    #[error("User store error: {0}")]
    Store(#[from] UserStoreError),
}

/// A ready-to-use upstream credential.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionHandle {
    /// Internal user id, or `None` for the app-level service session.
    pub user_id: Option<String>,
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl SessionHandle {
    pub fn from_grant(user_id: Option<String>, grant: &TokenGrant) -> Self {
        let lifetime = grant.expires_in_secs.min(MAX_LIFETIME_SECS) as i64;
        Self {
            user_id,
            access_token: grant.access_token.clone(),
            expires_at: Utc::now() + chrono::Duration::seconds(lifetime),
        }
    }

    /// Whether the handle stays valid for at least `margin`.
    pub fn is_fresh(&self, margin: Duration) -> bool {
        let margin = chrono::Duration::from_std(margin)
            .unwrap_or_else(|_| chrono::Duration::seconds(MAX_LIFETIME_SECS as i64));
        self.expires_at - margin > Utc::now()
    }

    /// How long the handle may sit in the cache before it must be refreshed.
    fn cache_ttl(&self, margin: Duration) -> Duration {
        (self.expires_at - Utc::now())
            .to_std()
            .unwrap_or_default()
            .saturating_sub(margin)
    }
}

/// Source of valid sessions.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// A handle for `user_id`, refreshed if it is near expiry.
    async fn acquire(&self, user_id: &str) -> Result<SessionHandle, SessionError>;

    /// An app-level handle for public data.
    async fn acquire_service(&self) -> Result<SessionHandle, SessionError>;
}

/// Acquire a fresh session for `user_id` and run `f` with it.
///
/// The handle is valid at the time `f` starts; it is not re-validated if
/// `f` runs past the safety margin.
pub async fn with_fresh_session<P, F, Fut, T, E>(provider: &P, user_id: &str, f: F) -> Result<T, E>
where
    P: SessionProvider + ?Sized,
    F: FnOnce(SessionHandle) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<SessionError>,
{
    let session = provider.acquire(user_id).await?;
    f(session).await
}

/// Session provider backed by the session cache and the user store.
pub struct CachedSessionProvider {
    upstream: Arc<dyn UpstreamApi>,
    users: Arc<dyn UserStore>,
    caches: Arc<CacheRegistry>,
    margin: Duration,
}

impl CachedSessionProvider {
    pub fn new(
        upstream: Arc<dyn UpstreamApi>,
        users: Arc<dyn UserStore>,
        caches: Arc<CacheRegistry>,
    ) -> Self {
        Self {
            upstream,
            users,
            caches,
            margin: DEFAULT_SAFETY_MARGIN,
        }
    }

    pub fn with_safety_margin(mut self, margin: Duration) -> Self {
        self.margin = margin;
        self
    }

    fn user_key(user_id: &str) -> String {
        format!("session:{}", user_id)
    }

    fn cached(&self, key: &str) -> Option<SessionHandle> {
        self.caches
            .session
            .get(key)
            .filter(|handle| handle.is_fresh(self.margin))
    }

    fn store(&self, key: String, handle: &SessionHandle) {
        self.caches
            .session
            .set_with_ttl(key, handle.clone(), handle.cache_ttl(self.margin));
    }

    async fn refresh_user(&self, user_id: &str) -> Result<SessionHandle, SessionError> {
        let user = self
            .users
            .find_by_id(user_id)?
            .ok_or_else(|| SessionError::UserNotFound(user_id.to_string()))?;
        let refresh_token = user
            .refresh_token
            .ok_or_else(|| SessionError::NoCredential(user_id.to_string()))?;

        let grant = match self.upstream.refresh_credential(&refresh_token).await {
            Ok(grant) => grant,
            Err(e) => {
                SESSION_REFRESHES.with_label_values(&["failed"]).inc();
                warn!(user_id, error = %e, "Session refresh failed");
                return Err(e.into());
            }
        };
        SESSION_REFRESHES.with_label_values(&["success"]).inc();

        if let Some(rotated) = grant.refresh_token.as_deref() {
            if rotated != refresh_token {
                self.users.update_refresh_token(user_id, rotated)?;
            }
        }

        info!(user_id, expires_in = grant.expires_in_secs, "Session refreshed");
        Ok(SessionHandle::from_grant(Some(user_id.to_string()), &grant))
    }
}

#[async_trait]
impl SessionProvider for CachedSessionProvider {
    async fn acquire(&self, user_id: &str) -> Result<SessionHandle, SessionError> {
        let key = Self::user_key(user_id);
        if let Some(handle) = self.cached(&key) {
            debug!(user_id, "Session cache hit");
            return Ok(handle);
        }

        let handle = self.refresh_user(user_id).await?;
        self.store(key, &handle);
        Ok(handle)
    }

    async fn acquire_service(&self) -> Result<SessionHandle, SessionError> {
        if let Some(handle) = self.cached(SERVICE_SESSION_KEY) {
            return Ok(handle);
        }

        let grant = self.upstream.client_credential().await?;
        let handle = SessionHandle::from_grant(None, &grant);
        info!(expires_in = grant.expires_in_secs, "Service session acquired");
        self.store(SERVICE_SESSION_KEY.to_string(), &handle);
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockUpstream;
    use crate::users::{SqliteUserStore, User};

    struct Fixture {
        upstream: Arc<MockUpstream>,
        users: Arc<SqliteUserStore>,
        caches: Arc<CacheRegistry>,
        provider: CachedSessionProvider,
    }

    fn fixture() -> Fixture {
        let upstream = Arc::new(MockUpstream::new());
        let users = Arc::new(SqliteUserStore::in_memory().unwrap());
        users
            .upsert(&User::new("u1", "ann", "m1").with_refresh_token("r0"))
            .unwrap();
        let caches = Arc::new(CacheRegistry::default());
        let provider = CachedSessionProvider::new(upstream.clone(), users.clone(), caches.clone());
        Fixture {
            upstream,
            users,
            caches,
            provider,
        }
    }

    #[test]
    fn test_handle_freshness() {
        let handle = SessionHandle {
            user_id: None,
            access_token: "t".to_string(),
            expires_at: Utc::now() + chrono::Duration::seconds(30),
        };
        assert!(handle.is_fresh(Duration::from_secs(10)));
        assert!(!handle.is_fresh(Duration::from_secs(60)));
    }

    #[tokio::test]
    async fn test_acquire_refreshes_once_then_hits_cache() {
        let f = fixture();

        let first = f.provider.acquire("u1").await.unwrap();
        let second = f.provider.acquire("u1").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(f.upstream.refresh_count().await, 1);
        assert_eq!(f.caches.session.len(), 1);
    }

    #[tokio::test]
    async fn test_rotated_refresh_token_is_persisted() {
        let f = fixture();
        f.upstream.set_token_lifetime(3600).await;

        f.provider.acquire("u1").await.unwrap();

        let user = f.users.find_by_id("u1").unwrap().unwrap();
        assert_eq!(user.refresh_token.as_deref(), Some("refresh-1"));
    }

    #[tokio::test]
    async fn test_handle_within_margin_is_refreshed() {
        let f = fixture();
        // Lifetime shorter than the safety margin: never considered fresh
        f.upstream.set_token_lifetime(30).await;

        let first = f.provider.acquire("u1").await.unwrap();
        let second = f.provider.acquire("u1").await.unwrap();

        assert_eq!(f.upstream.refresh_count().await, 2);
        assert_ne!(first.access_token, second.access_token);
    }

    #[tokio::test]
    async fn test_unknown_user_and_missing_credential() {
        let f = fixture();
        f.users.upsert(&User::new("u2", "bob", "m2")).unwrap();

        assert!(matches!(
            f.provider.acquire("ghost").await,
            Err(SessionError::UserNotFound(_))
        ));
        assert!(matches!(
            f.provider.acquire("u2").await,
            Err(SessionError::NoCredential(_))
        ));
        assert_eq!(f.upstream.refresh_count().await, 0);
    }

    #[tokio::test]
    async fn test_refresh_failure_propagates_and_caches_nothing() {
        let f = fixture();
        f.upstream
            .set_next_error(UpstreamError::Unauthorized("revoked".to_string()))
            .await;

        let result = f.provider.acquire("u1").await;

        assert!(matches!(result, Err(SessionError::Refresh(_))));
        assert!(f.caches.session.is_empty());
    }

    #[tokio::test]
    async fn test_service_session_is_cached_separately() {
        let f = fixture();

        let service = f.provider.acquire_service().await.unwrap();
        f.provider.acquire_service().await.unwrap();
        let user = f.provider.acquire("u1").await.unwrap();

        assert!(service.user_id.is_none());
        assert_eq!(user.user_id.as_deref(), Some("u1"));
        assert_eq!(f.upstream.call_count("client_credential").await, 1);
    }

    #[tokio::test]
    async fn test_with_fresh_session_passes_handle() {
        let f = fixture();

        let token: Result<String, SessionError> =
            with_fresh_session(&f.provider, "u1", |session| async move {
                Ok(session.access_token)
            })
            .await;
        assert!(token.unwrap().starts_with("access-"));

        let missing: Result<(), SessionError> =
            with_fresh_session(&f.provider, "ghost", |_| async { Ok(()) }).await;
        assert!(matches!(missing, Err(SessionError::UserNotFound(_))));
    }
}
