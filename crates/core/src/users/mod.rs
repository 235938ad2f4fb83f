//! User accounts and preferences.
//!
//! The catalog layer reads users through the [`UserStore`] trait: a lookup by
//! internal id, persistence of the rotated refresh credential, and the
//! per-user catalog preferences.

mod sqlite;
mod types;

pub use sqlite::SqliteUserStore;
pub use types::*;

/// Errors from user storage.
#[derive(Debug, thiserror::Error)]
pub enum UserStoreError {
    /// The user does not exist.
    #[error("User not found: {0}")]
    NotFound(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),

    /// Stored preferences could not be decoded.
    #[error("Invalid preferences for user {user_id}: {reason}")]
    InvalidPreferences { user_id: String, reason: String },
}

/// Trait for user storage.
pub trait UserStore: Send + Sync {
    /// Look up a user by internal id.
    fn find_by_id(&self, user_id: &str) -> Result<Option<User>, UserStoreError>;

    /// Insert or replace a user.
    fn upsert(&self, user: &User) -> Result<(), UserStoreError>;

    /// Persist a rotated refresh credential.
    fn update_refresh_token(&self, user_id: &str, refresh_token: &str)
        -> Result<(), UserStoreError>;

    /// Replace a user's preferences.
    fn update_preferences(
        &self,
        user_id: &str,
        preferences: &UserPreferences,
    ) -> Result<(), UserStoreError>;

    /// A user's preferences.
    fn preferences(&self, user_id: &str) -> Result<UserPreferences, UserStoreError> {
        self.find_by_id(user_id)?
            .map(|user| user.preferences)
            .ok_or_else(|| UserStoreError::NotFound(user_id.to_string()))
    }
}
