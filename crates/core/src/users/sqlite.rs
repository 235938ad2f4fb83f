//! SQLite-backed user store.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{User, UserPreferences, UserStore, UserStoreError};

/// SQLite-backed user store.
pub struct SqliteUserStore {
    conn: Mutex<Connection>,
}

impl SqliteUserStore {
    /// Open the database file, creating it and the schema if needed.
    pub fn new(path: &Path) -> Result<Self, UserStoreError> {
        let conn = Connection::open(path).map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, UserStoreError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), UserStoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL,
                member_id TEXT NOT NULL,
                refresh_token TEXT,
                preferences TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_users_member_id ON users(member_id);
            "#,
        )
        .map_err(db_err)?;

        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn db_err(e: rusqlite::Error) -> UserStoreError {
    UserStoreError::Database(e.to_string())
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Raw row, decoded outside the rusqlite closure so JSON errors keep their type.
struct UserRow {
    id: String,
    username: String,
    member_id: String,
    refresh_token: Option<String>,
    preferences: String,
    created_at: String,
    updated_at: String,
}

impl UserRow {
    fn into_user(self) -> Result<User, UserStoreError> {
        let preferences: UserPreferences =
            serde_json::from_str(&self.preferences).map_err(|e| {
                UserStoreError::InvalidPreferences {
                    user_id: self.id.clone(),
                    reason: e.to_string(),
                }
            })?;

        Ok(User {
            id: self.id,
            username: self.username,
            member_id: self.member_id,
            refresh_token: self.refresh_token,
            preferences,
            created_at: parse_timestamp(&self.created_at),
            updated_at: parse_timestamp(&self.updated_at),
        })
    }
}

impl UserStore for SqliteUserStore {
    fn find_by_id(&self, user_id: &str) -> Result<Option<User>, UserStoreError> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT id, username, member_id, refresh_token, preferences, created_at, updated_at
                 FROM users WHERE id = ?",
                params![user_id],
                |row| {
                    Ok(UserRow {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        member_id: row.get(2)?,
                        refresh_token: row.get(3)?,
                        preferences: row.get(4)?,
                        created_at: row.get(5)?,
                        updated_at: row.get(6)?,
                    })
                },
            )
            .optional()
            .map_err(db_err)?;

        row.map(UserRow::into_user).transpose()
    }

    fn upsert(&self, user: &User) -> Result<(), UserStoreError> {
        let preferences = serde_json::to_string(&user.preferences).map_err(|e| {
            UserStoreError::InvalidPreferences {
                user_id: user.id.clone(),
                reason: e.to_string(),
            }
        })?;

        let conn = self.lock();
        conn.execute(
            "INSERT INTO users (id, username, member_id, refresh_token, preferences, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                username = excluded.username,
                member_id = excluded.member_id,
                refresh_token = excluded.refresh_token,
                preferences = excluded.preferences,
                updated_at = excluded.updated_at",
            params![
                user.id,
                user.username,
                user.member_id,
                user.refresh_token,
                preferences,
                user.created_at.to_rfc3339(),
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(db_err)?;

        Ok(())
    }

    fn update_refresh_token(
        &self,
        user_id: &str,
        refresh_token: &str,
    ) -> Result<(), UserStoreError> {
        let conn = self.lock();
        let updated = conn
            .execute(
                "UPDATE users SET refresh_token = ?1, updated_at = ?2 WHERE id = ?3",
                params![refresh_token, Utc::now().to_rfc3339(), user_id],
            )
            .map_err(db_err)?;

        if updated == 0 {
            return Err(UserStoreError::NotFound(user_id.to_string()));
        }
        Ok(())
    }

    fn update_preferences(
        &self,
        user_id: &str,
        preferences: &UserPreferences,
    ) -> Result<(), UserStoreError> {
        let json = serde_json::to_string(preferences).map_err(|e| {
            UserStoreError::InvalidPreferences {
                user_id: user_id.to_string(),
                reason: e.to_string(),
            }
        })?;

        let conn = self.lock();
        let updated = conn
            .execute(
                "UPDATE users SET preferences = ?1, updated_at = ?2 WHERE id = ?3",
                params![json, Utc::now().to_rfc3339(), user_id],
            )
            .map_err(db_err)?;

        if updated == 0 {
            return Err(UserStoreError::NotFound(user_id.to_string()));
        }
        Ok(())
    }
}
