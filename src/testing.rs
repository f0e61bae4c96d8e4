//! Test utilities for database setup.
//!
//! Builds a full [`AppState`] over a database in a temporary directory, using
//! the same schema initialization as production.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tempfile::TempDir;

use crate::auth::db::{self as auth_db, SessionRow, UserRecord};
use crate::auth::{generate_id, password, NewUser, SessionExpiry};
use crate::config::Environment;
use crate::db::{try_lock, Storage};
use crate::state::AppState;

/// Test environment with a migrated auth database.
///
/// The temporary directory is removed when dropped.
pub struct TestEnv {
    /// Temporary directory (kept alive for database file persistence)
    pub temp: TempDir,
    pub state: AppState,
}

impl TestEnv {
    /// Sessions never expire
    pub fn new() -> Self {
        Self::with_expiry(SessionExpiry::Never)
    }

    pub fn with_expiry(expiry: SessionExpiry) -> Self {
        let temp = TempDir::new().expect("create temp dir");
        let storage = Arc::new(Storage::new(temp.path().join("auth.db")));
        let state = AppState::new(storage, expiry, Environment::Development);
        Self { temp, state }
    }

    /// Provision a user. `None` leaves the password hash unset.
    pub fn add_user(&self, username: &str, password: Option<&str>) -> UserRecord {
        let password_hash = password.map(|p| password::hash_password(p).expect("hash password"));
        self.state
            .users
            .create_user(NewUser {
                username: username.to_string(),
                display_name: username.to_string(),
                password_hash,
                ..Default::default()
            })
            .expect("create user")
    }

    /// Insert a session row directly, bypassing the expiry policy.
    pub fn insert_session(&self, user_id: &str, expires_at: Option<DateTime<Utc>>) -> String {
        let row = SessionRow {
            id: generate_id(40),
            user_id: user_id.to_string(),
            expires_at,
        };
        let conn = self.conn();
        auth_db::insert_session(&conn, &row).expect("insert session");
        row.id
    }

    pub fn session_count(&self) -> i64 {
        auth_db::get_session_count(&self.conn()).expect("count sessions")
    }

    pub fn user_session_ids(&self, user_id: &str) -> Vec<String> {
        auth_db::get_user_session_ids(&self.conn(), user_id).expect("list sessions")
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, rusqlite::Connection> {
        let pool = self.state.storage.pool().expect("open storage");
        try_lock(pool).expect("lock storage")
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}
