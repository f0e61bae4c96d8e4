//! Credential store: user lookup by username.

use serde::Serialize;
use std::sync::Arc;

use super::db::{self as auth_db, UserRecord};
use super::error::AuthError;
use super::generate_id;
use crate::db::{try_lock, Storage};

/// Length of generated user ids
const USER_ID_LEN: usize = 16;

/// Public user attributes exposed to request handlers (no password hash)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub google_id: Option<String>,
}

impl From<UserRecord> for User {
    fn from(record: UserRecord) -> Self {
        Self {
            id: record.id,
            username: record.username,
            display_name: record.display_name,
            avatar_url: record.avatar_url,
            google_id: record.google_id,
        }
    }
}

/// Fields needed to provision a user
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub username: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub google_id: Option<String>,
    pub password_hash: Option<String>,
}

#[derive(Clone)]
pub struct CredentialStore {
    storage: Arc<Storage>,
}

impl CredentialStore {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Case-insensitive exact username match. Absence is `Ok(None)`.
    pub fn find_user_by_username(&self, username: &str) -> Result<Option<UserRecord>, AuthError> {
        let conn = try_lock(self.storage.pool()?)?;
        Ok(auth_db::get_user_by_username(&conn, username)?)
    }

    /// Provision a user with a generated id.
    pub fn create_user(&self, new_user: NewUser) -> Result<UserRecord, AuthError> {
        let record = UserRecord {
            id: generate_id(USER_ID_LEN),
            username: new_user.username,
            display_name: new_user.display_name,
            avatar_url: new_user.avatar_url,
            google_id: new_user.google_id,
            password_hash: new_user.password_hash,
        };
        let conn = try_lock(self.storage.pool()?)?;
        auth_db::insert_user(&conn, &record)?;
        tracing::info!("Created user {} ({})", record.username, record.id);
        Ok(record)
    }
}
