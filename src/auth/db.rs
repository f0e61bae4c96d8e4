//! Auth database operations (users and sessions tables).
//!
//! ## Migration System
//!
//! This module uses a version-gated migration system. Each migration:
//! 1. Checks if the current schema version is less than the target version
//! 2. Runs the migration SQL
//! 3. Records the new version in `db_version` table
//!
//! Migrations only run once - the version check ensures idempotency.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Result, Row};

/// Current schema version for the auth database
/// Increment this when adding a new migration
pub const AUTH_DB_VERSION: i32 = 2;

/// Stored user row, including the password hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub google_id: Option<String>,
    /// `None` for accounts provisioned through a federated identity only
    pub password_hash: Option<String>,
}

/// Stored session row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRow {
    pub id: String,
    pub user_id: String,
    /// `None` means the session never expires server-side
    pub expires_at: Option<DateTime<Utc>>,
}

/// Initialize the auth database schema with version-gated migrations
pub fn init_auth_schema(conn: &Connection) -> Result<()> {
    // Bootstrap: ensure db_version table exists (needed to check version)
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS db_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL,
            description TEXT
        );
        "#,
    )?;

    let current_version = get_schema_version(conn)?;
    tracing::debug!("auth db schema version: {}", current_version);

    if current_version < 1 {
        migrate_v0_to_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v1_to_v2(conn)?;
    }

    Ok(())
}

/// v0→v1: Create users table
fn migrate_v0_to_v1(conn: &Connection) -> Result<()> {
    tracing::info!("Running migration v0→v1: Create users table");

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE COLLATE NOCASE,
            display_name TEXT NOT NULL,
            avatar_url TEXT,
            google_id TEXT UNIQUE,
            password_hash TEXT,
            created_at TEXT NOT NULL
        );
        "#,
    )?;

    record_version(conn, 1, "Create users table")?;
    Ok(())
}

/// v1→v2: Create sessions table
fn migrate_v1_to_v2(conn: &Connection) -> Result<()> {
    tracing::info!("Running migration v1→v2: Create sessions table");

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            expires_at TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_sessions_user_id ON sessions(user_id);
        CREATE INDEX IF NOT EXISTS idx_sessions_expires_at ON sessions(expires_at);
        "#,
    )?;

    record_version(conn, 2, "Create sessions table")?;
    Ok(())
}

/// Record a schema version after successful migration
fn record_version(conn: &Connection, version: i32, description: &str) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO db_version (version, applied_at, description) VALUES (?1, ?2, ?3)",
        params![version, now, description],
    )?;
    tracing::info!("Recorded schema version {} - {}", version, description);
    Ok(())
}

/// Get current schema version (0 if no versions recorded)
pub fn get_schema_version(conn: &Connection) -> Result<i32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM db_version",
        [],
        |row| row.get(0),
    )
}

// ==================== Users ====================

const USER_COLUMNS: &str = "id, username, display_name, avatar_url, google_id, password_hash";

fn user_from_row(row: &Row<'_>) -> Result<UserRecord> {
    Ok(UserRecord {
        id: row.get(0)?,
        username: row.get(1)?,
        display_name: row.get(2)?,
        avatar_url: row.get(3)?,
        google_id: row.get(4)?,
        password_hash: row.get(5)?,
    })
}

/// Insert a user row
pub fn insert_user(conn: &Connection, user: &UserRecord) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        r#"INSERT INTO users (id, username, display_name, avatar_url, google_id, password_hash, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
        params![
            user.id,
            user.username,
            user.display_name,
            user.avatar_url,
            user.google_id,
            user.password_hash,
            now
        ],
    )?;
    Ok(())
}

/// Case-insensitive exact match on username
pub fn get_user_by_username(conn: &Connection, username: &str) -> Result<Option<UserRecord>> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1 COLLATE NOCASE"),
        params![username],
        user_from_row,
    )
    .optional()
}

// ==================== Sessions ====================

/// Fixed-width UTC timestamps so `expires_at` compares correctly as text
fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(idx: usize, value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value
        .map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        idx,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })
        })
        .transpose()
}

/// Insert a session row
pub fn insert_session(conn: &Connection, session: &SessionRow) -> Result<()> {
    let now = format_timestamp(Utc::now());
    conn.execute(
        "INSERT INTO sessions (id, user_id, expires_at, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![
            session.id,
            session.user_id,
            session.expires_at.map(format_timestamp),
            now
        ],
    )?;
    Ok(())
}

/// Get a session together with its owning user
pub fn get_session_and_user(
    conn: &Connection,
    session_id: &str,
) -> Result<Option<(SessionRow, UserRecord)>> {
    conn.query_row(
        r#"SELECT s.id, s.user_id, s.expires_at,
                  u.id, u.username, u.display_name, u.avatar_url, u.google_id, u.password_hash
           FROM sessions s
           JOIN users u ON s.user_id = u.id
           WHERE s.id = ?1"#,
        params![session_id],
        |row| {
            let session = SessionRow {
                id: row.get(0)?,
                user_id: row.get(1)?,
                expires_at: parse_timestamp(2, row.get(2)?)?,
            };
            let user = UserRecord {
                id: row.get(3)?,
                username: row.get(4)?,
                display_name: row.get(5)?,
                avatar_url: row.get(6)?,
                google_id: row.get(7)?,
                password_hash: row.get(8)?,
            };
            Ok((session, user))
        },
    )
    .optional()
}

/// Move a session's expiry
pub fn update_session_expiry(
    conn: &Connection,
    session_id: &str,
    expires_at: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "UPDATE sessions SET expires_at = ?1 WHERE id = ?2",
        params![format_timestamp(expires_at), session_id],
    )?;
    Ok(())
}

/// Delete a session; deleting a missing id is not an error
pub fn delete_session(conn: &Connection, session_id: &str) -> Result<usize> {
    conn.execute("DELETE FROM sessions WHERE id = ?1", params![session_id])
}

/// Delete all sessions for a user
pub fn delete_user_sessions(conn: &Connection, user_id: &str) -> Result<usize> {
    conn.execute("DELETE FROM sessions WHERE user_id = ?1", params![user_id])
}

/// Delete every session whose expiry has passed
pub fn delete_expired_sessions(conn: &Connection, now: DateTime<Utc>) -> Result<usize> {
    conn.execute(
        "DELETE FROM sessions WHERE expires_at IS NOT NULL AND expires_at <= ?1",
        params![format_timestamp(now)],
    )
}

/// List a user's session ids
pub fn get_user_session_ids(conn: &Connection, user_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT id FROM sessions WHERE user_id = ?1 ORDER BY created_at")?;
    let ids = stmt
        .query_map(params![user_id], |row| row.get(0))?
        .collect::<Result<Vec<String>>>()?;
    Ok(ids)
}

/// Total number of session rows
pub fn get_session_count(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))
}
