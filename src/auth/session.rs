//! Session manager: session rows and the cookies that carry them.

use axum_extra::extract::cookie::{Cookie, SameSite};
use chrono::{DateTime, Datelike, Duration, Utc};
use std::sync::Arc;

use super::db::{self as auth_db, SessionRow};
use super::error::AuthError;
use super::generate_id;
use super::users::User;
use crate::config::Environment;
use crate::db::{try_lock, Storage};

pub const SESSION_COOKIE_NAME: &str = "auth_session";

/// Length of generated session ids
const SESSION_ID_LEN: usize = 40;

/// Client-side lifetime of a session cookie. The server row decides validity.
const SESSION_COOKIE_MAX_AGE_DAYS: i64 = 400;

/// Server-side expiry policy for session rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionExpiry {
    /// Sessions live until explicitly invalidated
    #[default]
    Never,
    /// Sessions expire after the given span; validating a session with less
    /// than half of the span left pushes its expiry forward
    Sliding(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub expires_at: Option<DateTime<Utc>>,
    /// Set when the session was just created or extended; the caller should
    /// re-issue the session cookie
    pub fresh: bool,
}

/// A session that passed validation, with its owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidSession {
    pub session: Session,
    pub user: User,
}

#[derive(Clone)]
pub struct SessionManager {
    storage: Arc<Storage>,
    expiry: SessionExpiry,
    secure_cookies: bool,
}

impl SessionManager {
    pub fn new(storage: Arc<Storage>, expiry: SessionExpiry, environment: Environment) -> Self {
        Self {
            storage,
            expiry,
            secure_cookies: environment.is_production(),
        }
    }

    /// Create a fresh session bound to `user_id`.
    pub fn create_session(&self, user_id: &str) -> Result<Session, AuthError> {
        let row = SessionRow {
            id: generate_id(SESSION_ID_LEN),
            user_id: user_id.to_string(),
            expires_at: self.next_expiry(Utc::now())?,
        };

        let conn = try_lock(self.storage.pool()?)?;
        auth_db::insert_session(&conn, &row)?;
        drop(conn);

        tracing::debug!("Created session for user {}", user_id);
        Ok(Session {
            id: row.id,
            user_id: row.user_id,
            expires_at: row.expires_at,
            fresh: true,
        })
    }

    /// Look up a session, deleting it if expired and extending it if due.
    pub fn validate_session(&self, session_id: &str) -> Result<Option<ValidSession>, AuthError> {
        let conn = try_lock(self.storage.pool()?)?;

        let Some((row, user)) = auth_db::get_session_and_user(&conn, session_id)? else {
            return Ok(None);
        };

        let now = Utc::now();
        let mut expires_at = row.expires_at;
        let mut fresh = false;

        if row.expires_at.is_some_and(|current| current <= now) {
            auth_db::delete_session(&conn, &row.id)?;
            tracing::debug!("Deleted expired session for user {}", row.user_id);
            return Ok(None);
        }

        if let SessionExpiry::Sliding(span) = self.expiry {
            let due = match row.expires_at {
                Some(current) => current - now < span / 2,
                // Created while sessions never expired
                None => true,
            };
            if due {
                let extended = expiry_after(now, span)?;
                auth_db::update_session_expiry(&conn, &row.id, extended)?;
                expires_at = Some(extended);
                fresh = true;
            }
        }

        Ok(Some(ValidSession {
            session: Session {
                id: row.id,
                user_id: row.user_id,
                expires_at,
                fresh,
            },
            user: user.into(),
        }))
    }

    /// Delete the session row. Unknown ids are not an error.
    pub fn invalidate_session(&self, session_id: &str) -> Result<(), AuthError> {
        let conn = try_lock(self.storage.pool()?)?;
        auth_db::delete_session(&conn, session_id)?;
        Ok(())
    }

    /// Delete every session belonging to `user_id`
    pub fn invalidate_user_sessions(&self, user_id: &str) -> Result<usize, AuthError> {
        let conn = try_lock(self.storage.pool()?)?;
        Ok(auth_db::delete_user_sessions(&conn, user_id)?)
    }

    pub fn delete_expired_sessions(&self) -> Result<usize, AuthError> {
        let conn = try_lock(self.storage.pool()?)?;
        Ok(auth_db::delete_expired_sessions(&conn, Utc::now())?)
    }

    /// Cookie carrying `session_id` to the client.
    pub fn create_session_cookie(&self, session_id: &str) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE_NAME, session_id.to_string()))
            .path("/")
            .http_only(true)
            .secure(self.secure_cookies)
            .same_site(SameSite::Lax)
            .max_age(time::Duration::days(SESSION_COOKIE_MAX_AGE_DAYS))
            .build()
    }

    /// Cookie that clears the client-held session reference.
    pub fn create_blank_session_cookie(&self) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE_NAME, ""))
            .path("/")
            .http_only(true)
            .secure(self.secure_cookies)
            .same_site(SameSite::Lax)
            .max_age(time::Duration::seconds(0))
            .build()
    }

    fn next_expiry(&self, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, AuthError> {
        match self.expiry {
            SessionExpiry::Never => Ok(None),
            SessionExpiry::Sliding(span) => expiry_after(now, span).map(Some),
        }
    }
}

/// `now + span`, limited to four-digit years so stored timestamps keep a fixed width
fn expiry_after(now: DateTime<Utc>, span: Duration) -> Result<DateTime<Utc>, AuthError> {
    now.checked_add_signed(span)
        .filter(|at| at.year() <= 9999)
        .ok_or(AuthError::ExpiryOutOfRange(span))
}
