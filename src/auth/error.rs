//! Error types for the authentication layer.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::db::{DbLockError, StorageError};
use crate::validation::ValidationError;

/// Shown for unknown users, password-less users and wrong passwords alike
pub const INVALID_CREDENTIALS_MESSAGE: &str = "Incorrect username or password";

/// Shown for every failure that is not the caller's fault
pub const GENERIC_FAILURE_MESSAGE: &str = "Something went wrong. Please try again.";

/// Failures of the session and credential services.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Lock(#[from] DbLockError),

    #[error("password hash error: {0}")]
    PasswordHash(String),

    #[error("session expiry of {0} is out of range")]
    ExpiryOutOfRange(chrono::Duration),

    /// A valid session was required but none was presented
    #[error("Unauthorized")]
    Unauthorized,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            AuthError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized").into_response(),
            other => {
                tracing::error!("Request failed: {}", other);
                (StatusCode::INTERNAL_SERVER_ERROR, GENERIC_FAILURE_MESSAGE).into_response()
            }
        }
    }
}

/// Outcome of a rejected login attempt.
#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Unknown user, user without a password, or wrong password
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error(transparent)]
    Internal(#[from] AuthError),
}

impl LoginError {
    pub fn status(&self) -> StatusCode {
        match self {
            LoginError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            LoginError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            LoginError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The user-facing payload. Internal details never reach it.
    pub fn to_action_error(&self) -> ActionError {
        let message = match self {
            LoginError::Validation(e) => e.to_string(),
            LoginError::InvalidCredentials => INVALID_CREDENTIALS_MESSAGE.to_string(),
            LoginError::Internal(_) => GENERIC_FAILURE_MESSAGE.to_string(),
        };
        ActionError { error: message }
    }
}

/// `{ "error": "..." }` payload returned to the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionError {
    pub error: String,
}
