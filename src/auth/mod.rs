//! Session authentication: login, logout and per-request session validation.

pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod password;
pub mod session;
pub mod users;

pub use error::{ActionError, AuthError, LoginError};
pub use handlers::*;
pub use middleware::{session_scope, validate_request, CurrentSession, RequireUser, SessionScope};
pub use session::{Session, SessionExpiry, SessionManager, ValidSession, SESSION_COOKIE_NAME};
pub use users::{CredentialStore, NewUser, User};

/// Generate a random lowercase alphanumeric id of `len` characters
pub fn generate_id(len: usize) -> String {
    use rand::Rng;
    let mut rng = rand::rng();
    (0..len)
        .map(|_| {
            let idx = rng.random_range(0..36u8);
            if idx < 10 {
                (b'0' + idx) as char
            } else {
                (b'a' + idx - 10) as char
            }
        })
        .collect()
}
