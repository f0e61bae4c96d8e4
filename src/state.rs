//! Application state passed to all handlers.

use std::sync::Arc;

use crate::auth::{CredentialStore, SessionExpiry, SessionManager};
use crate::config::{Environment, Settings};
use crate::db::Storage;

#[derive(Clone)]
pub struct AppState {
    /// Shared storage handle; every clone points at the same connection
    pub storage: Arc<Storage>,
    pub sessions: SessionManager,
    pub users: CredentialStore,
}

impl AppState {
    pub fn new(storage: Arc<Storage>, expiry: SessionExpiry, environment: Environment) -> Self {
        Self {
            sessions: SessionManager::new(storage.clone(), expiry, environment),
            users: CredentialStore::new(storage.clone()),
            storage,
        }
    }

    pub fn from_settings(storage: Arc<Storage>, settings: &Settings) -> Self {
        Self::new(storage, settings.session_expiry, settings.environment)
    }
}
