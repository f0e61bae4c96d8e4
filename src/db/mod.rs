//! Process-wide SQLite storage handle.
//!
//! A single [`Storage`] is created in `main` and shared (via `Arc`) by every
//! clone of the application state. The underlying connection is opened lazily
//! on first use and reused for the rest of the process lifetime, so repeated
//! router construction never opens a second connection to the same file.

use once_cell::sync::OnceCell;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::auth::db as auth_db;

pub type DbPool = Arc<Mutex<Connection>>;

/// Error returned when database lock cannot be acquired
#[derive(Debug, thiserror::Error)]
#[error("Database unavailable")]
pub struct DbLockError;

/// Error raised while opening or migrating the database on first use
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("failed to open database at {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },
    #[error("failed to migrate database: {0}")]
    Migrate(#[source] rusqlite::Error),
}

/// Lazily-initialized, init-once storage handle.
pub struct Storage {
    path: PathBuf,
    pool: OnceCell<DbPool>,
}

impl Storage {
    /// Create a handle for the database at `path`. Nothing is opened yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pool: OnceCell::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the connection has been opened yet
    pub fn is_open(&self) -> bool {
        self.pool.get().is_some()
    }

    /// Get the shared connection, opening and migrating it on first call.
    ///
    /// A failed first attempt leaves the cell empty, so the next call retries.
    pub fn pool(&self) -> Result<&DbPool, StorageError> {
        self.pool.get_or_try_init(|| {
            let conn = open(&self.path)?;
            tracing::info!("Opened auth database at {}", self.path.display());
            Ok(Arc::new(Mutex::new(conn)))
        })
    }
}

/// Try to acquire the database lock, returning an error if poisoned
pub fn try_lock(pool: &DbPool) -> Result<MutexGuard<'_, Connection>, DbLockError> {
    pool.lock().map_err(|_: PoisonError<_>| {
        tracing::error!("Database mutex poisoned - a thread panicked while holding the lock");
        DbLockError
    })
}

fn open(path: &Path) -> Result<Connection, StorageError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!("Could not create database directory {}: {}", parent.display(), e);
            }
        }
    }

    let conn = Connection::open(path).map_err(|source| StorageError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")
        .map_err(StorageError::Migrate)?;
    auth_db::init_auth_schema(&conn).map_err(StorageError::Migrate)?;
    Ok(conn)
}
