pub mod auth;
pub mod config;
pub mod db;
pub mod handlers;
pub mod router;
pub mod state;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod validation;
