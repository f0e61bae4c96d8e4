use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use doorman::{config::Settings, db::Storage, router, state::AppState};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "doorman=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::load();
    tracing::info!(
        "Environment: {:?}, session expiry: {:?}",
        settings.environment,
        settings.session_expiry
    );

    // One storage handle for the whole process; the connection opens on first use
    let storage = Arc::new(Storage::new(settings.database_path.clone()));
    tracing::info!("Auth database: {}", storage.path().display());
    let state = AppState::from_settings(storage, &settings);

    match state.sessions.delete_expired_sessions() {
        Ok(0) => {}
        Ok(n) => tracing::info!("Removed {} expired sessions", n),
        Err(e) => tracing::warn!("Failed to remove expired sessions: {}", e),
    }

    let app = router::router(state);

    let bind_addr = settings.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|_| panic!("Failed to bind to {}", bind_addr));

    tracing::info!("Server running on http://{}", bind_addr);

    axum::serve(listener, app)
        .await
        .expect("Server failed to start");
}
