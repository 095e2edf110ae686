//! Taskboard server - role-based task assignment with completion reports

use chrono::Utc;
use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use taskboard::config::Config;
use taskboard::{api, db, identity, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taskboard=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::parse();

    // Database connection and migrations
    let pool = db::connect(&config.database_url, config.max_connections).await?;
    let state = AppState::with_tokens(pool, config.token_settings());

    if let (Some(username), Some(password)) =
        (&config.bootstrap_superadmin, &config.bootstrap_password)
    {
        match identity::bootstrap_superadmin(&state.store, username, password).await? {
            Some(user) => tracing::info!("Created superadmin {}", user.username),
            None => tracing::debug!("Users already exist, skipping superadmin bootstrap"),
        }
    }

    let purged = state.store.purge_expired_sessions(Utc::now()).await?;
    if purged > 0 {
        tracing::info!("Purged {} expired sessions", purged);
    }

    // Build router
    let app = api::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
