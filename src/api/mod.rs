//! HTTP surface: routing and request handlers

pub mod tasks;
pub mod users;

use axum::{routing::get, Router};
use std::sync::Arc;

use crate::AppState;

/// Build the application router. Tracing and CORS layers are added by the caller.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(users::router())
        .merge(tasks::router())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
