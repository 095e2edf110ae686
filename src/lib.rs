//! Taskboard server - role-based task assignment with completion reports

pub mod api;
pub mod auth;
pub mod authz;
pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod models;
pub mod store;
pub mod tasks;
pub mod workflow;

use sqlx::SqlitePool;
use std::sync::Arc;

/// Application state shared across handlers
pub struct AppState {
    pub store: store::Store,
    pub tokens: auth::TokenSettings,
}

impl AppState {
    pub fn new(pool: SqlitePool) -> Arc<Self> {
        Self::with_tokens(pool, auth::TokenSettings::default())
    }

    pub fn with_tokens(pool: SqlitePool, tokens: auth::TokenSettings) -> Arc<Self> {
        Arc::new(Self {
            store: store::Store::new(pool),
            tokens,
        })
    }
}
