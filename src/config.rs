//! Server configuration from command-line flags and environment

use chrono::Duration;
use clap::Parser;
use std::net::SocketAddr;

use crate::auth::TokenSettings;

#[derive(Debug, Clone, Parser)]
#[command(name = "taskboard")]
#[command(about = "Role-based task assignment server")]
#[command(version)]
pub struct Config {
    /// SQLite database URL, created if missing
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite:taskboard.db")]
    pub database_url: String,

    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value_t = 5)]
    pub max_connections: u32,

    /// Address the HTTP server listens on
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:3000")]
    pub bind_addr: SocketAddr,

    /// Lifetime of access tokens, in seconds
    #[arg(long, env = "ACCESS_TOKEN_TTL_SECS", default_value_t = 300)]
    pub access_token_ttl_secs: i64,

    /// Lifetime of refresh tokens, in seconds
    #[arg(long, env = "REFRESH_TOKEN_TTL_SECS", default_value_t = 86_400)]
    pub refresh_token_ttl_secs: i64,

    /// Username of the SuperAdmin created on an empty database
    #[arg(long, env = "BOOTSTRAP_SUPERADMIN", requires = "bootstrap_password")]
    pub bootstrap_superadmin: Option<String>,

    #[arg(long, env = "BOOTSTRAP_PASSWORD", hide_env_values = true)]
    pub bootstrap_password: Option<String>,
}

impl Config {
    pub fn token_settings(&self) -> TokenSettings {
        TokenSettings {
            access_ttl: Duration::seconds(self.access_token_ttl_secs),
            refresh_ttl: Duration::seconds(self.refresh_token_ttl_secs),
        }
    }
}
