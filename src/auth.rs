//! Credential verification, token issuance and the authenticated-actor extractor
//!
//! Passwords are stored as argon2 PHC strings. A login opens a session that
//! holds a short-lived access token and a longer-lived refresh token; only the
//! SHA-256 digests of the tokens are persisted.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, PasswordHash,
};
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{AccessToken, LoginResponse, User};
use crate::store::Store;
use crate::AppState;

/// Lifetimes of issued tokens
#[derive(Debug, Clone, Copy)]
pub struct TokenSettings {
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            access_ttl: Duration::minutes(5),
            refresh_ttl: Duration::days(1),
        }
    }
}

/// A login session as stored
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub access_hash: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_hash: String,
    pub refresh_expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Two v4 UUIDs, hex encoded
pub fn generate_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

pub fn digest_token(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

/// Verify credentials and open a session
pub async fn login(
    store: &Store,
    settings: &TokenSettings,
    username: &str,
    password: &str,
) -> Result<LoginResponse> {
    if username.trim().is_empty() {
        return Err(AppError::validation("username", "This field is required."));
    }
    if password.is_empty() {
        return Err(AppError::validation("password", "This field is required."));
    }

    let mut user = match store.find_user_by_username(username.trim()).await? {
        Some(user) if verify_password(password, &user.password_hash) => user,
        _ => {
            tracing::info!(username, "login failed");
            return Err(AppError::Unauthorized(
                "Unable to log in with provided credentials.".to_string(),
            ));
        }
    };
    if !user.is_active {
        return Err(AppError::Unauthorized("User account is disabled.".to_string()));
    }

    let now = Utc::now();
    let access = generate_token();
    let refresh = generate_token();
    let session = Session {
        id: Uuid::new_v4(),
        user_id: user.id,
        access_hash: digest_token(&access),
        access_expires_at: now + settings.access_ttl,
        refresh_hash: digest_token(&refresh),
        refresh_expires_at: now + settings.refresh_ttl,
        created_at: now,
    };
    store.insert_session(&session).await?;
    store.record_login(user.id, now).await?;
    user.last_login = Some(now);

    let purged = store.purge_expired_sessions(now).await?;
    if purged > 0 {
        tracing::debug!(purged, "purged expired sessions");
    }

    tracing::info!(user = %user.username, session = %session.id, "logged in");

    Ok(LoginResponse {
        access,
        refresh,
        user,
    })
}

/// Exchange a refresh token for a new access token
pub async fn refresh(
    store: &Store,
    settings: &TokenSettings,
    refresh_token: &str,
) -> Result<AccessToken> {
    let now = Utc::now();
    let session = store
        .find_session_by_refresh(&digest_token(refresh_token))
        .await?
        .ok_or_else(|| AppError::Unauthorized("Token is invalid or expired".to_string()))?;

    if session.refresh_expires_at <= now {
        store.delete_session(session.id).await?;
        return Err(AppError::Unauthorized(
            "Token is invalid or expired".to_string(),
        ));
    }

    let access = generate_token();
    store
        .rotate_access(session.id, &digest_token(&access), now + settings.access_ttl)
        .await?;

    Ok(AccessToken { access })
}

pub async fn logout(store: &Store, session_id: Uuid) -> Result<()> {
    store.delete_session(session_id).await?;
    tracing::info!(session = %session_id, "logged out");
    Ok(())
}

/// Resolve an access token to its user and session
pub async fn authenticate(
    store: &Store,
    access_token: &str,
    now: DateTime<Utc>,
) -> Result<(User, Session)> {
    let session = store
        .find_session_by_access(&digest_token(access_token))
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid token".to_string()))?;

    if session.access_expires_at <= now {
        return Err(AppError::Unauthorized("Token expired".to_string()));
    }

    let user = store
        .find_user(session.user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid token".to_string()))?;

    if !user.is_active {
        return Err(AppError::Unauthorized("User account is disabled.".to_string()));
    }

    Ok((user, session))
}

/// The authenticated actor of a request, from `Authorization: Bearer <token>`
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
    pub session_id: Uuid,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> std::result::Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                AppError::Unauthorized("Authentication credentials were not provided.".to_string())
            })?;

        let (user, session) = authenticate(&state.store, token, Utc::now()).await?;

        Ok(CurrentUser {
            user,
            session_id: session.id,
        })
    }
}
