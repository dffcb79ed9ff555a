//! Bearer-token sessions and password hashing.
//!
//! Tokens are random 256-bit hex strings handed to the client once; the
//! store only ever sees their SHA-256 digest.

use std::sync::Arc;
use std::time::Duration;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use frontline_core::{Error, Result};
use frontline_store::User;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::state::AppState;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| Error::Internal(format!("password hashing failed: {e}")))
}

pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            warn!("Unparseable password hash in store: {}", e);
            false
        }
    }
}

/// Fresh opaque bearer token.
pub fn new_token() -> String {
    let mut hasher = Sha256::new();
    hasher.update(uuid::Uuid::new_v4().as_bytes());
    hasher.update(uuid::Uuid::new_v4().as_bytes());
    hex::encode(hasher.finalize())
}

pub fn token_hash(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Create a session for `user_id`. Returns the raw token and its expiry.
pub fn issue_session(state: &AppState, user_id: i64) -> Result<(String, i64)> {
    let token = new_token();
    let expires_at = state
        .store
        .create_session(user_id, &token_hash(&token), state.session_ttl())?;
    debug!("Issued session for user {}", user_id);
    Ok((token, expires_at))
}

/// Pull the token out of an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// The authenticated caller. Rejects with 401 when the token is missing, unknown or expired.
pub struct AuthUser {
    pub user: User,
    pub token_hash: String,
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> std::result::Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(bearer_token)
            .ok_or_else(|| ApiError::unauthorized("missing bearer token"))?;

        let hash = token_hash(token);
        let user = state
            .store
            .session_user(&hash)?
            .ok_or_else(|| ApiError::unauthorized("invalid or expired token"))?;

        Ok(Self {
            user,
            token_hash: hash,
        })
    }
}

/// Periodically drop expired sessions.
pub fn start_session_sweeper(state: Arc<AppState>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            match state.store.purge_expired_sessions() {
                Ok(0) => {}
                Ok(n) => info!("Purged {} expired sessions", n),
                Err(e) => warn!("Session purge failed: {}", e),
            }
        }
    });
}
