//! Session management
//!
//! Access tokens stay on the server. The browser only holds an
//! HMAC-signed session id in the `session` cookie; the token itself is
//! looked up in [`SessionStore`] on every request.

use std::collections::HashMap;

use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tokio::sync::RwLock;

use super::token::{AccessToken, random_token};
use crate::error::AppError;
use crate::metrics::SESSIONS_ACTIVE;

type HmacSha256 = Hmac<Sha256>;

/// Name of the cookie carrying the signed session id
pub const SESSION_COOKIE: &str = "session";

/// Server-side record of one logged-in browser
#[derive(Debug, Clone)]
pub struct Session {
    pub access_token: AccessToken,
    /// When session expires
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Check if session is expired
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }
}

/// Per-session token storage keyed by random session id
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    secret: String,
    max_age: Duration,
}

impl SessionStore {
    pub fn new(secret: impl Into<String>, max_age_seconds: i64) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            secret: secret.into(),
            max_age: Duration::seconds(max_age_seconds),
        }
    }

    /// Store a token under a fresh session id
    ///
    /// # Returns
    /// Signed cookie value for the new session
    pub async fn create(&self, access_token: AccessToken) -> Result<String, AppError> {
        let id = random_token();
        let cookie_value = sign_session_id(&id, &self.secret)?;

        let session = Session {
            access_token,
            expires_at: Utc::now() + self.max_age,
        };

        let mut sessions = self.sessions.write().await;
        sessions.insert(id, session);
        SESSIONS_ACTIVE.set(sessions.len() as i64);

        Ok(cookie_value)
    }

    /// Resolve a cookie value to a live session
    pub async fn get(&self, cookie_value: &str) -> Option<Session> {
        let id = verify_session_id(cookie_value, &self.secret).ok()?;
        let sessions = self.sessions.read().await;
        sessions
            .get(&id)
            .filter(|session| !session.is_expired())
            .cloned()
    }

    /// Drop the session behind a cookie value
    pub async fn remove(&self, cookie_value: &str) -> Option<Session> {
        let id = verify_session_id(cookie_value, &self.secret).ok()?;
        let mut sessions = self.sessions.write().await;
        let removed = sessions.remove(&id);
        SESSIONS_ACTIVE.set(sessions.len() as i64);
        removed
    }

    /// Remove expired sessions, returning how many were dropped
    pub async fn prune_expired(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired());
        SESSIONS_ACTIVE.set(sessions.len() as i64);
        before - sessions.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

/// Sign a session id for the cookie
///
/// Token format: id.base64(hmac_sha256(id))
pub fn sign_session_id(id: &str, secret: &str) -> Result<String, AppError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Internal(anyhow::anyhow!("invalid session key: {e}")))?;
    mac.update(id.as_bytes());
    let signature = mac.finalize().into_bytes();
    let signature_b64 = general_purpose::URL_SAFE_NO_PAD.encode(signature);

    Ok(format!("{}.{}", id, signature_b64))
}

/// Verify a signed session id and return the bare id
///
/// # Errors
/// Returns `NotAuthenticated` if the value is malformed or the signature is invalid
pub fn verify_session_id(token: &str, secret: &str) -> Result<String, AppError> {
    let (id, signature_b64) = token.split_once('.').ok_or(AppError::NotAuthenticated)?;
    if id.is_empty() || signature_b64.contains('.') {
        return Err(AppError::NotAuthenticated);
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Internal(anyhow::anyhow!("invalid session key: {e}")))?;
    mac.update(id.as_bytes());

    let signature = general_purpose::URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| AppError::NotAuthenticated)?;

    mac.verify_slice(&signature)
        .map_err(|_| AppError::NotAuthenticated)?;

    Ok(id.to_string())
}
