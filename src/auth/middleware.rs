//! Session extractors
//!
//! Resolve the `session` cookie to the server-side [`Session`].

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, request::Parts},
};
use axum_extra::extract::CookieJar;

use super::session::{SESSION_COOKIE, Session};
use crate::AppState;
use crate::error::AppError;

fn extract_session_cookie(headers: &HeaderMap) -> Option<String> {
    let jar = CookieJar::from_headers(headers);
    jar.get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_owned())
        .filter(|value| !value.is_empty())
}

async fn resolve_session(parts: &mut Parts, state: &AppState) -> Option<Session> {
    if let Some(session) = parts.extensions.get::<Session>().cloned() {
        return Some(session);
    }

    let cookie_value = extract_session_cookie(&parts.headers)?;
    let session = state.sessions.get(&cookie_value).await?;
    parts.extensions.insert(session.clone());
    Some(session)
}

/// Extractor for the current login session
///
/// Rejects with `NotAuthenticated` (400) when no valid session exists.
///
/// # Usage
/// ```ignore
/// async fn handler(
///     CurrentSession(session): CurrentSession,
/// ) -> impl IntoResponse {
///     format!("Session expires at {}", session.expires_at)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CurrentSession(pub Session);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentSession
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        resolve_session(parts, &state)
            .await
            .map(CurrentSession)
            .ok_or(AppError::NotAuthenticated)
    }
}

/// Optional session extractor
///
/// Returns None if not logged in, instead of error.
#[derive(Debug, Clone)]
pub struct MaybeSession(pub Option<Session>);

#[async_trait]
impl<S> FromRequestParts<S> for MaybeSession
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        Ok(MaybeSession(resolve_session(parts, &state).await))
    }
}
