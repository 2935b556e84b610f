//! GitHub OAuth flow
//!
//! Implements the OAuth 2.0 authorization code flow with GitHub.

use axum::{
    Json, Router,
    extract::{Query, State},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use serde::Deserialize;

use super::middleware::{CurrentSession, MaybeSession};
use super::session::SESSION_COOKIE;
use super::token::{AuthorizationCode, OAuthState};
use crate::AppState;
use crate::error::AppError;

const OAUTH_STATE_COOKIE: &str = "oauth_state";
const OAUTH_STATE_COOKIE_PATH: &str = "/auth";

/// Create authentication router
///
/// Routes:
/// - GET / - Login page
/// - GET /auth - Redirect to GitHub
/// - GET /auth/callback - OAuth callback
/// - GET /profile - Authenticated user's GitHub profile
/// - GET|POST /logout - Logout
pub fn auth_router() -> Router<AppState> {
    Router::new()
        .route("/", get(login_page))
        .route("/auth", get(github_redirect))
        .route("/auth/callback", get(github_callback))
        .route("/profile", get(profile))
        .route("/logout", get(logout).post(logout))
}

// =============================================================================
// Login Page
// =============================================================================

/// GET /
///
/// Renders a login link, or profile/logout links for a logged-in browser.
async fn login_page(MaybeSession(session): MaybeSession) -> impl IntoResponse {
    let body = match session {
        Some(_) => r#"<a href="/profile">View GitHub profile</a> | <a href="/logout">Log out</a>"#,
        None => r#"<a href="/auth">Log in with GitHub</a>"#,
    };

    Html(format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Login with GitHub</title></head>
<body>
    {body}
</body>
</html>
"#
    ))
}

// =============================================================================
// GitHub OAuth
// =============================================================================

/// GET /auth
///
/// Redirects user to GitHub authorization page.
///
/// # Steps
/// 1. Generate CSRF state token (when state verification is enabled)
/// 2. Store state in cookie
/// 3. Redirect to GitHub with client_id, redirect_uri, scope, state
async fn github_redirect(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    let oauth_state = state
        .config
        .auth
        .verify_state
        .then(OAuthState::generate);

    let jar = match &oauth_state {
        Some(oauth_state) => jar.add(build_oauth_state_cookie(
            oauth_state,
            state.config.should_use_secure_cookies(),
        )),
        None => jar,
    };

    let request = state.github.authorization_request(oauth_state);
    let location = state.github.authorize_url(&request);

    tracing::info!(
        client_id = %request.client_id,
        scopes = %request.scopes.join(" "),
        redirect_uri = %request.redirect_uri,
        "Redirecting to GitHub authorization"
    );

    (jar, Redirect::to(location.as_str()))
}

/// Query parameters from GitHub callback
#[derive(Debug, Deserialize)]
struct GitHubCallbackQuery {
    /// Authorization code
    code: Option<String>,
    /// CSRF state token
    state: Option<String>,
    /// Set by GitHub when the user denies access
    error: Option<String>,
    error_description: Option<String>,
}

/// GET /auth/callback
///
/// Handles OAuth callback from GitHub.
///
/// # Steps
/// 1. Require an authorization code
/// 2. Verify CSRF state
/// 3. Exchange code for access token
/// 4. Store token in a new session and set cookie
/// 5. Redirect to profile
///
/// A failed exchange redirects to `/` without creating a session.
async fn github_callback(
    State(state): State<AppState>,
    Query(query): Query<GitHubCallbackQuery>,
    jar: CookieJar,
) -> Response {
    let expected_state = jar
        .get(OAUTH_STATE_COOKIE)
        .and_then(|cookie| OAuthState::from_cookie(cookie.value()));
    let previous_session = jar
        .get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_owned());
    let jar = jar.remove(clear_oauth_state_cookie());

    match complete_login(&state, query, expected_state).await {
        Ok(session_cookie) => {
            if let Some(previous) = previous_session {
                state.sessions.remove(&previous).await;
            }
            let jar = jar.add(build_session_cookie(
                session_cookie,
                state.config.should_use_secure_cookies(),
            ));
            (jar, Redirect::to("/profile")).into_response()
        }
        Err(AppError::TokenExchange(reason)) => {
            tracing::warn!(%reason, "Error during token exchange");
            (jar, Redirect::to("/")).into_response()
        }
        Err(error) => (jar, error).into_response(),
    }
}

async fn complete_login(
    state: &AppState,
    query: GitHubCallbackQuery,
    expected_state: Option<OAuthState>,
) -> Result<String, AppError> {
    let code = match query.code.as_deref().map(AuthorizationCode::new) {
        Some(Ok(code)) => code,
        _ => {
            tracing::warn!(
                provider_error = query.error.as_deref().unwrap_or(""),
                provider_error_description = query.error_description.as_deref().unwrap_or(""),
                "No authorization code received"
            );
            return Err(AppError::MissingCode);
        }
    };

    if state.config.auth.verify_state {
        verify_csrf_state(query.state.as_deref(), expected_state.as_ref())?;
    }

    let access_token = state.github.exchange_code(&code).await?;
    state.sessions.create(access_token).await
}

// =============================================================================
// Profile
// =============================================================================

/// GET /profile
///
/// Fetches the logged-in user's profile from GitHub and returns it unchanged.
async fn profile(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
) -> Result<impl IntoResponse, AppError> {
    let profile = state.github.fetch_profile(&session.access_token).await?;
    Ok(Json(profile))
}

// =============================================================================
// Logout
// =============================================================================

/// GET /logout
///
/// Drops the server-side session, clears cookies and redirects home.
async fn logout(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        if state.sessions.remove(cookie.value()).await.is_some() {
            tracing::info!("Session logged out");
        }
    }

    let jar = jar
        .remove(clear_session_cookie())
        .remove(clear_oauth_state_cookie());
    (jar, Redirect::to("/"))
}

// =============================================================================
// Helpers
// =============================================================================

/// Verify CSRF state from cookie matches callback state
fn verify_csrf_state(
    received: Option<&str>,
    expected: Option<&OAuthState>,
) -> Result<(), AppError> {
    match (received, expected) {
        (Some(received), Some(expected)) if expected.matches(received) => Ok(()),
        _ => {
            tracing::warn!("OAuth state mismatch on callback");
            Err(AppError::InvalidState)
        }
    }
}

fn build_oauth_state_cookie(state: &OAuthState, secure: bool) -> Cookie<'static> {
    Cookie::build((OAUTH_STATE_COOKIE, state.as_str().to_string()))
        .path(OAUTH_STATE_COOKIE_PATH)
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .build()
}

fn clear_oauth_state_cookie() -> Cookie<'static> {
    Cookie::build((OAUTH_STATE_COOKIE, ""))
        .path(OAUTH_STATE_COOKIE_PATH)
        .build()
}

fn build_session_cookie(value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, value))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .build()
}

fn clear_session_cookie() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, "")).path("/").build()
}
