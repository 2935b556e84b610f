//! ghlogin - "Login with GitHub" over the OAuth 2.0 authorization code flow
//!
//! # Flow
//!
//! ```text
//! Browser            ghlogin                         GitHub
//!    │  GET /auth       │                               │
//!    │─────────────────>│  303 → /login/oauth/authorize │
//!    │<─────────────────│                               │
//!    │        (user approves on github.com)             │
//!    │  GET /auth/callback?code=…&state=…               │
//!    │─────────────────>│  POST /login/oauth/access_token
//!    │                  │──────────────────────────────>│
//!    │                  │<──────── access_token ────────│
//!    │  303 → /profile (session cookie)                 │
//!    │<─────────────────│                               │
//!    │  GET /profile    │  GET /user (Bearer)           │
//!    │─────────────────>│──────────────────────────────>│
//!    │<──── JSON ───────│<──────────────────────────────│
//! ```
//!
//! # Modules
//!
//! - `auth`: GitHub OAuth client, session store and routes
//! - `api`: Operational endpoints (metrics)
//! - `config`: Configuration management
//! - `error`: Error types
//! - `metrics`: Prometheus instruments

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod metrics;

use std::sync::Arc;

/// Application state shared across all handlers
///
/// Cloned for each request. Access tokens are only reachable through
/// `sessions`, keyed by the caller's own session cookie.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// OAuth client for the configured GitHub app
    pub github: Arc<auth::GitHubClient>,

    /// Per-session access token storage
    pub sessions: Arc<auth::SessionStore>,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Errors
    /// Returns error if the GitHub client cannot be built
    pub fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        let github = auth::GitHubClient::new(&config.github)?;
        let sessions =
            auth::SessionStore::new(config.session.secret.clone(), config.session.max_age_seconds);

        tracing::info!(
            client_id = %config.github.client_id,
            redirect_uri = %config.github.redirect_uri,
            "GitHub OAuth client initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            github: Arc::new(github),
            sessions: Arc::new(sessions),
        })
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::{Router, extract::Request};
    use tower_http::trace::TraceLayer;

    let cors_layer = build_cors_layer(&state.config.server);

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .merge(auth::auth_router())
        .merge(api::metrics_router())
        .layer(
            // Path only: the callback query carries the authorization code and state.
            TraceLayer::new_for_http().make_span_with(|request: &Request| {
                tracing::debug_span!(
                    "request",
                    method = %request.method(),
                    path = %request.uri().path()
                )
            }),
        )
        .layer(cors_layer)
        .with_state(state)
}

fn build_cors_layer(server: &config::ServerConfig) -> tower_http::cors::CorsLayer {
    use axum::http::HeaderValue;
    use tower_http::cors::{Any, CorsLayer};

    if !server.protocol.eq_ignore_ascii_case("https") {
        return CorsLayer::permissive();
    }

    let allowed_origin = server.base_url();
    match HeaderValue::from_str(&allowed_origin) {
        Ok(origin) => CorsLayer::new()
            .allow_origin([origin])
            .allow_methods(Any)
            .allow_headers(Any),
        Err(error) => {
            tracing::error!(
                %error,
                origin = %allowed_origin,
                "Failed to parse CORS origin from server base URL; denying cross-origin requests"
            );
            CorsLayer::new().allow_methods(Any).allow_headers(Any)
        }
    }
}

async fn health_check() -> &'static str {
    "OK"
}
