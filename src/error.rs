//! Error types for ghlogin
//!
//! All errors in the application are converted to `AppError`,
//! which implements `IntoResponse` for proper HTTP error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Application-wide error type
///
/// Messages carried by the variants must never include the OAuth client
/// secret or a full access token; they are returned to the browser as-is.
#[derive(Debug, Error)]
pub enum AppError {
    /// Callback reached without an authorization code (400)
    #[error("No code received")]
    MissingCode,

    /// No access token stored for this session (400)
    #[error("No access token found")]
    NotAuthenticated,

    /// Callback `state` does not match the one issued on `/auth` (401)
    #[error("Invalid OAuth state")]
    InvalidState,

    /// Token endpoint rejected the code or returned no token (502)
    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    /// User resource request failed after a token was obtained (500)
    #[error("Error fetching user profile: {0}")]
    ProfileFetch(String),

    /// Configuration error (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl AppError {
    /// Short label used for the `error_type` metric and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::MissingCode => "missing_code",
            AppError::NotAuthenticated => "not_authenticated",
            AppError::InvalidState => "invalid_state",
            AppError::TokenExchange(_) => "token_exchange",
            AppError::ProfileFetch(_) => "profile_fetch",
            AppError::Config(_) => "config",
            AppError::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::MissingCode | AppError::NotAuthenticated => StatusCode::BAD_REQUEST,
            AppError::InvalidState => StatusCode::UNAUTHORIZED,
            AppError::TokenExchange(_) => StatusCode::BAD_GATEWAY,
            AppError::ProfileFetch(_) | AppError::Config(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    /// Convert error to HTTP response
    ///
    /// Maps each error variant to appropriate HTTP status code
    /// and JSON error body.
    fn into_response(self) -> Response {
        use axum::Json;

        let error_message = match &self {
            AppError::Config(msg) => msg.clone(),
            AppError::Internal(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        };

        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, error_type = self.kind(), "Request failed");
        } else {
            tracing::debug!(error = %self, error_type = self.kind(), "Request rejected");
        }

        // Record error metric
        use crate::metrics::ERRORS_TOTAL;
        ERRORS_TOTAL.with_label_values(&[self.kind()]).inc();

        let body = Json(serde_json::json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
