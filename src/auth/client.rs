//! GitHub OAuth client
//!
//! Performs the two outbound calls of the authorization code flow:
//! exchanging the code at the token endpoint, then reading `/user`
//! with the resulting bearer token. Nothing here is retried.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use super::token::{AccessToken, AuthorizationCode, OAuthState, mask_secret};
use crate::config::GitHubConfig;
use crate::error::AppError;
use crate::metrics::{
    OAUTH_TOKEN_EXCHANGES_TOTAL, PROFILE_FETCHES_TOTAL, UPSTREAM_REQUEST_DURATION_SECONDS,
};

const USER_AGENT: &str = concat!("ghlogin/", env!("CARGO_PKG_VERSION"));
const GITHUB_API_VERSION: &str = "2022-11-28";

/// Parameters of the redirect to the provider's authorization page
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub client_id: String,
    pub scopes: Vec<String>,
    pub redirect_uri: String,
    pub state: Option<OAuthState>,
}

/// Token endpoint response
///
/// GitHub answers failed exchanges with `200 OK` and an `error` field,
/// so every field is optional here.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    token_type: Option<String>,
    scope: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Authenticated user as returned by `GET /user`
///
/// Kept as the raw JSON document so `/profile` can return it unchanged.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct UserProfile(serde_json::Value);

impl UserProfile {
    pub fn login(&self) -> Option<&str> {
        self.0.get("login").and_then(serde_json::Value::as_str)
    }

    pub fn id(&self) -> Option<u64> {
        self.0.get("id").and_then(serde_json::Value::as_u64)
    }

    pub fn name(&self) -> Option<&str> {
        self.0.get("name").and_then(serde_json::Value::as_str)
    }

    pub fn as_json(&self) -> &serde_json::Value {
        &self.0
    }
}

/// OAuth code exchanger for a single GitHub OAuth app
#[derive(Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    scopes: Vec<String>,
    authorize_url: Url,
    token_url: Url,
    user_url: Url,
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("client_id", &self.client_id)
            .field("redirect_uri", &self.redirect_uri)
            .field("token_url", &self.token_url.as_str())
            .field("user_url", &self.user_url.as_str())
            .finish_non_exhaustive()
    }
}

impl GitHubClient {
    /// Build a client from configuration
    ///
    /// # Errors
    /// Returns `Config` if an endpoint URL is invalid, `Internal` if the
    /// HTTP client cannot be built
    pub fn new(config: &GitHubConfig) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.http_timeout_seconds))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| AppError::Internal(e.into()))?;

        let user_url = format!("{}/user", config.api_base_url.trim_end_matches('/'));

        Ok(Self {
            http,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
            scopes: config.scopes.clone(),
            authorize_url: parse_endpoint("github.authorize_url", &config.authorize_url)?,
            token_url: parse_endpoint("github.token_url", &config.token_url)?,
            user_url: parse_endpoint("github.api_base_url", &user_url)?,
        })
    }

    /// Authorization request for the configured client and scopes
    pub fn authorization_request(&self, state: Option<OAuthState>) -> AuthorizationRequest {
        AuthorizationRequest {
            client_id: self.client_id.clone(),
            scopes: self.scopes.clone(),
            redirect_uri: self.redirect_uri.clone(),
            state,
        }
    }

    /// Provider URL the browser is redirected to on `/auth`
    pub fn authorize_url(&self, request: &AuthorizationRequest) -> Url {
        let mut url = self.authorize_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &request.client_id)
                .append_pair("redirect_uri", &request.redirect_uri);
            if !request.scopes.is_empty() {
                query.append_pair("scope", &request.scopes.join(" "));
            }
            if let Some(state) = &request.state {
                query.append_pair("state", state.as_str());
            }
        }
        url
    }

    /// Exchange an authorization code for an access token
    ///
    /// Exactly one POST is sent per call. A code that was already used is
    /// still sent to the provider, which is expected to reject it.
    ///
    /// # Errors
    /// `TokenExchange` on transport failure, non-success status, an
    /// `error` response or a response without `access_token`
    pub async fn exchange_code(&self, code: &AuthorizationCode) -> Result<AccessToken, AppError> {
        let result = self.request_token(code).await;
        let outcome = if result.is_ok() { "success" } else { "failure" };
        OAUTH_TOKEN_EXCHANGES_TOTAL
            .with_label_values(&[outcome])
            .inc();
        result
    }

    async fn request_token(&self, code: &AuthorizationCode) -> Result<AccessToken, AppError> {
        tracing::info!(
            token_url = %self.token_url,
            client_id = %self.client_id,
            code = %code,
            "Exchanging authorization code"
        );

        let form = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("code", code.expose()),
            ("redirect_uri", self.redirect_uri.as_str()),
        ];

        let timer = UPSTREAM_REQUEST_DURATION_SECONDS
            .with_label_values(&["token"])
            .start_timer();
        let response = self
            .http
            .post(self.token_url.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                AppError::TokenExchange(format!("token request failed: {}", e.without_url()))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            AppError::TokenExchange(format!("token response read failed: {}", e.without_url()))
        })?;
        timer.observe_duration();

        if !status.is_success() {
            return Err(AppError::TokenExchange(format!(
                "token endpoint returned status {}",
                status.as_u16()
            )));
        }

        let parsed: TokenResponse = serde_json::from_str(&body).map_err(|_| {
            AppError::TokenExchange("token endpoint returned an unreadable body".to_string())
        })?;

        if let Some(error) = parsed.error {
            let detail = parsed
                .error_description
                .map(|description| format!("{error}: {description}"))
                .unwrap_or(error);
            return Err(AppError::TokenExchange(detail));
        }

        let access_token = parsed
            .access_token
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
            .ok_or_else(|| AppError::TokenExchange("access token not received".to_string()))?;

        tracing::info!(
            access_token = %mask_secret(&access_token),
            token_type = parsed.token_type.as_deref().unwrap_or("unknown"),
            scope = parsed.scope.as_deref().unwrap_or(""),
            "Authorization code exchanged"
        );

        Ok(AccessToken::new(access_token))
    }

    /// Fetch the authenticated user's profile
    ///
    /// # Errors
    /// `ProfileFetch` on transport failure, non-success status or a body
    /// that is not JSON
    pub async fn fetch_profile(&self, token: &AccessToken) -> Result<UserProfile, AppError> {
        let result = self.request_profile(token).await;
        let outcome = if result.is_ok() { "success" } else { "failure" };
        PROFILE_FETCHES_TOTAL.with_label_values(&[outcome]).inc();
        result
    }

    async fn request_profile(&self, token: &AccessToken) -> Result<UserProfile, AppError> {
        let timer = UPSTREAM_REQUEST_DURATION_SECONDS
            .with_label_values(&["user"])
            .start_timer();
        let response = self
            .http
            .get(self.user_url.clone())
            .bearer_auth(token.expose())
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION)
            .send()
            .await
            .map_err(|e| {
                AppError::ProfileFetch(format!("user request failed: {}", e.without_url()))
            })?;

        let status = response.status();
        if !status.is_success() {
            timer.observe_duration();
            tracing::warn!(
                status = status.as_u16(),
                access_token = %token,
                "GitHub rejected profile request"
            );
            return Err(AppError::ProfileFetch(format!(
                "GitHub returned status {}",
                status.as_u16()
            )));
        }

        let profile: serde_json::Value = response.json().await.map_err(|e| {
            AppError::ProfileFetch(format!("unreadable user response: {}", e.without_url()))
        })?;
        timer.observe_duration();

        let profile = UserProfile(profile);
        tracing::debug!(
            login = profile.login().unwrap_or("unknown"),
            name = profile.name().unwrap_or(""),
            id = profile.id(),
            "Fetched GitHub profile"
        );
        Ok(profile)
    }
}

fn parse_endpoint(key: &str, value: &str) -> Result<Url, AppError> {
    Url::parse(value).map_err(|e| AppError::Config(format!("{key} is not a valid URL: {e}")))
}
