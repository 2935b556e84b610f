//! Common test utilities for E2E tests

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    Form, Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use ghlogin::{AppState, config};
use serde::Deserialize;
use tokio::net::TcpListener;

pub const CLIENT_ID: &str = "test-client-id";
pub const CLIENT_SECRET: &str = "test-client-secret";
pub const REDIRECT_URI: &str = "http://localhost:3000/auth/callback";

/// Stand-in for github.com and api.github.com
///
/// Token endpoint: code `code-<token>` is exchanged for access token
/// `<token>`, each code only once. `code-missing-token` yields a response
/// without `access_token`, `code-server-error` a 500.
///
/// User endpoint: token `revoked` gets 401, any other token gets
/// [`FakeGitHub::user_json`].
#[derive(Default)]
pub struct FakeGitHub {
    token_requests: AtomicUsize,
    user_requests: AtomicUsize,
    used_codes: Mutex<HashSet<String>>,
    last_code: Mutex<Option<String>>,
}

impl FakeGitHub {
    pub fn token_requests(&self) -> usize {
        self.token_requests.load(Ordering::SeqCst)
    }

    pub fn user_requests(&self) -> usize {
        self.user_requests.load(Ordering::SeqCst)
    }

    /// Code received by the most recent token request, as sent
    pub fn last_code(&self) -> Option<String> {
        self.last_code.lock().expect("last code lock").clone()
    }

    pub fn user_json(token: &str) -> serde_json::Value {
        serde_json::json!({
            "login": format!("user-{token}"),
            "id": 583231,
            "name": "The Octocat",
            "public_repos": 8,
            "plan": { "name": "free", "space": 976562499 }
        })
    }
}

#[derive(Debug, Deserialize)]
struct TokenForm {
    client_id: String,
    client_secret: String,
    code: String,
    redirect_uri: Option<String>,
}

async fn fake_token_endpoint(
    State(fake): State<Arc<FakeGitHub>>,
    headers: HeaderMap,
    Form(form): Form<TokenForm>,
) -> Response {
    fake.token_requests.fetch_add(1, Ordering::SeqCst);
    *fake.last_code.lock().expect("last code lock") = Some(form.code.clone());

    let accepts_json = headers
        .get("accept")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("application/json"));
    if !accepts_json {
        return (StatusCode::NOT_ACCEPTABLE, "expected Accept: application/json").into_response();
    }

    if form.client_id != CLIENT_ID || form.client_secret != CLIENT_SECRET {
        return Json(serde_json::json!({
            "error": "incorrect_client_credentials",
            "error_description": "The client_id and/or client_secret passed are incorrect."
        }))
        .into_response();
    }
    assert_eq!(form.redirect_uri.as_deref(), Some(REDIRECT_URI));

    let first_use = fake
        .used_codes
        .lock()
        .expect("used codes lock")
        .insert(form.code.clone());
    if !first_use {
        return Json(serde_json::json!({
            "error": "bad_verification_code",
            "error_description": "The code passed is incorrect or expired."
        }))
        .into_response();
    }

    match form.code.as_str() {
        "code-server-error" => (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response(),
        "code-missing-token" => Json(serde_json::json!({
            "token_type": "bearer",
            "scope": "user"
        }))
        .into_response(),
        code => match code.strip_prefix("code-") {
            Some(token) => Json(serde_json::json!({
                "access_token": token,
                "token_type": "bearer",
                "scope": "read:user,user"
            }))
            .into_response(),
            None => Json(serde_json::json!({
                "error": "bad_verification_code",
                "error_description": "The code passed is incorrect or expired."
            }))
            .into_response(),
        },
    }
}

async fn fake_user_endpoint(State(fake): State<Arc<FakeGitHub>>, headers: HeaderMap) -> Response {
    fake.user_requests.fetch_add(1, Ordering::SeqCst);

    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match token {
        Some(token) if token != "revoked" => Json(FakeGitHub::user_json(token)).into_response(),
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "message": "Bad credentials" })),
        )
            .into_response(),
    }
}

/// Start the fake provider on a random port
pub async fn spawn_fake_github() -> (String, Arc<FakeGitHub>) {
    let fake = Arc::new(FakeGitHub::default());
    let app = Router::new()
        .route("/login/oauth/access_token", post(fake_token_endpoint))
        .route("/api/user", get(fake_user_endpoint))
        .with_state(fake.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, fake)
}

/// Configuration pointing at a fake provider
pub fn test_config(github_base: &str) -> config::AppConfig {
    config::AppConfig {
        server: config::ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0, // Let OS assign port
            domain: "localhost".to_string(),
            protocol: "http".to_string(),
        },
        github: config::GitHubConfig {
            client_id: CLIENT_ID.to_string(),
            client_secret: CLIENT_SECRET.to_string(),
            redirect_uri: REDIRECT_URI.to_string(),
            scopes: vec!["user".to_string(), "read:user".to_string()],
            authorize_url: "https://github.com/login/oauth/authorize".to_string(),
            token_url: format!("{github_base}/login/oauth/access_token"),
            api_base_url: format!("{github_base}/api"),
            http_timeout_seconds: 5,
        },
        auth: config::AuthConfig { verify_state: true },
        session: config::SessionConfig {
            secret: "test-session-secret-32-bytes-long!".to_string(),
            max_age_seconds: 3600,
            prune_interval_seconds: 300,
        },
        logging: config::LoggingConfig {
            level: "info".to_string(),
            format: "pretty".to_string(),
        },
    }
}

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub github: Arc<FakeGitHub>,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Create a new test server instance
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server after adjusting the default test configuration
    pub async fn with_config(adjust: impl FnOnce(&mut config::AppConfig)) -> Self {
        let (github_base, github) = spawn_fake_github().await;
        let mut config = test_config(&github_base);
        adjust(&mut config);

        // Initialize app state
        let state = AppState::new(config).unwrap();

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let addr_str = format!("http://{}", addr);

        let app = ghlogin::build_router(state.clone());

        // Spawn server in background
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr: addr_str,
            state,
            github,
            client: no_redirect_client(),
        }
    }

    /// Get base URL for requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// Start a login on `/auth`
    ///
    /// # Returns
    /// (`state` sent to GitHub, `oauth_state` cookie value)
    pub async fn begin_login(&self) -> (String, String) {
        let response = self.client.get(self.url("/auth")).send().await.unwrap();
        assert!(response.status().is_redirection());

        let location = location(&response);
        let url = url::Url::parse(&location).expect("absolute authorize url");
        let state = url
            .query_pairs()
            .find(|(key, _)| key == "state")
            .map(|(_, value)| value.into_owned())
            .expect("state parameter");
        let cookie = cookie_value(&response, "oauth_state").expect("oauth_state cookie");

        (state, cookie)
    }

    /// Run the callback for `code` with a valid state
    pub async fn callback(&self, code: &str) -> reqwest::Response {
        let (state, cookie) = self.begin_login().await;
        self.client
            .get(self.url("/auth/callback"))
            .query(&[("code", code), ("state", state.as_str())])
            .header("Cookie", format!("oauth_state={cookie}"))
            .send()
            .await
            .unwrap()
    }

    /// Complete a login and return the `session` cookie value
    pub async fn login(&self, code: &str) -> String {
        let response = self.callback(code).await;
        assert!(response.status().is_redirection());
        assert_eq!(location(&response), "/profile");
        cookie_value(&response, "session").expect("session cookie")
    }

    pub async fn get_with_session(&self, path: &str, session: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .header("Cookie", format!("session={session}"))
            .send()
            .await
            .unwrap()
    }
}

pub fn no_redirect_client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(std::time::Duration::from_secs(10))
        .build()
        .expect("failed to build no-redirect client")
}

pub fn location(response: &reqwest::Response) -> String {
    response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .expect("location header")
        .to_string()
}

/// Value of a non-empty `Set-Cookie` for `name`
pub fn cookie_value(response: &reqwest::Response, name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.strip_prefix(prefix.as_str()))
        .map(|rest| rest.split(';').next().unwrap_or_default().to_string())
        .find(|value| !value.is_empty())
}
