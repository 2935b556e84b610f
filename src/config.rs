//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration files (config/default.toml, config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::{fmt, net::IpAddr};

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub github: GitHubConfig,
    pub auth: AuthConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 3000)
    pub port: u16,
    /// Public domain (e.g., "login.example.com")
    pub domain: String,
    /// Protocol ("http" or "https")
    pub protocol: String,
}

impl ServerConfig {
    /// Get the public base URL of the service
    ///
    /// # Returns
    /// Full URL like "https://login.example.com"
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.protocol, self.domain)
    }
}

/// GitHub OAuth application settings
#[derive(Clone, Deserialize)]
pub struct GitHubConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Callback URL registered with the GitHub OAuth app
    pub redirect_uri: String,
    /// Scopes requested on `/auth`
    pub scopes: Vec<String>,
    pub authorize_url: String,
    pub token_url: String,
    /// Base URL of the REST API (`/user` is resolved against it)
    pub api_base_url: String,
    /// Timeout applied to the token exchange and profile fetch
    pub http_timeout_seconds: u64,
}

impl fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"**HIDDEN**")
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .field("authorize_url", &self.authorize_url)
            .field("token_url", &self.token_url)
            .field("api_base_url", &self.api_base_url)
            .field("http_timeout_seconds", &self.http_timeout_seconds)
            .finish()
    }
}

/// Login flow settings
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Require the callback `state` to match the `oauth_state` cookie
    pub verify_state: bool,
}

/// Session settings
#[derive(Clone, Deserialize)]
pub struct SessionConfig {
    /// HMAC key for the session cookie (32+ bytes)
    pub secret: String,
    /// Session lifetime in seconds (default: 86400 = 24h)
    pub max_age_seconds: i64,
    /// How often expired sessions are pruned
    pub prune_interval_seconds: u64,
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("secret", &"**HIDDEN**")
            .field("max_age_seconds", &self.max_age_seconds)
            .field("prune_interval_seconds", &self.prune_interval_seconds)
            .finish()
    }
}

/// Logging configuration
///
/// Read once at startup to build the tracing subscriber. `RUST_LOG`, when
/// set, replaces the filter derived from `level`.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub fn default_filter(&self) -> String {
        format!("ghlogin={},tower_http=debug", self.level.trim())
    }

    pub fn is_json(&self) -> bool {
        self.format.trim().eq_ignore_ascii_case("json")
    }
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (GHLOGIN__*)
    /// 5. `CLIENT_ID`, `CLIENT_SECRET`, `REDIRECT_URI`
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .set_default("server.domain", "localhost")?
            .set_default("server.protocol", "http")?
            .set_default("github.scopes", vec!["user", "read:user"])?
            .set_default(
                "github.authorize_url",
                "https://github.com/login/oauth/authorize",
            )?
            .set_default(
                "github.token_url",
                "https://github.com/login/oauth/access_token",
            )?
            .set_default("github.api_base_url", "https://api.github.com")?
            .set_default("github.http_timeout_seconds", 10)?
            .set_default("auth.verify_state", true)?
            .set_default("session.max_age_seconds", 86400)?
            .set_default("session.prune_interval_seconds", 300)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            // Load from config/default.toml if it exists
            .add_source(File::with_name("config/default").required(false))
            // Load from config/local.toml if it exists (overrides default)
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables (GHLOGIN__*)
            .add_source(
                Environment::with_prefix("GHLOGIN")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("github.scopes")
                    .try_parsing(true),
            )
            // OAuth app variables as commonly named in .env files
            .set_override_option("github.client_id", std::env::var("CLIENT_ID").ok())?
            .set_override_option("github.client_secret", std::env::var("CLIENT_SECRET").ok())?
            .set_override_option("github.redirect_uri", std::env::var("REDIRECT_URI").ok())?
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    pub fn should_use_secure_cookies(&self) -> bool {
        self.server.protocol.eq_ignore_ascii_case("https")
            || !is_local_server_domain(&self.server.domain)
    }

    pub(crate) fn validate(&self) -> Result<(), crate::error::AppError> {
        const MIN_SESSION_SECRET_BYTES: usize = 32;

        if self.github.client_id.trim().is_empty() {
            return Err(crate::error::AppError::Config(
                "github.client_id must not be empty".to_string(),
            ));
        }

        if self.github.client_secret.trim().is_empty() {
            return Err(crate::error::AppError::Config(
                "github.client_secret must not be empty".to_string(),
            ));
        }

        for (key, value) in [
            ("github.redirect_uri", &self.github.redirect_uri),
            ("github.authorize_url", &self.github.authorize_url),
            ("github.token_url", &self.github.token_url),
            ("github.api_base_url", &self.github.api_base_url),
        ] {
            if url::Url::parse(value).is_err() {
                return Err(crate::error::AppError::Config(format!(
                    "{key} must be an absolute URL"
                )));
            }
        }

        if self.github.http_timeout_seconds == 0 {
            return Err(crate::error::AppError::Config(
                "github.http_timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if self.session.secret.as_bytes().len() < MIN_SESSION_SECRET_BYTES {
            return Err(crate::error::AppError::Config(format!(
                "session.secret must be at least {} bytes",
                MIN_SESSION_SECRET_BYTES
            )));
        }

        if self.session.max_age_seconds <= 0 {
            return Err(crate::error::AppError::Config(
                "session.max_age_seconds must be greater than 0".to_string(),
            ));
        }

        let format = self.logging.format.trim();
        if !format.eq_ignore_ascii_case("pretty") && !format.eq_ignore_ascii_case("json") {
            return Err(crate::error::AppError::Config(format!(
                "logging.format must be \"pretty\" or \"json\", got \"{format}\""
            )));
        }

        if self.should_use_secure_cookies()
            && !self.server.protocol.eq_ignore_ascii_case("https")
        {
            return Err(crate::error::AppError::Config(
                "server.protocol must be https for non-local server domains".to_string(),
            ));
        }

        Ok(())
    }
}

fn normalized_server_host(domain: &str) -> String {
    let trimmed = domain.trim();
    let parsed_host = url::Url::parse(&format!("http://{trimmed}"))
        .ok()
        .and_then(|url| url.host_str().map(|host| host.to_string()));
    let host = parsed_host.unwrap_or_else(|| trimmed.to_string());
    host.trim_end_matches('.').to_ascii_lowercase()
}

fn is_local_server_domain(domain: &str) -> bool {
    let host = normalized_server_host(domain);
    if host == "localhost" || host.ends_with(".localhost") {
        return true;
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        return ip.is_loopback() || ip.is_unspecified();
    }

    false
}
