//! GitHub OAuth authentication
//!
//! Handles:
//! - The authorization code flow against GitHub
//! - Per-session access token storage
//! - Session extractors

pub mod client;
mod middleware;
mod oauth;
pub mod session;
pub mod token;

pub use client::{AuthorizationRequest, GitHubClient, UserProfile};
pub use middleware::{CurrentSession, MaybeSession};
pub use oauth::auth_router;
pub use session::{Session, SessionStore};
pub use token::{AccessToken, AuthorizationCode, OAuthState};
