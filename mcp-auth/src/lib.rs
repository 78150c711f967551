//! # Probe authentication for the MCP health monitor
//!
//! Every outbound probe asks the [`AuthManager`] for the headers it must
//! attach. Static variants (bearer, API key, basic, custom headers) are
//! rendered directly. Token variants (JWT via OIDC discovery, OAuth2 client
//! credentials) are cached per server and refreshed shortly before expiry.
//!
//! ```rust,no_run
//! use mcp_health_auth::{AuthConfig, AuthManager};
//!
//! # async fn example() -> Result<(), mcp_health_auth::AuthError> {
//! let manager = AuthManager::in_memory()?;
//! let config = AuthConfig::OAuth2ClientCredentials {
//!     token_url: "https://idp.example.com/oauth/token".to_string(),
//!     client_id: "monitor".to_string(),
//!     client_secret: "secret".to_string(),
//!     scopes: vec!["mcp.read".to_string()],
//!     refresh_buffer_secs: 300,
//! };
//!
//! let headers = manager.get_auth_headers("search-server", &config).await?;
//! # let _ = headers;
//! # Ok(())
//! # }
//! ```
//!
//! Failures are reported as [`AuthError`] so callers can tell invalid
//! credentials apart from an unreachable server.

pub mod config;
pub mod credential;
pub mod error;
pub mod jwt;
pub mod manager;
pub mod oauth;
pub mod oidc;
pub mod store;

pub use config::{
    AuthConfig, DEFAULT_API_KEY_HEADER, DEFAULT_REFRESH_BUFFER_SECS, MAX_REFRESH_BUFFER_SECS,
};
pub use credential::CachedCredential;
pub use error::AuthError;
pub use manager::{AuthHeaders, AuthManager, AuthManagerConfig};
pub use store::{CredentialStore, MemoryCredentialStore};
