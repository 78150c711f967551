//! Authentication manager
//!
//! Produces the headers each outbound probe needs. Token-based variants are
//! cached and refreshed proactively; refreshes for one server are serialized
//! so N concurrent probes cause a single network exchange.

use crate::config::AuthConfig;
use crate::credential::CachedCredential;
use crate::error::AuthError;
use crate::oauth::{ClientCredentialsRequest, request_token};
use crate::oidc;
use crate::store::{CredentialStore, MemoryCredentialStore};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use parking_lot::Mutex;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, RwLock};
use tracing::{debug, info, warn};

/// Headers to attach to a probe request
pub type AuthHeaders = Vec<(String, String)>;

/// Manager tuning
#[derive(Debug, Clone)]
pub struct AuthManagerConfig {
    /// Timeout for discovery and token requests
    pub request_timeout: Duration,
}

impl Default for AuthManagerConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Per-server credential lifecycle
pub struct AuthManager {
    client: Client,
    store: Arc<dyn CredentialStore>,
    /// token endpoint per server, discovered once
    token_endpoints: RwLock<HashMap<String, String>>,
    refresh_locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    refresh_count: AtomicU64,
}

impl AuthManager {
    /// Create a manager backed by the given credential store
    pub fn new(
        config: AuthManagerConfig,
        store: Arc<dyn CredentialStore>,
    ) -> Result<Self, AuthError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AuthError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            store,
            token_endpoints: RwLock::new(HashMap::new()),
            refresh_locks: Mutex::new(HashMap::new()),
            refresh_count: AtomicU64::new(0),
        })
    }

    /// Create a manager with a private in-memory store
    pub fn in_memory() -> Result<Self, AuthError> {
        Self::new(
            AuthManagerConfig::default(),
            Arc::new(MemoryCredentialStore::new()),
        )
    }

    /// Headers for one probe against `server`
    ///
    /// Safe to call concurrently for the same server.
    pub async fn get_auth_headers(
        &self,
        server: &str,
        config: &AuthConfig,
    ) -> Result<AuthHeaders, AuthError> {
        match config {
            AuthConfig::Bearer { token } => Ok(vec![authorization(format!("Bearer {token}"))]),
            AuthConfig::ApiKey { key, header_name } => Ok(vec![(header_name.clone(), key.clone())]),
            AuthConfig::Basic { username, password } => {
                let encoded = STANDARD.encode(format!("{username}:{password}"));
                Ok(vec![authorization(format!("Basic {encoded}"))])
            }
            AuthConfig::CustomHeaders { headers } => Ok(headers
                .iter()
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect()),
            AuthConfig::Jwt { .. } | AuthConfig::OAuth2ClientCredentials { .. } => {
                let credential = self.get_credential(server, config).await?;
                Ok(vec![authorization(credential.authorization_value())])
            }
        }
    }

    /// Return a valid credential, refreshing it when inside the buffer window
    async fn get_credential(
        &self,
        server: &str,
        config: &AuthConfig,
    ) -> Result<CachedCredential, AuthError> {
        let buffer = config.refresh_buffer();

        if let Some(credential) = self.store.get(server) {
            if !credential.needs_refresh(buffer, Utc::now()) {
                return Ok(credential);
            }
        }

        let lock = self.refresh_lock(server);
        let _guard = lock.lock().await;

        // Another caller may have refreshed while we waited
        if let Some(credential) = self.store.get(server) {
            if !credential.needs_refresh(buffer, Utc::now()) {
                return Ok(credential);
            }
        }

        match self.refresh(server, config).await {
            Ok(credential) => {
                self.store.put(server, credential.clone());
                Ok(credential)
            }
            Err(e) => {
                self.store.remove(server);
                warn!(server = %server, auth = config.kind(), error = %e, "Credential refresh failed");
                Err(e)
            }
        }
    }

    async fn refresh(&self, server: &str, config: &AuthConfig) -> Result<CachedCredential, AuthError> {
        let credential = match config {
            AuthConfig::Jwt {
                discovery_url,
                client_id,
                client_secret,
                scopes,
                audience,
                ..
            } => {
                let token_url = self.token_endpoint(server, discovery_url).await?;
                request_token(
                    &self.client,
                    ClientCredentialsRequest {
                        token_url: &token_url,
                        client_id,
                        client_secret,
                        scopes,
                        audience: audience.as_deref(),
                    },
                )
                .await?
            }
            AuthConfig::OAuth2ClientCredentials {
                token_url,
                client_id,
                client_secret,
                scopes,
                ..
            } => {
                request_token(
                    &self.client,
                    ClientCredentialsRequest {
                        token_url,
                        client_id,
                        client_secret,
                        scopes,
                        audience: None,
                    },
                )
                .await?
            }
            other => {
                return Err(AuthError::invalid_config(format!(
                    "{} credentials are not refreshable",
                    other.kind()
                )));
            }
        };

        self.refresh_count.fetch_add(1, Ordering::Relaxed);
        info!(
            server = %server,
            auth = config.kind(),
            expires_at = %credential.expires_at,
            "Refreshed probe credential"
        );
        Ok(credential)
    }

    async fn token_endpoint(&self, server: &str, discovery_url: &str) -> Result<String, AuthError> {
        if let Some(endpoint) = self.token_endpoints.read().await.get(server) {
            return Ok(endpoint.clone());
        }

        let metadata = oidc::discover(&self.client, discovery_url).await?;
        debug!(server = %server, issuer = ?metadata.issuer, "Discovered token endpoint");

        self.token_endpoints
            .write()
            .await
            .insert(server.to_string(), metadata.token_endpoint.clone());
        Ok(metadata.token_endpoint)
    }

    fn refresh_lock(&self, server: &str) -> Arc<AsyncMutex<()>> {
        self.refresh_locks
            .lock()
            .entry(server.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Discard the cached credential, e.g. after a 401/403 response
    pub fn invalidate(&self, server: &str) {
        debug!(server = %server, "Invalidating cached credential");
        self.store.remove(server);
    }

    /// Drop all state held for a server removed from the configuration
    pub async fn forget_server(&self, server: &str) {
        self.store.remove(server);
        self.token_endpoints.write().await.remove(server);
        self.refresh_locks.lock().remove(server);
    }

    /// Number of token refreshes performed against identity providers
    pub fn refresh_count(&self) -> u64 {
        self.refresh_count.load(Ordering::Relaxed)
    }

    /// Currently cached credential for a server, if any
    pub fn cached_credential(&self, server: &str) -> Option<CachedCredential> {
        self.store.get(server)
    }
}

fn authorization(value: String) -> (String, String) {
    ("Authorization".to_string(), value)
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod manager_tests;
