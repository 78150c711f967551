//! Cached credentials derived from token-based auth configs

use chrono::{DateTime, Duration, Utc};
use std::fmt;

/// Lifetime assumed for tokens that carry neither `exp` nor `expires_in`
pub const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// A bearer token obtained from a token endpoint
#[derive(Clone, PartialEq)]
pub struct CachedCredential {
    pub access_token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
    pub scopes: Vec<String>,
}

impl CachedCredential {
    pub fn new(access_token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: "Bearer".to_string(),
            expires_at,
            scopes: Vec::new(),
        }
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn with_token_type(mut self, token_type: impl Into<String>) -> Self {
        self.token_type = token_type.into();
        self
    }

    /// True once `now` is within `buffer` of expiry
    pub fn needs_refresh(&self, buffer: Duration, now: DateTime<Utc>) -> bool {
        now.checked_add_signed(buffer)
            .is_none_or(|deadline| deadline >= self.expires_at)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Value for the `Authorization` header
    ///
    /// Token endpoints commonly answer `"token_type": "bearer"`; the scheme is
    /// normalized so servers with case-sensitive checks accept it.
    pub fn authorization_value(&self) -> String {
        let scheme = if self.token_type.eq_ignore_ascii_case("bearer") {
            "Bearer"
        } else {
            self.token_type.as_str()
        };
        format!("{} {}", scheme, self.access_token)
    }
}

impl fmt::Debug for CachedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedCredential")
            .field("access_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field("scopes", &self.scopes)
            .finish()
    }
}
