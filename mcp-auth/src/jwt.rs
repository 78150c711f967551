//! JWT expiry extraction
//!
//! The monitor is a client of the token, not its audience, so signatures are
//! not verified here. Only the registered time claims are read to decide when
//! to refresh.

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{DecodingKey, Validation, decode, decode_header};
use serde::Deserialize;

/// Registered time claims (RFC 7519)
#[derive(Debug, Clone, Deserialize)]
pub struct TimeClaims {
    /// Expiration time (exp)
    pub exp: Option<i64>,
    /// Issued at (iat)
    pub iat: Option<i64>,
}

/// Read the time claims of a JWT without verifying its signature
///
/// Returns `None` for opaque (non-JWT) access tokens.
pub fn decode_time_claims(token: &str) -> Option<TimeClaims> {
    let header = decode_header(token).ok()?;

    let mut validation = Validation::new(header.alg);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    decode::<TimeClaims>(token, &DecodingKey::from_secret(&[]), &validation)
        .ok()
        .map(|data| data.claims)
}

/// Expiry of a JWT access token, if it is a JWT and carries `exp`
pub fn token_expiry(token: &str) -> Option<DateTime<Utc>> {
    let exp = decode_time_claims(token)?.exp?;
    Utc.timestamp_opt(exp, 0).single()
}

#[cfg(test)]
#[path = "jwt_tests.rs"]
mod jwt_tests;
