//! Tests for JWT expiry extraction

use super::*;
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::json;

fn signed(claims: serde_json::Value) -> String {
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(b"issuer-only-secret"),
    )
    .unwrap()
}

#[test]
fn test_expiry_read_without_key() {
    let exp = Utc::now().timestamp() + 1800;
    let token = signed(json!({"sub": "monitor", "exp": exp, "aud": "mcp"}));

    let expiry = token_expiry(&token).unwrap();
    assert_eq!(expiry.timestamp(), exp);
}

#[test]
fn test_expired_token_still_decodes() {
    let exp = Utc::now().timestamp() - 60;
    let token = signed(json!({"sub": "monitor", "exp": exp}));
    assert_eq!(token_expiry(&token).map(|t| t.timestamp()), Some(exp));
}

#[test]
fn test_token_without_exp() {
    let token = signed(json!({"sub": "monitor", "iat": 1_700_000_000}));
    let claims = decode_time_claims(&token).unwrap();
    assert_eq!(claims.exp, None);
    assert_eq!(claims.iat, Some(1_700_000_000));
    assert!(token_expiry(&token).is_none());
}

#[test]
fn test_opaque_token() {
    assert!(decode_time_claims("2YotnFZFEjr1zCsicMWpAA").is_none());
    assert!(token_expiry("not.a.jwt").is_none());
}
