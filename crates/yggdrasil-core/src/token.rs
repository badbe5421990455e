// crates/yggdrasil-core/src/token.rs
// ============================================================================
// Module: Token Inspection
// Description: Structural, non-cryptographic inspection of bearer tokens.
// Purpose: Validate fixtures without trusting local decoding for authorization.
// Dependencies: base64, serde_json, time
// ============================================================================

//! ## Overview
//! Bearer tokens are JWT-shaped: three dot-separated base64url segments whose
//! first two decode to JSON objects. Inspection here never verifies the
//! signature. A token that inspects as valid may still be rejected by every
//! service; live authorization is always re-checked over HTTP.

// ============================================================================
// SECTION: Imports
// ============================================================================

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;

use crate::identity::Role;
use crate::identity::UserId;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Claim keys accepted as the token subject, in lookup order.
const SUBJECT_KEYS: [&str; 4] = ["sub", "id", "userId", "_id"];

/// Structural token errors.
///
/// # Invariants
/// - Variants are stable for fixture diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// Token does not have three non-empty segments.
    #[error("malformed token: {0}")]
    Malformed(String),
    /// A segment is not base64url-encoded JSON.
    #[error("token segment encoding error: {0}")]
    Encoding(String),
    /// Payload lacks a subject claim.
    #[error("token payload has no subject")]
    MissingSubject,
}

/// Claims extracted from a token payload.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenClaims {
    /// Subject user identifier.
    pub subject: UserId,
    /// Role claim when present and recognized.
    pub role: Option<Role>,
    /// Expiry as unix seconds.
    pub expires_at: Option<i64>,
    /// Issue time as unix seconds.
    pub issued_at: Option<i64>,
}

impl TokenClaims {
    /// Returns true when the claims have expired at `now` (unix seconds).
    #[must_use]
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }
}

// ============================================================================
// SECTION: Inspection
// ============================================================================

/// Decodes the payload claims of a token without verifying its signature.
///
/// A leading `Bearer ` prefix is tolerated.
///
/// # Errors
///
/// Returns [`TokenError`] when the token is not structurally well-formed.
pub fn decode_claims(token: &str) -> Result<TokenClaims, TokenError> {
    let token = token.trim();
    let token = token.strip_prefix("Bearer ").unwrap_or(token);
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 || segments.iter().any(|segment| segment.is_empty()) {
        return Err(TokenError::Malformed(format!(
            "expected 3 non-empty segments, found {}",
            segments.len()
        )));
    }
    decode_segment(segments[0])?;
    let payload = decode_segment(segments[1])?;

    let subject = SUBJECT_KEYS
        .iter()
        .find_map(|key| match payload.get(*key) {
            Some(Value::String(value)) if !value.is_empty() => Some(value.clone()),
            Some(Value::Number(value)) => Some(value.to_string()),
            _ => None,
        })
        .ok_or(TokenError::MissingSubject)?;
    let role = payload.get("role").and_then(Value::as_str).and_then(|value| value.parse().ok());
    Ok(TokenClaims {
        subject: UserId::new(subject),
        role,
        expires_at: payload.get("exp").and_then(Value::as_i64),
        issued_at: payload.get("iat").and_then(Value::as_i64),
    })
}

/// Returns true when the token is well-formed and unexpired at `now`.
#[must_use]
pub fn is_token_valid_at(token: &str, now: i64) -> bool {
    decode_claims(token).is_ok_and(|claims| !claims.is_expired_at(now))
}

/// Returns true when the token is well-formed and unexpired now.
#[must_use]
pub fn is_token_valid(token: &str) -> bool {
    is_token_valid_at(token, OffsetDateTime::now_utc().unix_timestamp())
}

/// Returns the role claim of a well-formed token.
#[must_use]
pub fn role_from_token(token: &str) -> Option<Role> {
    decode_claims(token).ok().and_then(|claims| claims.role)
}

/// Builds a JWT-shaped token from claims and an opaque signature segment.
///
/// Used by stubs and fixtures; the result carries no cryptographic guarantee.
///
/// # Errors
///
/// Returns [`TokenError::Encoding`] when the claims cannot be serialized.
pub fn encode_token(claims: &Value, signature: &str) -> Result<String, TokenError> {
    let header = serde_json::json!({ "alg": "HS256", "typ": "JWT" });
    let header = serde_json::to_vec(&header).map_err(|err| TokenError::Encoding(err.to_string()))?;
    let payload = serde_json::to_vec(claims).map_err(|err| TokenError::Encoding(err.to_string()))?;
    Ok(format!(
        "{}.{}.{}",
        URL_SAFE_NO_PAD.encode(header),
        URL_SAFE_NO_PAD.encode(payload),
        URL_SAFE_NO_PAD.encode(signature.as_bytes())
    ))
}

fn decode_segment(segment: &str) -> Result<Map<String, Value>, TokenError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|err| TokenError::Encoding(err.to_string()))?;
    match serde_json::from_slice(&bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(TokenError::Encoding("segment is not a json object".to_string())),
        Err(err) => Err(TokenError::Encoding(err.to_string())),
    }
}
