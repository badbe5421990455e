// crates/yggdrasil-core/src/envelope.rs
// ============================================================================
// Module: Response Envelope
// Description: Decoding of the platform's success/failure response envelope.
// Purpose: Turn raw HTTP status and body into one tagged outcome.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Services answer with `{success: true, data}` on success and
//! `{success: false, error}` (or any `error`-bearing object) on failure. The
//! envelope is decoded exactly once, at the transport boundary, into
//! [`Envelope::Success`] or [`Envelope::Failure`]. Failure bodies that do not
//! honor the wire contract are still decoded but flagged as non-conforming.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Maximum characters of a raw non-JSON body kept in an error message.
const MAX_RAW_MESSAGE_CHARS: usize = 256;

/// Decoded response envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// 2xx response; holds `data` when enveloped, else the whole body.
    Success(Value),
    /// Non-2xx response.
    Failure(ErrorEnvelope),
}

/// Failure payload decoded from an error response.
///
/// # Invariants
/// - `conforming` is true only when the body carried `error` or `success: false`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorEnvelope {
    /// Human-readable error message.
    pub message: String,
    /// Machine-readable error code when the service supplied one.
    pub code: Option<String>,
    /// Whether the body honored the error envelope contract.
    pub conforming: bool,
    /// Raw decoded body (`Null` for empty or non-JSON bodies).
    pub body: Value,
}

/// Envelope decoding errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    /// A 2xx body was present but not JSON.
    #[error("malformed success body: {0}")]
    Malformed(String),
    /// A 2xx body declared `success: false`.
    #[error("success status {status} carried a failure envelope: {message}")]
    Contradictory {
        /// HTTP status code.
        status: u16,
        /// Error message from the body.
        message: String,
    },
}

/// Returns true when `status` is in the 2xx range.
#[must_use]
pub const fn is_success(status: u16) -> bool {
    status >= 200 && status < 300
}

/// Decodes a response body into an [`Envelope`].
///
/// # Errors
///
/// Returns [`EnvelopeError`] when a 2xx body is malformed or self-contradictory.
pub fn decode_envelope(status: u16, body: &[u8]) -> Result<Envelope, EnvelopeError> {
    let trimmed = body.trim_ascii();
    let parsed: Option<Value> = if trimmed.is_empty() {
        Some(Value::Null)
    } else {
        serde_json::from_slice(trimmed).ok()
    };

    if is_success(status) {
        let value = parsed.ok_or_else(|| {
            EnvelopeError::Malformed(truncate(&String::from_utf8_lossy(trimmed)))
        })?;
        if value.get("success") == Some(&Value::Bool(false)) {
            return Err(EnvelopeError::Contradictory {
                status,
                message: error_message(&value).unwrap_or_else(|| "unspecified".to_string()),
            });
        }
        return Ok(Envelope::Success(unwrap_data(value)));
    }

    let Some(value) = parsed else {
        return Ok(Envelope::Failure(ErrorEnvelope {
            message: truncate(&String::from_utf8_lossy(trimmed)),
            code: None,
            conforming: false,
            body: Value::Null,
        }));
    };
    let conforming =
        value.get("error").is_some() || value.get("success") == Some(&Value::Bool(false));
    let message = error_message(&value).unwrap_or_else(|| format!("http status {status}"));
    let code = value
        .get("code")
        .or_else(|| value.get("error").and_then(|error| error.get("code")))
        .and_then(|code| match code {
            Value::String(code) => Some(code.clone()),
            Value::Number(code) => Some(code.to_string()),
            _ => None,
        });
    Ok(Envelope::Failure(ErrorEnvelope {
        message,
        code,
        conforming,
        body: value,
    }))
}

fn unwrap_data(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.get("success") == Some(&Value::Bool(true)) => {
            map.remove("data").unwrap_or(Value::Object(map))
        }
        other => other,
    }
}

fn error_message(value: &Value) -> Option<String> {
    match value.get("error") {
        Some(Value::String(message)) => return Some(message.clone()),
        Some(Value::Object(error)) => {
            if let Some(Value::String(message)) = error.get("message") {
                return Some(message.clone());
            }
        }
        _ => {}
    }
    value.get("message").and_then(Value::as_str).map(str::to_string)
}

fn truncate(raw: &str) -> String {
    raw.chars().take(MAX_RAW_MESSAGE_CHARS).collect()
}
