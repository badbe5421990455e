// crates/yggdrasil-harness/src/error.rs
// ============================================================================
// Module: Harness Errors
// Description: Client-boundary and harness-level error types.
// Purpose: Classify every failure into the harness failure taxonomy.
// Dependencies: thiserror, yggdrasil-core, yggdrasil-config
// ============================================================================

//! ## Overview
//! [`ApiError`] is the single error type returned by [`crate::ApiClient`]:
//! either the server never replied ([`ApiError::Transport`]), replied with a
//! non-2xx status ([`ApiError::Status`]), or replied 2xx with a body that does
//! not decode ([`ApiError::Decode`]). [`HarnessError`] wraps everything a
//! scenario can hit and maps it onto a [`FailureCategory`].

use std::fmt;

use serde::Serialize;
use thiserror::Error;
use yggdrasil_config::ConfigError;
use yggdrasil_core::ErrorEnvelope;
use yggdrasil_core::FactoryError;
use yggdrasil_core::PolicyError;
use yggdrasil_core::TokenError;

use crate::store::StoreError;

// ============================================================================
// SECTION: Client Errors
// ============================================================================

/// Class of transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Connection could not be established.
    Connect,
    /// Request exceeded its timeout.
    Timeout,
    /// Any other failure before a response arrived.
    Other,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connect => "connect",
            Self::Timeout => "timeout",
            Self::Other => "other",
        })
    }
}

/// Non-2xx server reply.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorResponse {
    /// HTTP status code.
    pub status: u16,
    /// Decoded failure envelope.
    pub envelope: ErrorEnvelope,
}

/// Errors returned by [`crate::ApiClient`] requests.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
    /// No server reply.
    #[error("{service} unreachable ({kind}): {message}")]
    Transport {
        /// Client label (usually the service name).
        service: String,
        /// Failure class.
        kind: TransportKind,
        /// Transport error detail.
        message: String,
    },
    /// Server replied with a non-2xx status.
    #[error("http {}: {}", .0.status, .0.envelope.message)]
    Status(ErrorResponse),
    /// Server replied 2xx with an undecodable body.
    #[error("http {status} with malformed body: {message}")]
    Decode {
        /// HTTP status code.
        status: u16,
        /// Decoding failure detail.
        message: String,
    },
}

impl ApiError {
    /// Returns the server reply when one arrived with a non-2xx status.
    #[must_use]
    pub const fn response(&self) -> Option<&ErrorResponse> {
        match self {
            Self::Status(response) => Some(response),
            Self::Transport { .. } | Self::Decode { .. } => None,
        }
    }

    /// Returns the HTTP status when the server replied.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status(response) => Some(response.status),
            Self::Decode { status, .. } => Some(*status),
            Self::Transport { .. } => None,
        }
    }

    /// Returns true when no server reply arrived.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

// ============================================================================
// SECTION: Harness Errors
// ============================================================================

/// Failure taxonomy used for reporting and exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    /// Security expectation violated.
    Assertion,
    /// Fixture setup failed before the scenario could start.
    Fixture,
    /// Service or datastore unreachable.
    Transport,
    /// Teardown failed.
    Cleanup,
    /// Configuration invalid.
    Config,
}

/// Errors raised while preparing or running scenarios.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Configuration failed to resolve.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Payload generation failed.
    #[error(transparent)]
    Factory(#[from] FactoryError),
    /// A path template could not be rendered.
    #[error(transparent)]
    Policy(#[from] PolicyError),
    /// A token did not inspect as well-formed.
    #[error(transparent)]
    Token(#[from] TokenError),
    /// An HTTP call failed during fixture work.
    #[error("{context}: {source}")]
    Api {
        /// What the harness was doing.
        context: String,
        /// Underlying client error.
        #[source]
        source: ApiError,
    },
    /// Datastore side-channel failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Fixture response was missing required data.
    #[error("fixture error: {0}")]
    Fixture(String),
    /// Services did not become ready in time.
    #[error("services unavailable: {}", .0.join(", "))]
    Unavailable(Vec<String>),
    /// Teardown failed.
    #[error("cleanup error: {0}")]
    Cleanup(String),
}

impl HarnessError {
    /// Wraps a client error with context.
    pub fn api(context: impl Into<String>, source: ApiError) -> Self {
        Self::Api {
            context: context.into(),
            source,
        }
    }

    /// Returns the failure category.
    #[must_use]
    pub fn category(&self) -> FailureCategory {
        match self {
            Self::Config(_) => FailureCategory::Config,
            Self::Api { source, .. } if source.is_transport() => FailureCategory::Transport,
            Self::Store(err) if err.is_unavailable() => FailureCategory::Transport,
            Self::Unavailable(_) => FailureCategory::Transport,
            Self::Cleanup(_) => FailureCategory::Cleanup,
            Self::Factory(_)
            | Self::Policy(_)
            | Self::Token(_)
            | Self::Api { .. }
            | Self::Store(_)
            | Self::Fixture(_) => FailureCategory::Fixture,
        }
    }
}
