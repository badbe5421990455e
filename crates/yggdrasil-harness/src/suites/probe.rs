// crates/yggdrasil-harness/src/suites/probe.rs
// ============================================================================
// Module: Endpoint Probe
// Description: Issue one catalogue request and judge it against an expectation.
// Purpose: Share status classification across every suite.
// Dependencies: serde_json, yggdrasil-core
// ============================================================================

//! ## Overview
//! [`probe`] renders a catalogue endpoint, sends it, and captures what came
//! back as an [`Observation`]. [`Observation::judge`] maps that onto a
//! [`StepOutcome`]:
//! - no reply, malformed 2xx, or gateway errors (502/503/504) are
//!   environment failures, never violations;
//! - a status the expectation does not accept is a violation;
//! - an accepted error status whose body lacks the error envelope is also a
//!   violation, since clients cannot tell it apart from success.

use serde_json::Value;
use yggdrasil_core::Endpoint;
use yggdrasil_core::ErrorEnvelope;
use yggdrasil_core::Expectation;

use crate::client::ApiClient;
use crate::error::ApiError;
use crate::error::HarnessError;
use crate::error::TransportKind;
use crate::report::StepOutcome;

/// Statuses that indicate an unhealthy deployment rather than a decision.
const GATEWAY_STATUSES: [u16; 3] = [502, 503, 504];

/// What a probed endpoint returned.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    /// 2xx with a decodable body.
    Success {
        /// HTTP status.
        status: u16,
        /// Decoded data.
        data: Value,
    },
    /// Non-2xx reply.
    Rejected {
        /// HTTP status.
        status: u16,
        /// Decoded failure envelope.
        envelope: ErrorEnvelope,
    },
    /// 2xx with a body that does not decode.
    Malformed {
        /// HTTP status.
        status: u16,
        /// Decode failure detail.
        message: String,
    },
    /// No reply.
    Unreachable {
        /// Failure class.
        kind: TransportKind,
        /// Transport detail.
        message: String,
    },
}

impl Observation {
    /// Builds an observation from a client result.
    #[must_use]
    pub fn from_result(result: Result<crate::client::ApiResponse, ApiError>) -> Self {
        match result {
            Ok(response) => Self::Success {
                status: response.status,
                data: response.data,
            },
            Err(ApiError::Status(response)) => Self::Rejected {
                status: response.status,
                envelope: response.envelope,
            },
            Err(ApiError::Decode {
                status,
                message,
            }) => Self::Malformed {
                status,
                message,
            },
            Err(ApiError::Transport {
                kind,
                message,
                ..
            }) => Self::Unreachable {
                kind,
                message,
            },
        }
    }

    /// Returns the HTTP status when a reply arrived.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Success {
                status, ..
            }
            | Self::Rejected {
                status, ..
            }
            | Self::Malformed {
                status, ..
            } => Some(*status),
            Self::Unreachable {
                ..
            } => None,
        }
    }

    /// Returns decoded 2xx data.
    #[must_use]
    pub const fn data(&self) -> Option<&Value> {
        match self {
            Self::Success {
                data, ..
            } => Some(data),
            _ => None,
        }
    }

    /// Returns true for a 2xx reply with decodable data.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Judges the observation against `expected` for `endpoint`.
    #[must_use]
    pub fn judge(&self, endpoint: &Endpoint, expected: &Expectation) -> StepOutcome {
        let service = endpoint.service.as_str();
        let status = match self {
            Self::Unreachable {
                kind,
                message,
            } => {
                return StepOutcome::EnvironmentUnavailable {
                    service: service.to_string(),
                    reason: format!("{kind}: {message}"),
                };
            }
            Self::Success {
                status, ..
            }
            | Self::Rejected {
                status, ..
            }
            | Self::Malformed {
                status, ..
            } => *status,
        };
        if GATEWAY_STATUSES.contains(&status) {
            return StepOutcome::EnvironmentUnavailable {
                service: service.to_string(),
                reason: format!("gateway status {status}"),
            };
        }
        if !expected.accepts(status) {
            return StepOutcome::violation(service, endpoint.label(), expected, status);
        }
        match self {
            Self::Rejected {
                envelope, ..
            } if !envelope.conforming => StepOutcome::violation(
                service,
                endpoint.label(),
                format!("{expected} with error envelope"),
                format!("{status} without error envelope"),
            ),
            Self::Malformed {
                message, ..
            } => StepOutcome::EnvironmentUnavailable {
                service: service.to_string(),
                reason: format!("malformed {status} body: {message}"),
            },
            _ => StepOutcome::Pass,
        }
    }
}

/// Renders `endpoint` with `params` and sends it through `client`.
///
/// # Errors
///
/// Returns [`HarnessError::Policy`] when a path parameter is missing.
pub async fn probe(
    client: &ApiClient,
    endpoint: &Endpoint,
    params: &[(&str, &str)],
    body: Option<&Value>,
) -> Result<Observation, HarnessError> {
    let path = endpoint.render(params)?;
    Ok(Observation::from_result(client.request(endpoint.method, &path, body).await))
}

/// Probes and judges in one step.
pub async fn check(
    client: &ApiClient,
    endpoint: &Endpoint,
    params: &[(&str, &str)],
    body: Option<&Value>,
    expected: &Expectation,
) -> (StepOutcome, Option<Observation>) {
    match probe(client, endpoint, params, body).await {
        Ok(observation) => (observation.judge(endpoint, expected), Some(observation)),
        Err(err) => (StepOutcome::from_error(endpoint.service.as_str(), &err), None),
    }
}

/// Reads a resource id from create-reply data (`id` or `_id`).
#[must_use]
pub fn resource_id(data: &Value) -> Option<String> {
    [data.get("id"), data.get("_id")].into_iter().flatten().find_map(|value| match value {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    })
}

/// Returns the items of a listing reply.
///
/// Accepts a bare array or an object holding `items`, `articles`, `events`,
/// or `data` arrays.
#[must_use]
pub fn list_items(data: &Value) -> Vec<&Value> {
    if let Some(items) = data.as_array() {
        return items.iter().collect();
    }
    ["items", "articles", "events", "data"]
        .into_iter()
        .find_map(|key| data.get(key).and_then(Value::as_array))
        .map(|items| items.iter().collect())
        .unwrap_or_default()
}
