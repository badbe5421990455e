// crates/yggdrasil-core/src/services.rs
// ============================================================================
// Module: Service Catalogue
// Description: Logical names of the backing microservices.
// Purpose: Map each service to its environment key, default URL, and API prefix.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Each Yggdrasil service is reached over REST/JSON under `/api/<service>`.
//! [`ServiceName`] is the only way the harness refers to a service; base URLs
//! are resolved by the configuration crate.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

/// Conventional liveness path probed by health checks.
pub const HEALTH_PATH: &str = "/health";

/// Logical service name.
///
/// # Invariants
/// - Variants are stable for configuration keys and report labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceName {
    /// Registration, login, and session introspection.
    Auth,
    /// User profiles and account administration.
    User,
    /// Courses and enrollment.
    Course,
    /// Calendar events and attendance.
    Planning,
    /// News articles and announcements.
    News,
    /// Dashboards and aggregate statistics.
    Statistics,
    /// User notifications.
    Notification,
}

impl ServiceName {
    /// All services in catalogue order.
    pub const ALL: [Self; 7] = [
        Self::Auth,
        Self::User,
        Self::Course,
        Self::Planning,
        Self::News,
        Self::Statistics,
        Self::Notification,
    ];

    /// Returns the stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::User => "user",
            Self::Course => "course",
            Self::Planning => "planning",
            Self::News => "news",
            Self::Statistics => "statistics",
            Self::Notification => "notification",
        }
    }

    /// Returns the environment variable holding the service base URL.
    #[must_use]
    pub const fn env_key(self) -> &'static str {
        match self {
            Self::Auth => "AUTH_SERVICE_URL",
            Self::User => "USER_SERVICE_URL",
            Self::Course => "COURSE_SERVICE_URL",
            Self::Planning => "PLANNING_SERVICE_URL",
            Self::News => "NEWS_SERVICE_URL",
            Self::Statistics => "STATISTICS_SERVICE_URL",
            Self::Notification => "NOTIFICATION_SERVICE_URL",
        }
    }

    /// Returns the local-development default base URL.
    #[must_use]
    pub const fn default_url(self) -> &'static str {
        match self {
            Self::Auth => "http://localhost:3001",
            Self::User => "http://localhost:3002",
            Self::Course => "http://localhost:3003",
            Self::News => "http://localhost:3004",
            Self::Planning => "http://localhost:3005",
            Self::Statistics => "http://localhost:3006",
            Self::Notification => "http://localhost:3007",
        }
    }

    /// Returns the REST prefix owned by the service.
    #[must_use]
    pub const fn api_prefix(self) -> &'static str {
        match self {
            Self::Auth => "/api/auth",
            Self::User => "/api/users",
            Self::Course => "/api/courses",
            Self::Planning => "/api/planning",
            Self::News => "/api/news",
            Self::Statistics => "/api/statistics",
            Self::Notification => "/api/notifications",
        }
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a service label is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown service: {0}")]
pub struct UnknownService(pub String);

impl FromStr for ServiceName {
    type Err = UnknownService;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|service| service.as_str() == normalized)
            .ok_or(UnknownService(normalized))
    }
}
