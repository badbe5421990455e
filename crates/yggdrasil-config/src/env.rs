// crates/yggdrasil-config/src/env.rs
// ============================================================================
// Module: Harness Environment
// Description: Environment keys and strict value parsers for the harness.
// Purpose: Centralize env parsing with strict UTF-8 validation.
// Dependencies: url, yggdrasil-core
// ============================================================================

//! ## Overview
//! Environment values are parsed with strict UTF-8 enforcement to avoid silent
//! misconfiguration. Invalid UTF-8, empty values, and unparseable literals fail
//! closed. The same parsers are applied to TOML file values, which are
//! normalized to strings before parsing.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use url::Url;
use yggdrasil_core::ServiceName;

// ============================================================================
// SECTION: Environment Keys
// ============================================================================

/// Environment keys consumed by the harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HarnessEnv {
    /// Auth service base URL.
    AuthServiceUrl,
    /// User service base URL.
    UserServiceUrl,
    /// Course service base URL.
    CourseServiceUrl,
    /// Planning service base URL.
    PlanningServiceUrl,
    /// News service base URL.
    NewsServiceUrl,
    /// Statistics service base URL.
    StatisticsServiceUrl,
    /// Notification service base URL.
    NotificationServiceUrl,
    /// Frontend base URL.
    FrontendUrl,
    /// API gateway base URL.
    GatewayUrl,
    /// Datastore connection string.
    MongodbUri,
    /// Datastore database name.
    TestDbName,
    /// Whether fixture data is wiped between tests.
    TestDbCleanup,
    /// Token signing secret shared with the auth service.
    JwtSecret,
    /// Access token lifetime.
    TestTokenExpiry,
    /// Refresh token lifetime.
    RefreshTokenExpiry,
    /// Per-request HTTP timeout.
    ApiTimeout,
    /// Datastore operation timeout.
    DbTimeout,
    /// Browser-driven test timeout.
    BrowserTimeout,
    /// Total HTTP attempts per request.
    RetryAttempts,
    /// Linear backoff step between attempts.
    RetryDelay,
    /// Log level filter.
    LogLevel,
    /// Console log output toggle.
    LogConsole,
    /// Optional JSON log file.
    LogFile,
    /// Runtime environment label.
    NodeEnv,
    /// CI marker.
    Ci,
    /// Debug logging override.
    Debug,
    /// Test category label.
    TestType,
}

impl HarnessEnv {
    /// Every key in declaration order.
    pub const ALL: [Self; 27] = [
        Self::AuthServiceUrl,
        Self::UserServiceUrl,
        Self::CourseServiceUrl,
        Self::PlanningServiceUrl,
        Self::NewsServiceUrl,
        Self::StatisticsServiceUrl,
        Self::NotificationServiceUrl,
        Self::FrontendUrl,
        Self::GatewayUrl,
        Self::MongodbUri,
        Self::TestDbName,
        Self::TestDbCleanup,
        Self::JwtSecret,
        Self::TestTokenExpiry,
        Self::RefreshTokenExpiry,
        Self::ApiTimeout,
        Self::DbTimeout,
        Self::BrowserTimeout,
        Self::RetryAttempts,
        Self::RetryDelay,
        Self::LogLevel,
        Self::LogConsole,
        Self::LogFile,
        Self::NodeEnv,
        Self::Ci,
        Self::Debug,
        Self::TestType,
    ];

    /// Returns the canonical environment variable name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AuthServiceUrl => "AUTH_SERVICE_URL",
            Self::UserServiceUrl => "USER_SERVICE_URL",
            Self::CourseServiceUrl => "COURSE_SERVICE_URL",
            Self::PlanningServiceUrl => "PLANNING_SERVICE_URL",
            Self::NewsServiceUrl => "NEWS_SERVICE_URL",
            Self::StatisticsServiceUrl => "STATISTICS_SERVICE_URL",
            Self::NotificationServiceUrl => "NOTIFICATION_SERVICE_URL",
            Self::FrontendUrl => "FRONTEND_URL",
            Self::GatewayUrl => "GATEWAY_URL",
            Self::MongodbUri => "MONGODB_URI",
            Self::TestDbName => "TEST_DB_NAME",
            Self::TestDbCleanup => "TEST_DB_CLEANUP",
            Self::JwtSecret => "JWT_SECRET",
            Self::TestTokenExpiry => "TEST_TOKEN_EXPIRY",
            Self::RefreshTokenExpiry => "REFRESH_TOKEN_EXPIRY",
            Self::ApiTimeout => "API_TIMEOUT",
            Self::DbTimeout => "DB_TIMEOUT",
            Self::BrowserTimeout => "BROWSER_TIMEOUT",
            Self::RetryAttempts => "RETRY_ATTEMPTS",
            Self::RetryDelay => "RETRY_DELAY",
            Self::LogLevel => "LOG_LEVEL",
            Self::LogConsole => "LOG_CONSOLE",
            Self::LogFile => "LOG_FILE",
            Self::NodeEnv => "NODE_ENV",
            Self::Ci => "CI",
            Self::Debug => "DEBUG",
            Self::TestType => "TEST_TYPE",
        }
    }

    /// Returns the snake_case key used in TOML config files.
    #[must_use]
    pub fn file_key(self) -> String {
        self.as_str().to_ascii_lowercase()
    }

    /// Resolves a TOML file key back to its environment key.
    #[must_use]
    pub fn from_file_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|env| env.file_key() == key)
    }

    /// Returns the URL key for a backing service.
    #[must_use]
    pub const fn for_service(service: ServiceName) -> Self {
        match service {
            ServiceName::Auth => Self::AuthServiceUrl,
            ServiceName::User => Self::UserServiceUrl,
            ServiceName::Course => Self::CourseServiceUrl,
            ServiceName::Planning => Self::PlanningServiceUrl,
            ServiceName::News => Self::NewsServiceUrl,
            ServiceName::Statistics => Self::StatisticsServiceUrl,
            ServiceName::Notification => Self::NotificationServiceUrl,
        }
    }
}

// ============================================================================
// SECTION: Readers
// ============================================================================

/// Reads an environment variable and enforces UTF-8 validity.
///
/// # Errors
///
/// Returns an error when the environment variable contains invalid UTF-8.
pub fn read_env_strict(name: &str) -> Result<Option<String>, String> {
    std::env::var_os(name).map_or(Ok(None), |raw| {
        raw.into_string().map(Some).map_err(|_| format!("{name} must be valid UTF-8"))
    })
}

/// Reads an environment variable and rejects empty values.
///
/// # Errors
///
/// Returns an error when the variable is set but empty or whitespace.
pub fn read_env_nonempty(name: &str) -> Result<Option<String>, String> {
    match read_env_strict(name)? {
        Some(value) if value.trim().is_empty() => Err(format!("{name} must not be empty")),
        Some(value) => Ok(Some(value)),
        None => Ok(None),
    }
}

// ============================================================================
// SECTION: Parsers
// ============================================================================

/// Parses a duration as plain milliseconds or `<n>ms|s|m|h|d`.
///
/// # Errors
///
/// Returns an error when the value is empty, non-numeric, has an unknown unit,
/// or overflows.
pub fn parse_duration(name: &str, raw: &str) -> Result<Duration, String> {
    let trimmed = raw.trim();
    let split = trimmed.find(|ch: char| !ch.is_ascii_digit()).unwrap_or(trimmed.len());
    let (digits, unit) = trimmed.split_at(split);
    if digits.is_empty() {
        return Err(format!("{name} must be a duration like 5000, 500ms, 30s, 1h, or 7d"));
    }
    let amount: u64 = digits.parse().map_err(|_| format!("{name} is out of range"))?;
    let millis_per_unit: u64 = match unit {
        "" | "ms" => 1,
        "s" => 1_000,
        "m" => 60_000,
        "h" => 3_600_000,
        "d" => 86_400_000,
        other => return Err(format!("{name} has unknown duration unit {other:?}")),
    };
    let millis = amount.checked_mul(millis_per_unit).ok_or_else(|| format!("{name} is out of range"))?;
    Ok(Duration::from_millis(millis))
}

/// Parses a positive duration.
///
/// # Errors
///
/// Returns an error when the value fails [`parse_duration`] or is zero.
pub fn parse_positive_duration(name: &str, raw: &str) -> Result<Duration, String> {
    let duration = parse_duration(name, raw)?;
    if duration.is_zero() {
        return Err(format!("{name} must be greater than zero"));
    }
    Ok(duration)
}

/// Parses a boolean literal (`true`/`false` or `1`/`0`).
///
/// # Errors
///
/// Returns an error when the value is not a recognized boolean literal.
pub fn parse_bool(name: &str, raw: &str) -> Result<bool, String> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("true") || trimmed == "1" {
        return Ok(true);
    }
    if trimmed.eq_ignore_ascii_case("false") || trimmed == "0" {
        return Ok(false);
    }
    Err(format!("{name} must be 1, 0, true, or false"))
}

/// Parses an http(s) base URL and strips any trailing slash.
///
/// # Errors
///
/// Returns an error when the value does not parse or uses another scheme.
pub fn parse_http_url(name: &str, raw: &str) -> Result<String, String> {
    let trimmed = raw.trim();
    let url = Url::parse(trimmed).map_err(|err| format!("{name} is not a valid url: {err}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("{name} must use http or https"));
    }
    if url.host_str().is_none() {
        return Err(format!("{name} must include a host"));
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}

/// Parses a datastore connection string.
///
/// # Errors
///
/// Returns an error when the scheme is not `mongodb` or `mongodb+srv`.
pub fn parse_mongodb_uri(name: &str, raw: &str) -> Result<String, String> {
    let trimmed = raw.trim();
    if !(trimmed.starts_with("mongodb://") || trimmed.starts_with("mongodb+srv://")) {
        return Err(format!("{name} must start with mongodb:// or mongodb+srv://"));
    }
    if trimmed.len() <= "mongodb://".len() {
        return Err(format!("{name} must include a host"));
    }
    Ok(trimmed.to_string())
}

/// Parses a positive integer.
///
/// # Errors
///
/// Returns an error when the value is non-numeric or zero.
pub fn parse_positive_u32(name: &str, raw: &str) -> Result<u32, String> {
    let value: u32 =
        raw.trim().parse().map_err(|_| format!("{name} must be a positive integer"))?;
    if value == 0 {
        return Err(format!("{name} must be greater than zero"));
    }
    Ok(value)
}

/// Parses a log level filter name.
///
/// # Errors
///
/// Returns an error for names other than error, warn, info, debug, or trace.
pub fn parse_log_level(name: &str, raw: &str) -> Result<String, String> {
    let level = raw.trim().to_ascii_lowercase();
    match level.as_str() {
        "error" | "warn" | "info" | "debug" | "trace" => Ok(level),
        _ => Err(format!("{name} must be one of error, warn, info, debug, trace")),
    }
}
