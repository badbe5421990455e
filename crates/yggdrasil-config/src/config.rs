// crates/yggdrasil-config/src/config.rs
// ============================================================================
// Module: Harness Configuration
// Description: Typed harness configuration resolved from defaults, file, and env.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: toml, yggdrasil-core
// ============================================================================

//! ## Overview
//! [`HarnessConfig`] is resolved in three layers: built-in local-development
//! defaults, an optional TOML file whose keys are the lowercase environment
//! variable names, and process environment variables. Every layer is reduced
//! to raw strings first and parsed once, so defaults, file values, and env
//! values go through identical validation.
//!
//! Secrets (`JWT_SECRET`, datastore credentials) are redacted from `Debug`
//! output and from [`HarnessConfig::describe`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use yggdrasil_core::ServiceName;

use crate::env::HarnessEnv;
use crate::env::parse_bool;
use crate::env::parse_duration;
use crate::env::parse_http_url;
use crate::env::parse_log_level;
use crate::env::parse_mongodb_uri;
use crate::env::parse_positive_duration;
use crate::env::parse_positive_u32;
use crate::env::read_env_strict;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum datastore database name length in bytes.
const MAX_DB_NAME_LENGTH: usize = 63;
/// Placeholder printed in place of secrets.
const REDACTED: &str = "<redacted>";

/// Raw per-key values before parsing.
type RawValues = BTreeMap<HarnessEnv, String>;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Config Types
// ============================================================================

/// Token signing secret; never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct JwtSecret(String);

impl JwtSecret {
    /// Returns the secret value.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for JwtSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

/// Direct datastore access settings.
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// Connection string.
    pub uri: String,
    /// Database holding fixture users.
    pub name: String,
    /// Whether fixture data is wiped between tests.
    pub cleanup: bool,
}

impl DatabaseConfig {
    /// Returns the connection string with any credentials masked.
    #[must_use]
    pub fn redacted_uri(&self) -> String {
        redact_uri(&self.uri)
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("uri", &self.redacted_uri())
            .field("name", &self.name)
            .field("cleanup", &self.cleanup)
            .finish()
    }
}

/// Token lifetimes and signing secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenConfig {
    /// Signing secret shared with the auth service.
    pub jwt_secret: JwtSecret,
    /// Access token lifetime.
    pub access_expiry: Duration,
    /// Refresh token lifetime.
    pub refresh_expiry: Duration,
}

/// Operation timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Per-request HTTP timeout.
    pub api: Duration,
    /// Datastore operation timeout.
    pub database: Duration,
    /// Browser-driven test timeout.
    pub browser: Duration,
}

/// HTTP retry policy.
///
/// # Invariants
/// - `attempts >= 1`; a value of 1 disables retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per request, including the first.
    pub attempts: u32,
    /// Linear backoff step.
    pub delay: Duration,
}

impl RetryPolicy {
    /// Policy that never retries.
    pub const NONE: Self = Self {
        attempts: 1,
        delay: Duration::ZERO,
    };

    /// Returns the wait before retry number `attempt` (1-based).
    #[must_use]
    pub const fn backoff(&self, attempt: u32) -> Duration {
        self.delay.saturating_mul(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_millis(1_000),
        }
    }
}

/// Logging settings consumed by the CLI subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Level filter name.
    pub level: String,
    /// Whether events are written to stderr.
    pub console: bool,
    /// Optional JSON log file.
    pub file: Option<PathBuf>,
    /// Debug override.
    pub debug: bool,
}

impl LoggingConfig {
    /// Returns the level filter after applying the debug override.
    #[must_use]
    pub fn effective_level(&self) -> &str {
        if self.debug && matches!(self.level.as_str(), "error" | "warn" | "info") {
            "debug"
        } else {
            &self.level
        }
    }
}

/// Runtime labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Environment label, `test` by default.
    pub node_env: String,
    /// Whether the run happens under CI.
    pub ci: bool,
    /// Test category label.
    pub test_type: String,
}

/// Resolved harness configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    services: BTreeMap<ServiceName, String>,
    /// Frontend base URL.
    pub frontend_url: String,
    /// API gateway base URL.
    pub gateway_url: String,
    /// Datastore settings.
    pub database: DatabaseConfig,
    /// Token settings.
    pub tokens: TokenConfig,
    /// Timeouts.
    pub timeouts: TimeoutConfig,
    /// HTTP retry policy.
    pub retry: RetryPolicy,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Runtime labels.
    pub runtime: RuntimeConfig,
}

// ============================================================================
// SECTION: Loading
// ============================================================================

impl HarnessConfig {
    /// Resolves configuration from defaults and process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when any set variable is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::resolve(RawValues::new(), read_env_strict)
    }

    /// Resolves configuration from defaults, an optional TOML file, and env.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read or parsed, or when
    /// any resolved value is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => read_file_layer(path)?,
            None => RawValues::new(),
        };
        Self::resolve(file, read_env_strict)
    }

    /// Resolves configuration from defaults and a caller-supplied lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when any supplied value is invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::resolve(RawValues::new(), |name| Ok(lookup(name)))
    }

    fn resolve<F>(mut raw: RawValues, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Result<Option<String>, String>,
    {
        for key in HarnessEnv::ALL {
            if let Some(value) = lookup(key.as_str()).map_err(ConfigError::Invalid)? {
                raw.insert(key, value);
            }
        }
        Self::from_raw(&raw)
    }

    fn from_raw(raw: &RawValues) -> Result<Self, ConfigError> {
        let mut services = BTreeMap::new();
        for service in ServiceName::ALL {
            let url = field(raw, HarnessEnv::for_service(service), parse_http_url)?;
            services.insert(service, url);
        }
        let log_file = optional(raw, HarnessEnv::LogFile)?.map(PathBuf::from);
        Ok(Self {
            services,
            frontend_url: field(raw, HarnessEnv::FrontendUrl, parse_http_url)?,
            gateway_url: field(raw, HarnessEnv::GatewayUrl, parse_http_url)?,
            database: DatabaseConfig {
                uri: field(raw, HarnessEnv::MongodbUri, parse_mongodb_uri)?,
                name: field(raw, HarnessEnv::TestDbName, parse_db_name)?,
                cleanup: field(raw, HarnessEnv::TestDbCleanup, parse_bool)?,
            },
            tokens: TokenConfig {
                jwt_secret: JwtSecret(field(raw, HarnessEnv::JwtSecret, parse_text)?),
                access_expiry: field(raw, HarnessEnv::TestTokenExpiry, parse_positive_duration)?,
                refresh_expiry: field(raw, HarnessEnv::RefreshTokenExpiry, parse_positive_duration)?,
            },
            timeouts: TimeoutConfig {
                api: field(raw, HarnessEnv::ApiTimeout, parse_positive_duration)?,
                database: field(raw, HarnessEnv::DbTimeout, parse_positive_duration)?,
                browser: field(raw, HarnessEnv::BrowserTimeout, parse_positive_duration)?,
            },
            retry: RetryPolicy {
                attempts: field(raw, HarnessEnv::RetryAttempts, parse_positive_u32)?,
                delay: field(raw, HarnessEnv::RetryDelay, parse_duration)?,
            },
            logging: LoggingConfig {
                level: field(raw, HarnessEnv::LogLevel, parse_log_level)?,
                console: field(raw, HarnessEnv::LogConsole, parse_bool)?,
                file: log_file,
                debug: field(raw, HarnessEnv::Debug, parse_bool)?,
            },
            runtime: RuntimeConfig {
                node_env: field(raw, HarnessEnv::NodeEnv, parse_text)?,
                ci: field(raw, HarnessEnv::Ci, parse_bool)?,
                test_type: field(raw, HarnessEnv::TestType, parse_text)?,
            },
        })
    }

    /// Returns the base URL of a backing service.
    #[must_use]
    pub fn service_url(&self, service: ServiceName) -> &str {
        self.services.get(&service).map_or(service.default_url(), String::as_str)
    }

    /// Returns a copy with one service URL replaced.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the URL is not http(s).
    pub fn with_service_url(mut self, service: ServiceName, url: &str) -> Result<Self, ConfigError> {
        let url = parse_http_url(HarnessEnv::for_service(service).as_str(), url)
            .map_err(ConfigError::Invalid)?;
        self.services.insert(service, url);
        Ok(self)
    }

    /// Returns every resolved setting as `(ENV_KEY, value)` with secrets redacted.
    #[must_use]
    pub fn describe(&self) -> Vec<(&'static str, String)> {
        let mut rows: Vec<(&'static str, String)> = ServiceName::ALL
            .into_iter()
            .map(|service| {
                (HarnessEnv::for_service(service).as_str(), self.service_url(service).to_string())
            })
            .collect();
        let log_file =
            self.logging.file.as_ref().map_or_else(|| "-".to_string(), |path| path.display().to_string());
        rows.extend([
            (HarnessEnv::FrontendUrl.as_str(), self.frontend_url.clone()),
            (HarnessEnv::GatewayUrl.as_str(), self.gateway_url.clone()),
            (HarnessEnv::MongodbUri.as_str(), self.database.redacted_uri()),
            (HarnessEnv::TestDbName.as_str(), self.database.name.clone()),
            (HarnessEnv::TestDbCleanup.as_str(), self.database.cleanup.to_string()),
            (HarnessEnv::JwtSecret.as_str(), REDACTED.to_string()),
            (HarnessEnv::TestTokenExpiry.as_str(), format_duration(self.tokens.access_expiry)),
            (HarnessEnv::RefreshTokenExpiry.as_str(), format_duration(self.tokens.refresh_expiry)),
            (HarnessEnv::ApiTimeout.as_str(), format_duration(self.timeouts.api)),
            (HarnessEnv::DbTimeout.as_str(), format_duration(self.timeouts.database)),
            (HarnessEnv::BrowserTimeout.as_str(), format_duration(self.timeouts.browser)),
            (HarnessEnv::RetryAttempts.as_str(), self.retry.attempts.to_string()),
            (HarnessEnv::RetryDelay.as_str(), format_duration(self.retry.delay)),
            (HarnessEnv::LogLevel.as_str(), self.logging.level.clone()),
            (HarnessEnv::LogConsole.as_str(), self.logging.console.to_string()),
            (HarnessEnv::LogFile.as_str(), log_file),
            (HarnessEnv::NodeEnv.as_str(), self.runtime.node_env.clone()),
            (HarnessEnv::Ci.as_str(), self.runtime.ci.to_string()),
            (HarnessEnv::Debug.as_str(), self.logging.debug.to_string()),
            (HarnessEnv::TestType.as_str(), self.runtime.test_type.clone()),
        ]);
        rows
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the documented local-development default for a key.
const fn default_value(key: HarnessEnv) -> Option<&'static str> {
    match key {
        HarnessEnv::AuthServiceUrl => Some(ServiceName::Auth.default_url()),
        HarnessEnv::UserServiceUrl => Some(ServiceName::User.default_url()),
        HarnessEnv::CourseServiceUrl => Some(ServiceName::Course.default_url()),
        HarnessEnv::PlanningServiceUrl => Some(ServiceName::Planning.default_url()),
        HarnessEnv::NewsServiceUrl => Some(ServiceName::News.default_url()),
        HarnessEnv::StatisticsServiceUrl => Some(ServiceName::Statistics.default_url()),
        HarnessEnv::NotificationServiceUrl => Some(ServiceName::Notification.default_url()),
        HarnessEnv::FrontendUrl => Some("http://localhost:3000"),
        HarnessEnv::GatewayUrl => Some("http://localhost:8080"),
        HarnessEnv::MongodbUri => Some("mongodb://localhost:27017"),
        HarnessEnv::TestDbName => Some("yggdrasil_test"),
        HarnessEnv::TestDbCleanup | HarnessEnv::LogConsole => Some("true"),
        HarnessEnv::JwtSecret => Some("test-jwt-secret"),
        HarnessEnv::TestTokenExpiry => Some("1h"),
        HarnessEnv::RefreshTokenExpiry => Some("7d"),
        HarnessEnv::ApiTimeout => Some("10000"),
        HarnessEnv::DbTimeout => Some("5000"),
        HarnessEnv::BrowserTimeout => Some("30000"),
        HarnessEnv::RetryAttempts => Some("3"),
        HarnessEnv::RetryDelay => Some("1000"),
        HarnessEnv::LogLevel => Some("info"),
        HarnessEnv::LogFile => None,
        HarnessEnv::NodeEnv => Some("test"),
        HarnessEnv::Ci | HarnessEnv::Debug => Some("false"),
        HarnessEnv::TestType => Some("integration"),
    }
}

/// Returns the raw value for a key, rejecting empty strings.
fn optional(raw: &RawValues, key: HarnessEnv) -> Result<Option<&str>, ConfigError> {
    match raw.get(&key) {
        Some(value) if value.trim().is_empty() => {
            Err(ConfigError::Invalid(format!("{} must not be empty", key.as_str())))
        }
        Some(value) => Ok(Some(value.as_str())),
        None => Ok(None),
    }
}

/// Parses a key's value, falling back to its default.
fn field<T>(
    raw: &RawValues,
    key: HarnessEnv,
    parse: fn(&str, &str) -> Result<T, String>,
) -> Result<T, ConfigError> {
    let value = optional(raw, key)?.or_else(|| default_value(key)).ok_or_else(|| {
        ConfigError::Invalid(format!("{} has no value and no default", key.as_str()))
    })?;
    parse(key.as_str(), value).map_err(ConfigError::Invalid)
}

fn parse_text(_name: &str, raw: &str) -> Result<String, String> {
    Ok(raw.trim().to_string())
}

fn parse_db_name(name: &str, raw: &str) -> Result<String, String> {
    let trimmed = raw.trim();
    if trimmed.len() > MAX_DB_NAME_LENGTH {
        return Err(format!("{name} exceeds {MAX_DB_NAME_LENGTH} bytes"));
    }
    if trimmed.chars().any(|ch| matches!(ch, '/' | '\\' | '.' | ' ' | '"' | '$' | '\0')) {
        return Err(format!("{name} contains a character not allowed in database names"));
    }
    Ok(trimmed.to_string())
}

/// Reads a TOML config file into raw values.
fn read_file_layer(path: &Path) -> Result<RawValues, ConfigError> {
    validate_path(path)?;
    let bytes = fs::read(path).map_err(|err| ConfigError::Io(format!("{}: {err}", path.display())))?;
    if bytes.len() > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
    }
    let content = std::str::from_utf8(&bytes)
        .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
    let table: toml::Table =
        toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
    let mut raw = RawValues::new();
    for (key, value) in table {
        let env = HarnessEnv::from_file_key(&key)
            .ok_or_else(|| ConfigError::Invalid(format!("unknown config key {key}")))?;
        let text = match value {
            toml::Value::String(text) => text,
            toml::Value::Integer(number) => number.to_string(),
            toml::Value::Boolean(flag) => flag.to_string(),
            other => {
                return Err(ConfigError::Invalid(format!(
                    "{key} must be a string, integer, or boolean, found {}",
                    other.type_str()
                )));
            }
        };
        raw.insert(env, text);
    }
    Ok(raw)
}

/// Validates the config path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Masks the userinfo section of a connection string.
fn redact_uri(uri: &str) -> String {
    let Some((scheme, rest)) = uri.split_once("://") else {
        return uri.to_string();
    };
    let authority_end = rest.find('/').unwrap_or(rest.len());
    match rest[..authority_end].rfind('@') {
        Some(at) => format!("{scheme}://{REDACTED}@{}", &rest[at + 1..]),
        None => uri.to_string(),
    }
}

fn format_duration(duration: Duration) -> String {
    format!("{}ms", duration.as_millis())
}
