// crates/yggdrasil-cli/src/telemetry.rs
// ============================================================================
// Module: CLI Telemetry
// Description: tracing-subscriber installation from logging settings.
// Purpose: Route harness events to stderr and an optional JSON log file.
// Dependencies: tracing-subscriber, yggdrasil-config
// ============================================================================

//! ## Overview
//! Builds the global subscriber once per process. `RUST_LOG` takes precedence
//! over the configured level so a single run can be narrowed without editing
//! the environment file.

use std::fs::File;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use yggdrasil_config::LoggingConfig;

/// Builds the level filter for `logging`.
///
/// # Errors
///
/// Returns an error when the level is not a valid filter directive.
pub fn filter_for(logging: &LoggingConfig) -> Result<EnvFilter, String> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(logging.effective_level())
        .map_err(|err| format!("invalid log level {:?}: {err}", logging.effective_level()))
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Returns an error when the log file cannot be created or a subscriber is
/// already installed.
pub fn init(logging: &LoggingConfig) -> Result<(), String> {
    let filter = filter_for(logging)?;
    let console = logging.console.then(|| fmt::layer().with_writer(std::io::stderr).with_target(false));
    let file = match &logging.file {
        Some(path) => {
            let handle = File::create(path)
                .map_err(|err| format!("cannot create log file {}: {err}", path.display()))?;
            Some(fmt::layer().json().with_ansi(false).with_writer(Mutex::new(handle)))
        }
        None => None,
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .map_err(|err| format!("cannot install log subscriber: {err}"))
}
