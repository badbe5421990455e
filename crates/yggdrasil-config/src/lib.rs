// crates/yggdrasil-config/src/lib.rs
// ============================================================================
// Module: Yggdrasil Config Library
// Description: Harness configuration model, environment keys, and parsers.
// Purpose: Single source of truth for service URLs, timeouts, and retry policy.
// Dependencies: yggdrasil-core, serde, toml, url
// ============================================================================

//! ## Overview
//! `yggdrasil-config` resolves the harness configuration from built-in
//! local-development defaults, an optional TOML file, and process environment
//! variables, in that order of precedence. Parsing is strict: a value that is
//! set but invalid fails the load instead of falling back to a default.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod env;


// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::ConfigError;
pub use config::DatabaseConfig;
pub use config::HarnessConfig;
pub use config::JwtSecret;
pub use config::LoggingConfig;
pub use config::RetryPolicy;
pub use config::RuntimeConfig;
pub use config::TimeoutConfig;
pub use config::TokenConfig;
pub use env::HarnessEnv;
pub use env::read_env_strict;
