// crates/yggdrasil-cli/src/main.rs
// ============================================================================
// Module: Yggdrasil Harness CLI Entry Point
// Description: Command dispatcher for suite runs, health probes, and matrix output.
// Purpose: Give CI one binary whose exit code separates defects from outages.
// Dependencies: clap, serde_json, thiserror, tokio, tracing, yggdrasil-harness
// ============================================================================

//! ## Overview
//! `yggdrasil-harness` resolves [`HarnessConfig`] from defaults, an optional
//! TOML file, and the environment, then dispatches one subcommand:
//! - `run` executes the selected suites and prints the report;
//! - `health` probes every service once (optionally waiting for readiness);
//! - `config` prints the resolved settings with secrets redacted;
//! - `matrix` prints the expected role by endpoint table.
//!
//! Exit codes: 0 clean, 1 blocking violation, 2 usage or configuration error,
//! 3 services unavailable (for `run` only with `--strict-env`).

// ============================================================================
// SECTION: Modules
// ============================================================================

mod telemetry;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt::Write as _;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;
use tracing::info;
use yggdrasil_config::HarnessConfig;
use yggdrasil_config::env::parse_duration;
use yggdrasil_core::MatrixRow;
use yggdrasil_core::Role;
use yggdrasil_core::expected_matrix;
use yggdrasil_harness::FixtureContext;
use yggdrasil_harness::HarnessError;
use yggdrasil_harness::ScenarioReport;
use yggdrasil_harness::StepOutcome;
use yggdrasil_harness::SuiteKind;
use yggdrasil_harness::SuiteReport;
use yggdrasil_harness::Verdict;
use yggdrasil_harness::service_clients;
use yggdrasil_harness::suites::run_all;
use yggdrasil_harness::wait_for_services;
use yggdrasil_harness::with_fixtures;

// ============================================================================
// SECTION: Exit Codes
// ============================================================================

/// Blocking authorization violation.
const EXIT_BLOCKING: u8 = 1;
/// Usage, configuration, or output error.
const EXIT_USAGE: u8 = 2;
/// Services unreachable.
const EXIT_UNAVAILABLE: u8 = 3;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "yggdrasil-harness", version, disable_help_subcommand = true)]
struct Cli {
    /// TOML file layered under environment variables.
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Selected subcommand.
    #[command(subcommand)]
    command: Commands,
}

/// Supported subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run authorization suites against the configured services.
    Run(RunCommand),
    /// Probe every service health endpoint.
    Health {
        /// Keep polling until all services answer or this duration passes.
        #[arg(long, value_name = "DURATION", value_parser = parse_wait)]
        wait: Option<Duration>,
    },
    /// Print the resolved configuration with secrets redacted.
    Config,
    /// Print the expected authorization matrix.
    Matrix {
        /// Emit JSON instead of a text table.
        #[arg(long)]
        json: bool,
    },
}

/// Arguments for `run`.
#[derive(Args, Debug)]
struct RunCommand {
    /// Suite to run; repeat for several. Defaults to every suite.
    #[arg(long = "suite", value_name = "SUITE")]
    suites: Vec<SuiteKind>,
    /// Wait for service readiness before running.
    #[arg(long, value_name = "DURATION", value_parser = parse_wait)]
    wait: Option<Duration>,
    /// Treat environment unavailability as a failing exit code.
    #[arg(long)]
    strict_env: bool,
    /// Write the JSON suite report to this path.
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,
    /// Write the HTTP transcript to this path.
    #[arg(long, value_name = "PATH")]
    transcript: Option<PathBuf>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper carrying a printable message.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

impl From<HarnessError> for CliError {
    fn from(err: HarnessError) -> Self {
        Self::new(err.to_string())
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    let config = HarnessConfig::load(cli.config.as_deref())
        .map_err(|err| CliError::new(format!("configuration error: {err}")))?;
    match cli.command {
        Commands::Run(command) => command_run(config, command).await,
        Commands::Health {
            wait,
        } => command_health(&config, wait).await,
        Commands::Config => command_config(&config),
        Commands::Matrix {
            json,
        } => command_matrix(json),
    }
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// Runs the selected suites and reports the verdict.
async fn command_run(config: HarnessConfig, command: RunCommand) -> CliResult<ExitCode> {
    telemetry::init(&config.logging).map_err(CliError::new)?;
    let kinds = if command.suites.is_empty() { SuiteKind::ALL.to_vec() } else { command.suites };
    let context = Arc::new(FixtureContext::new(config)?);

    let report = match readiness_report(&context, command.wait).await? {
        Some(unavailable) => {
            let mut report = SuiteReport::new();
            report.push(unavailable);
            report
        }
        None => {
            let names: Vec<&str> = kinds.iter().map(|kind| kind.as_str()).collect();
            info!(suites = %names.join(","), "starting run");
            let (report, released) = with_fixtures(Arc::clone(&context), move |context| async move {
                Ok::<_, HarnessError>(run_all(&context, &kinds).await)
            })
            .await?;
            write_stdout_line(&format!(
                "fixtures released: {} deleted, {} not deleted, {} purged",
                released.users.deleted, released.users.failed, released.purged
            ))
            .map_err(|err| output_error(&err))?;
            report
        }
    };

    if let Some(path) = &command.report {
        let json = report.to_json().map_err(|err| CliError::new(format!("report encoding failed: {err}")))?;
        write_json(path, &json)?;
    }
    if let Some(path) = &command.transcript {
        let entries = serde_json::to_value(context.transcript().entries())
            .map_err(|err| CliError::new(format!("transcript encoding failed: {err}")))?;
        write_json(path, &entries)?;
    }
    write_stdout_line(report.render_text().trim_end()).map_err(|err| output_error(&err))?;
    Ok(ExitCode::from(verdict_exit_code(report.verdict(), command.strict_env)))
}

/// Waits for readiness when requested and converts a timeout into a report.
async fn readiness_report(
    context: &FixtureContext,
    wait: Option<Duration>,
) -> CliResult<Option<ScenarioReport>> {
    let Some(wait) = wait else {
        return Ok(None);
    };
    let clients = service_clients(context.config(), context.transcript())
        .map_err(|err| CliError::new(format!("cannot build service clients: {err}")))?;
    match wait_for_services(&clients, wait).await {
        Ok(()) => Ok(None),
        Err(HarnessError::Unavailable(services)) => {
            let mut report = ScenarioReport::new("readiness", "service readiness");
            for service in services {
                let err = HarnessError::Unavailable(vec![service.clone()]);
                report.record(format!("{service} health"), StepOutcome::from_error(&service, &err));
            }
            Ok(Some(report.finish()))
        }
        Err(err) => Err(err.into()),
    }
}

/// Probes every service once, optionally waiting for readiness first.
async fn command_health(config: &HarnessConfig, wait: Option<Duration>) -> CliResult<ExitCode> {
    let transcript = yggdrasil_harness::Transcript::new();
    let clients = service_clients(config, &transcript)
        .map_err(|err| CliError::new(format!("cannot build service clients: {err}")))?;
    if let Some(wait) = wait {
        let _ = wait_for_services(&clients, wait).await;
    }
    let mut all_up = true;
    for client in &clients {
        let up = client.health_check().await;
        all_up &= up;
        let state = if up { "up" } else { "down" };
        write_stdout_line(&format!("{:<13} {:<5} {}", client.label(), state, client.base_url()))
            .map_err(|err| output_error(&err))?;
    }
    Ok(if all_up { ExitCode::SUCCESS } else { ExitCode::from(EXIT_UNAVAILABLE) })
}

/// Prints resolved settings as `KEY=value` lines.
fn command_config(config: &HarnessConfig) -> CliResult<ExitCode> {
    for (key, value) in config.describe() {
        write_stdout_line(&format!("{key}={value}")).map_err(|err| output_error(&err))?;
    }
    Ok(ExitCode::SUCCESS)
}

/// Prints the expected matrix as text or JSON.
fn command_matrix(json: bool) -> CliResult<ExitCode> {
    let rows = expected_matrix();
    let output = if json {
        serde_json::to_string_pretty(&matrix_json(&rows))
            .map_err(|err| CliError::new(format!("matrix encoding failed: {err}")))?
    } else {
        render_matrix(&rows)
    };
    write_stdout_line(output.trim_end()).map_err(|err| output_error(&err))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Maps a verdict onto the process exit code.
const fn verdict_exit_code(verdict: Verdict, strict_env: bool) -> u8 {
    match verdict {
        Verdict::Clean => 0,
        Verdict::Advisory if strict_env => EXIT_UNAVAILABLE,
        Verdict::Advisory => 0,
        Verdict::Blocking => EXIT_BLOCKING,
    }
}

/// Parses a `--wait` duration such as `30s` or `500ms`.
fn parse_wait(raw: &str) -> Result<Duration, String> {
    parse_duration("--wait", raw)
}

/// Renders the matrix as a fixed-width table, one row per endpoint.
fn render_matrix(rows: &[MatrixRow]) -> String {
    let width = rows.iter().map(|row| row.endpoint.label().len()).max().unwrap_or(0).max("ENDPOINT".len());
    let mut out = format!("{:<13} {:<width$}", "SERVICE", "ENDPOINT");
    for role in Role::ALL {
        let _ = write!(out, " {:<8}", role.as_str());
    }
    out.push('\n');
    for row in rows {
        let _ = write!(out, "{:<13} {:<width$}", row.endpoint.service.as_str(), row.endpoint.label());
        for (_, expectation) in &row.cells {
            let _ = write!(out, " {:<8}", expectation.to_string());
        }
        out.push('\n');
    }
    out
}

/// Renders the matrix as JSON objects keyed by role.
fn matrix_json(rows: &[MatrixRow]) -> Value {
    Value::Array(
        rows.iter()
            .map(|row| {
                let cells: serde_json::Map<String, Value> = row
                    .cells
                    .iter()
                    .map(|(role, expectation)| (role.as_str().to_string(), json!(expectation.to_string())))
                    .collect();
                json!({
                    "service": row.endpoint.service.as_str(),
                    "endpoint": row.endpoint.label(),
                    "expected": cells,
                })
            })
            .collect(),
    )
}

/// Writes pretty JSON to `path`.
fn write_json(path: &Path, value: &Value) -> CliResult<()> {
    let bytes = serde_json::to_vec_pretty(value)
        .map_err(|err| CliError::new(format!("json encoding failed: {err}")))?;
    fs::write(path, bytes).map_err(|err| CliError::new(format!("cannot write {}: {err}", path.display())))
}

/// Writes a single line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output failure.
fn output_error(error: &std::io::Error) -> CliError {
    CliError::new(format!("failed to write output: {error}"))
}

/// Emits an error message and returns the usage exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::from(EXIT_USAGE)
}
