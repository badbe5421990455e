// system-tests/tests/helpers/harness.rs
// ============================================================================
// Module: Harness Wiring
// Description: Build fixture contexts that target the platform stub.
// Purpose: Run scenario suites end to end against in-process services.
// Dependencies: yggdrasil-config, yggdrasil-core, yggdrasil-harness
// ============================================================================

//! ## Overview
//! The harness under test is configured exactly like a CI run, except that
//! every service URL points at a [`PlatformStub`] port and the datastore
//! side-channel is the stub's own user store.

use std::sync::Arc;
use std::time::Duration;

use system_tests::config::SystemTestConfig;
use yggdrasil_config::HarnessConfig;
use yggdrasil_config::HarnessEnv;
use yggdrasil_core::ServiceName;
use yggdrasil_core::TestDataFactory;
use yggdrasil_harness::FixtureContext;
use yggdrasil_harness::ReleaseSummary;
use yggdrasil_harness::SuiteKind;
use yggdrasil_harness::SuiteReport;
use yggdrasil_harness::UserStore;
use yggdrasil_harness::suites::run_all;
use yggdrasil_harness::with_fixtures;

use super::platform_stub::PlatformStub;
use super::readiness::wait_for_platform;

/// Time allowed for the stub services to answer health probes.
pub const READY_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of one harness run against the stub.
pub struct RunOutcome {
    /// Aggregated suite report.
    pub report: SuiteReport,
    /// Fixture release summary.
    pub released: ReleaseSummary,
    /// Context the run used; kept for transcript access.
    pub context: Arc<FixtureContext>,
}

/// Builds a harness configuration pointing at `stub`.
pub fn harness_config(stub: &PlatformStub) -> Result<HarnessConfig, String> {
    HarnessConfig::from_lookup(|name| {
        let service =
            ServiceName::ALL.into_iter().find(|service| HarnessEnv::for_service(*service).as_str() == name);
        if let Some(service) = service {
            return Some(stub.url(service).to_string());
        }
        let value = match name {
            "RETRY_ATTEMPTS" => "1",
            "RETRY_DELAY" => "0",
            "API_TIMEOUT" => "5s",
            "TEST_DB_CLEANUP" => "true",
            "LOG_CONSOLE" => "false",
            _ => return None,
        };
        Some(value.to_string())
    })
    .map_err(|err| format!("harness config rejected: {err}"))
}

/// Builds a fixture context over `stub` and its shared user store.
pub fn fixture_context(stub: &PlatformStub) -> Result<Arc<FixtureContext>, String> {
    context_for(stub, harness_config(stub)?)
}

/// Builds a fixture context from `config` over `stub`'s user store.
pub fn context_for(stub: &PlatformStub, config: HarnessConfig) -> Result<Arc<FixtureContext>, String> {
    let seed = SystemTestConfig::load()?.seed;
    let factory = seed.map_or_else(TestDataFactory::new, TestDataFactory::with_seed);
    let store: Arc<dyn UserStore> = Arc::new(stub.store().clone());
    FixtureContext::with_store(config, store, factory)
        .map(Arc::new)
        .map_err(|err| format!("fixture context failed: {err}"))
}

/// Waits for the stub, runs `kinds`, and releases fixtures.
pub async fn run_suites(stub: &PlatformStub, kinds: &[SuiteKind]) -> Result<RunOutcome, String> {
    let context = fixture_context(stub)?;
    wait_for_platform(&context, READY_TIMEOUT).await?;
    run_in(context, kinds).await
}

/// Runs `kinds` in `context` without a readiness gate, then releases fixtures.
pub async fn run_in(context: Arc<FixtureContext>, kinds: &[SuiteKind]) -> Result<RunOutcome, String> {
    let kinds = kinds.to_vec();
    let (report, released) =
        with_fixtures(Arc::clone(&context), |ctx| async move { Ok(run_all(&ctx, &kinds).await) })
            .await
            .map_err(|err| format!("suite run failed: {err}"))?;
    Ok(RunOutcome {
        report,
        released,
        context,
    })
}
