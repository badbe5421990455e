// system-tests/tests/suites/walkthrough.rs
// ============================================================================
// Module: Walkthrough Tests
// Description: Student lifecycle across six services with datastore deactivation.
// Purpose: Pin the end-to-end revocation story step by step.
// Dependencies: system-tests helpers, yggdrasil-harness
// ============================================================================

//! Walkthrough tests: register, read six services, deactivate, read again.

use std::sync::Arc;

use helpers::artifacts::TestReporter;
use helpers::harness::READY_TIMEOUT;
use helpers::harness::fixture_context;
use helpers::platform_stub::Defect;
use helpers::platform_stub::PlatformStub;
use helpers::platform_stub::spawn_platform;
use helpers::readiness::wait_for_platform;
use yggdrasil_core::ServiceName;
use yggdrasil_harness::ScenarioReport;
use yggdrasil_harness::StepReport;
use yggdrasil_harness::SuiteReport;
use yggdrasil_harness::Verdict;
use yggdrasil_harness::suites::propagation::WALKTHROUGH_SERVICES;
use yggdrasil_harness::suites::propagation::walkthrough;
use yggdrasil_harness::with_fixtures;

use crate::helpers;

type TestResult = Result<(), String>;

async fn run_walkthrough(reporter: &TestReporter, stub: &PlatformStub) -> Result<ScenarioReport, String> {
    let context = fixture_context(stub)?;
    wait_for_platform(&context, READY_TIMEOUT).await?;
    let (scenario, released) =
        with_fixtures(Arc::clone(&context), |ctx| async move { Ok(walkthrough(&ctx).await) })
            .await
            .map_err(|err| err.to_string())?;
    assert_eq!(released.users.failed, 0);
    let mut report = SuiteReport::new();
    report.push(scenario.clone());
    reporter.record_run(context.transcript(), &report).map_err(|err| err.to_string())?;
    Ok(scenario)
}

fn phase<'a>(scenario: &'a ScenarioReport, prefix: &str) -> Vec<&'a StepReport> {
    scenario.steps.iter().filter(|step| step.name.starts_with(prefix)).collect()
}

#[tokio::test(flavor = "multi_thread")]
async fn deactivated_student_is_locked_out_everywhere() -> TestResult {
    let mut reporter =
        TestReporter::new("deactivated_student_is_locked_out_everywhere").map_err(|err| err.to_string())?;
    let stub = spawn_platform(&[])?;
    let scenario = run_walkthrough(&reporter, &stub).await?;
    assert_eq!(scenario.name, "deactivate student via datastore");
    assert_eq!(scenario.verdict(), Verdict::Clean);
    let before = phase(&scenario, "before: ");
    let after = phase(&scenario, "after: ");
    assert_eq!(before.len(), WALKTHROUGH_SERVICES.len());
    assert_eq!(after.len(), WALKTHROUGH_SERVICES.len());
    assert!(before.iter().chain(&after).all(|step| step.outcome.is_pass()));
    assert!(after.iter().any(|step| step.name == "after: GET /api/statistics/dashboard"));
    assert!(!after.iter().any(|step| step.name.contains("/api/notifications")));
    reporter
        .finish("pass", vec!["six services revoked the token".to_string()], Vec::new())
        .map_err(|err| err.to_string())
}

#[tokio::test(flavor = "multi_thread")]
async fn one_stale_service_is_named_in_the_walkthrough() -> TestResult {
    let mut reporter =
        TestReporter::new("one_stale_service_is_named_in_the_walkthrough").map_err(|err| err.to_string())?;
    let stub = spawn_platform(&[Defect::CachedTokenValidity(ServiceName::Statistics)])?;
    let scenario = run_walkthrough(&reporter, &stub).await?;
    assert_eq!(scenario.verdict(), Verdict::Blocking);
    let failing: Vec<&str> = scenario.violations().map(|step| step.name.as_str()).collect();
    assert_eq!(failing, vec!["after: GET /api/statistics/dashboard"]);
    assert!(phase(&scenario, "before: ").iter().all(|step| step.outcome.is_pass()));
    reporter
        .finish("pass", vec!["stale statistics service reported".to_string()], Vec::new())
        .map_err(|err| err.to_string())
}
