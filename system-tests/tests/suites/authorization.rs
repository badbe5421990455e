// system-tests/tests/suites/authorization.rs
// ============================================================================
// Module: Clean Platform Authorization Tests
// Description: Each suite against a platform with no defects.
// Purpose: Prove the suites raise no false positives.
// Dependencies: system-tests helpers, yggdrasil-harness
// ============================================================================

//! Clean-platform authorization tests.

use helpers::artifacts::TestReporter;
use helpers::harness::RunOutcome;
use helpers::harness::run_suites;
use helpers::platform_stub::Defect;
use helpers::platform_stub::spawn_platform;
use yggdrasil_harness::SuiteKind;
use yggdrasil_harness::Verdict;

use crate::helpers;

type TestResult = Result<(), String>;

/// Runs `kinds` on a clean platform and asserts a clean, non-empty report.
async fn assert_clean(test_name: &str, kinds: &[SuiteKind]) -> Result<RunOutcome, String> {
    assert_clean_with(test_name, &[], kinds).await
}

/// Runs `kinds` on a platform with `quirks` and asserts a clean report.
async fn assert_clean_with(
    test_name: &str,
    quirks: &[Defect],
    kinds: &[SuiteKind],
) -> Result<RunOutcome, String> {
    let mut reporter = TestReporter::new(test_name).map_err(|err| err.to_string())?;
    let stub = spawn_platform(quirks)?;
    let outcome = run_suites(&stub, kinds).await?;
    let artifacts =
        reporter.record_run(outcome.context.transcript(), &outcome.report).map_err(|err| err.to_string())?;
    let counts = outcome.report.counts();
    let text = outcome.report.render_text();
    assert_eq!(outcome.report.verdict(), Verdict::Clean, "{text}");
    assert_eq!(counts.violations, 0, "{text}");
    assert_eq!(counts.fixture_failures, 0, "{text}");
    assert_eq!(counts.environment_failures, 0, "{text}");
    assert!(counts.passed > 0, "suite recorded no steps");
    assert!(outcome.released.errors.is_empty(), "release errors: {:?}", outcome.released.errors);
    assert_eq!(outcome.released.users.failed, 0);
    assert_eq!(stub.store().len(), 0, "fixture users survived release");
    reporter
        .finish("pass", vec![format!("{} steps passed", counts.passed)], artifacts)
        .map_err(|err| err.to_string())?;
    Ok(outcome)
}

#[tokio::test(flavor = "multi_thread")]
async fn propagation_is_clean_on_a_correct_platform() -> TestResult {
    let outcome = assert_clean("propagation_is_clean_on_a_correct_platform", &[SuiteKind::Propagation]).await?;
    let scenarios: Vec<&str> = outcome.report.scenarios.iter().map(|scenario| scenario.name.as_str()).collect();
    assert_eq!(scenarios.len(), 16, "four roles, two mutations, two channels");
    assert!(scenarios.contains(&"deactivate student via datastore"));
    assert!(scenarios.contains(&"delete admin via api"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn escalation_is_clean_on_a_correct_platform() -> TestResult {
    let outcome = assert_clean("escalation_is_clean_on_a_correct_platform", &[SuiteKind::Escalation]).await?;
    let steps: Vec<&str> = outcome
        .report
        .scenarios
        .iter()
        .flat_map(|scenario| &scenario.steps)
        .map(|step| step.name.as_str())
        .collect();
    assert!(steps.contains(&"student requests admin"));
    assert!(steps.contains(&"staff stored role unchanged"));
    assert!(steps.contains(&"teacher reads peer by id"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn toggles_are_clean_on_a_correct_platform() -> TestResult {
    let outcome = assert_clean("toggles_are_clean_on_a_correct_platform", &[SuiteKind::Toggles]).await?;
    assert_eq!(outcome.report.counts().passed, 9, "three toggles, three calls each");
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn toggles_start_from_the_observed_state() -> TestResult {
    let outcome = assert_clean_with(
        "toggles_start_from_the_observed_state",
        &[Defect::PinnedOnCreate],
        &[SuiteKind::Toggles],
    )
    .await?;
    assert_eq!(outcome.report.counts().passed, 9, "a pre-pinned article still alternates");
    let pins = outcome
        .context
        .transcript()
        .entries()
        .into_iter()
        .filter(|entry| entry.method == "POST" && entry.path.ends_with("/pin"))
        .count();
    assert_eq!(pins, 3);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn hierarchy_is_clean_on_a_correct_platform() -> TestResult {
    let outcome = assert_clean("hierarchy_is_clean_on_a_correct_platform", &[SuiteKind::Hierarchy]).await?;
    let steps: Vec<&str> = outcome.report.scenarios[0].steps.iter().map(|step| step.name.as_str()).collect();
    assert!(steps.contains(&"student GET /api/statistics/admin"));
    assert!(!steps.contains(&"admin DELETE /api/users/{userId}"), "allowed destructive calls are skipped");
    assert!(steps.contains(&"student DELETE /api/users/{userId}"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn visibility_is_clean_on_a_correct_platform() -> TestResult {
    let outcome = assert_clean("visibility_is_clean_on_a_correct_platform", &[SuiteKind::Visibility]).await?;
    let steps: Vec<&str> = outcome.report.scenarios[0].steps.iter().map(|step| step.name.as_str()).collect();
    assert!(steps.contains(&"student listing filtered"));
    assert!(steps.contains(&"admin reads draft/restricted by staff"), "admin who authored nothing");
    assert!(steps.contains(&"staff reads draft/restricted by staff"), "staff who authored nothing");
    assert!(steps.contains(&"staff author reads draft/restricted by staff"));
    assert!(steps.contains(&"admin author reads draft/restricted by admin"));
    assert!(steps.contains(&"anonymous listing"));
    let listings = steps.iter().filter(|step| step.ends_with("listing filtered")).count();
    assert_eq!(listings, 6, "four roles and two authors");
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn all_suites_share_one_context() -> TestResult {
    let outcome = assert_clean("all_suites_share_one_context", &SuiteKind::ALL).await?;
    let suites: std::collections::BTreeSet<&str> =
        outcome.report.scenarios.iter().map(|scenario| scenario.suite.as_str()).collect();
    assert_eq!(suites.len(), SuiteKind::ALL.len());
    assert!(!outcome.context.transcript().is_empty());
    Ok(())
}
