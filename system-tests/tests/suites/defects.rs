// system-tests/tests/suites/defects.rs
// ============================================================================
// Module: Defect Detection Tests
// Description: Suites against a platform stub with one known defect each.
// Purpose: Ensure violations are reported against the right service and endpoint.
// Dependencies: system-tests helpers, yggdrasil-harness
// ============================================================================

//! Defect-injection tests for the scenario suites.

use std::net::TcpListener;

use helpers::artifacts::TestReporter;
use helpers::harness::context_for;
use helpers::harness::harness_config;
use helpers::harness::run_in;
use helpers::harness::run_suites;
use helpers::platform_stub::Defect;
use helpers::platform_stub::spawn_platform;
use yggdrasil_core::ServiceName;
use yggdrasil_harness::StepOutcome;
use yggdrasil_harness::SuiteKind;
use yggdrasil_harness::SuiteReport;
use yggdrasil_harness::Verdict;

use crate::helpers;

type TestResult = Result<(), String>;

/// Expected violation: service, endpoint label, and observed outcome.
struct Expected<'a> {
    service: &'a str,
    endpoint: &'a str,
    actual: &'a str,
}

fn violations(report: &SuiteReport) -> Vec<(&str, &str, &str)> {
    report
        .scenarios
        .iter()
        .flat_map(|scenario| &scenario.steps)
        .filter_map(|step| match &step.outcome {
            StepOutcome::Violation {
                service,
                endpoint,
                actual,
                ..
            } => Some((service.as_str(), endpoint.as_str(), actual.as_str())),
            _ => None,
        })
        .collect()
}

async fn assert_blocks(
    test_name: &str,
    defect: Defect,
    kind: SuiteKind,
    expected: &Expected<'_>,
) -> TestResult {
    let mut reporter = TestReporter::new(test_name).map_err(|err| err.to_string())?;
    let stub = spawn_platform(&[defect])?;
    let outcome = run_suites(&stub, &[kind]).await?;
    let artifacts =
        reporter.record_run(outcome.context.transcript(), &outcome.report).map_err(|err| err.to_string())?;
    let text = outcome.report.render_text();
    assert_eq!(outcome.report.verdict(), Verdict::Blocking, "{text}");
    let found = violations(&outcome.report);
    assert!(
        found.iter().any(|(service, endpoint, actual)| {
            *service == expected.service && *endpoint == expected.endpoint && *actual == expected.actual
        }),
        "expected {} {} -> {} in:\n{text}",
        expected.service,
        expected.endpoint,
        expected.actual
    );
    assert_eq!(outcome.released.users.failed, 0);
    reporter
        .finish("pass", vec![format!("{} violations reported", found.len())], artifacts)
        .map_err(|err| err.to_string())
}

#[tokio::test(flavor = "multi_thread")]
async fn cached_token_validity_blocks_propagation() -> TestResult {
    assert_blocks(
        "cached_token_validity_blocks_propagation",
        Defect::CachedTokenValidity(ServiceName::Course),
        SuiteKind::Propagation,
        &Expected {
            service: "course",
            endpoint: "GET /api/courses",
            actual: "200",
        },
    )
    .await
}

#[tokio::test(flavor = "multi_thread")]
async fn self_role_change_blocks_escalation() -> TestResult {
    assert_blocks(
        "self_role_change_blocks_escalation",
        Defect::SelfRoleChange,
        SuiteKind::Escalation,
        &Expected {
            service: "user",
            endpoint: "PUT /api/users/profile",
            actual: "200",
        },
    )
    .await
}

#[tokio::test(flavor = "multi_thread")]
async fn peer_read_blocks_horizontal_isolation() -> TestResult {
    assert_blocks(
        "peer_read_blocks_horizontal_isolation",
        Defect::PeerRead,
        SuiteKind::Escalation,
        &Expected {
            service: "user",
            endpoint: "GET /api/users/{userId}",
            actual: "200",
        },
    )
    .await
}

#[tokio::test(flavor = "multi_thread")]
async fn sticky_like_blocks_toggles() -> TestResult {
    assert_blocks(
        "sticky_like_blocks_toggles",
        Defect::StickyLike,
        SuiteKind::Toggles,
        &Expected {
            service: "news",
            endpoint: "POST /api/news/{articleId}/like",
            actual: "liked=true",
        },
    )
    .await
}

#[tokio::test(flavor = "multi_thread")]
async fn leaky_listing_blocks_visibility() -> TestResult {
    assert_blocks(
        "leaky_listing_blocks_visibility",
        Defect::LeakyListing,
        SuiteKind::Visibility,
        &Expected {
            service: "news",
            endpoint: "GET /api/news",
            actual: "listed",
        },
    )
    .await
}

#[tokio::test(flavor = "multi_thread")]
async fn ignored_authorship_blocks_visibility() -> TestResult {
    assert_blocks(
        "ignored_authorship_blocks_visibility",
        Defect::IgnoresAuthorship,
        SuiteKind::Visibility,
        &Expected {
            service: "news",
            endpoint: "GET /api/news/{articleId}",
            actual: "404",
        },
    )
    .await
}

#[tokio::test(flavor = "multi_thread")]
async fn author_only_restricted_blocks_visibility() -> TestResult {
    assert_blocks(
        "author_only_restricted_blocks_visibility",
        Defect::RestrictedAuthorsOnly,
        SuiteKind::Visibility,
        &Expected {
            service: "news",
            endpoint: "GET /api/news/{articleId}",
            actual: "404",
        },
    )
    .await
}

#[tokio::test(flavor = "multi_thread")]
async fn staff_admin_statistics_blocks_hierarchy() -> TestResult {
    assert_blocks(
        "staff_admin_statistics_blocks_hierarchy",
        Defect::StaffSeesAdminStatistics,
        SuiteKind::Hierarchy,
        &Expected {
            service: "statistics",
            endpoint: "GET /api/statistics/admin",
            actual: "200",
        },
    )
    .await
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_service_is_advisory() -> TestResult {
    let mut reporter = TestReporter::new("unreachable_service_is_advisory").map_err(|err| err.to_string())?;
    let stub = spawn_platform(&[])?;
    let dead = TcpListener::bind("127.0.0.1:0").map_err(|err| err.to_string())?;
    let dead_url = format!("http://{}", dead.local_addr().map_err(|err| err.to_string())?);
    drop(dead);
    let config = harness_config(&stub)?
        .with_service_url(ServiceName::Notification, &dead_url)
        .map_err(|err| err.to_string())?;
    let outcome = run_in(context_for(&stub, config)?, &[SuiteKind::Propagation]).await?;
    let artifacts =
        reporter.record_run(outcome.context.transcript(), &outcome.report).map_err(|err| err.to_string())?;
    let text = outcome.report.render_text();
    let counts = outcome.report.counts();
    assert_eq!(outcome.report.verdict(), Verdict::Advisory, "{text}");
    assert_eq!(counts.violations, 0, "{text}");
    assert!(counts.environment_failures > 0, "{text}");
    let unavailable: Vec<&str> = outcome
        .report
        .scenarios
        .iter()
        .flat_map(|scenario| &scenario.steps)
        .filter_map(|step| match &step.outcome {
            StepOutcome::EnvironmentUnavailable {
                service, ..
            } => Some(service.as_str()),
            _ => None,
        })
        .collect();
    assert!(unavailable.iter().all(|service| *service == "notification"), "{text}");
    reporter
        .finish("pass", vec![format!("{} environment failures", counts.environment_failures)], artifacts)
        .map_err(|err| err.to_string())
}
