// crates/yggdrasil-harness/src/suites/hierarchy.rs
// ============================================================================
// Module: Hierarchy Suite
// Description: Full role by endpoint matrix against a bystander account.
// Purpose: Verify every catalogue decision and role monotonicity.
// Dependencies: serde_json, yggdrasil-core
// ============================================================================

//! ## Overview
//! One user per role calls every catalogue endpoint. User-addressed endpoints
//! target a throwaway bystander student, and resource-addressed endpoints
//! target an article and an event seeded by the admin actor. Destructive
//! calls the policy allows are skipped so the bystander survives the matrix.
//!
//! After each endpoint row, the observed successes must be monotone: if a
//! lower role succeeded, every higher role must have succeeded too.

use serde_json::Value;
use serde_json::json;
use yggdrasil_core::Access;
use yggdrasil_core::ENDPOINTS;
use yggdrasil_core::Endpoint;
use yggdrasil_core::EndpointId;
use yggdrasil_core::Principal;
use yggdrasil_core::Role;
use yggdrasil_core::TestDataFactory;
use yggdrasil_core::authorize;

use super::probe::check;
use super::seed_resource;
use crate::error::HarnessError;
use crate::fixture::FixtureContext;
use crate::report::ScenarioReport;
use crate::report::StepOutcome;

const SUITE: &str = "hierarchy";

/// Runs the full matrix.
pub async fn run(context: &FixtureContext) -> ScenarioReport {
    let mut report = ScenarioReport::new(SUITE, "role matrix");
    let auth = context.auth();
    let fixtures = async {
        let users = auth.create_test_user_set().await?;
        let bystander = auth.create_test_user(Role::Student, None).await?;
        let factory = auth.factory();
        let article = seed_resource(context, EndpointId::NewsCreate, &factory.article(None)?).await?;
        let event = seed_resource(context, EndpointId::EventCreate, &factory.event(None)?).await?;
        Ok::<_, HarnessError>((users, bystander, article, event))
    };
    let (users, bystander, article, event) = match fixtures.await {
        Ok(fixtures) => fixtures,
        Err(err) => {
            report.fixture_failed("matrix fixtures", &err);
            return report.finish();
        }
    };
    let params = [
        ("userId", bystander.id.as_str()),
        ("articleId", article.as_str()),
        ("eventId", event.as_str()),
    ];

    for endpoint in &ENDPOINTS {
        let mut observed: Vec<(Role, bool)> = Vec::with_capacity(Role::ALL.len());
        for role in Role::ALL {
            let user = users.get(role);
            let principal = Principal::Active {
                id: user.id.clone(),
                role,
            };
            let target = endpoint.targets_user().then_some(&bystander.id);
            let expected = authorize(&principal, endpoint, target);
            if endpoint.destructive && expected.primary == Access::Allow {
                continue;
            }
            let step = format!("{role} {}", endpoint.label());
            let body = match request_body(auth.factory(), endpoint) {
                Ok(body) => body,
                Err(err) => {
                    report.fixture_failed(step, &err);
                    continue;
                }
            };
            let client = match auth.create_authenticated_client(endpoint.service, user).await {
                Ok(client) => client,
                Err(err) => {
                    report.fixture_failed(step, &err);
                    continue;
                }
            };
            let (outcome, observation) =
                check(&client, endpoint, &params, body.as_ref(), &expected).await;
            if let Some(status) = observation.as_ref().and_then(|observation| observation.status()) {
                observed.push((role, Access::Allow.matches(status)));
            }
            report.record(step, outcome);
        }
        check_monotone(&mut report, endpoint, &observed);
    }
    report.finish()
}

/// Records a violation when a lower role succeeded where a higher one failed.
fn check_monotone(report: &mut ScenarioReport, endpoint: &Endpoint, observed: &[(Role, bool)]) {
    let inversion = observed.iter().enumerate().find_map(|(index, (lower, allowed))| {
        if !allowed {
            return None;
        }
        observed[index + 1..]
            .iter()
            .find(|(higher, higher_allowed)| higher > lower && !higher_allowed)
            .map(|(higher, _)| (*lower, *higher))
    });
    let step = format!("monotone {}", endpoint.label());
    match inversion {
        Some((lower, higher)) => report.record(
            step,
            StepOutcome::violation(
                endpoint.service.as_str(),
                endpoint.label(),
                format!("{higher} allowed where {lower} is"),
                format!("{higher} denied"),
            ),
        ),
        None => report.pass(step),
    }
}

/// Builds the request body a write endpoint needs.
fn request_body(factory: &TestDataFactory, endpoint: &Endpoint) -> Result<Option<Value>, HarnessError> {
    let body = match endpoint.id {
        EndpointId::ProfileUpdate => json!({ "profile": { "department": "Harness" } }),
        EndpointId::UserRoleChange => json!({ "role": Role::Student }),
        EndpointId::CourseCreate => factory.course(None)?,
        EndpointId::EventCreate => factory.event(None)?,
        EndpointId::NewsCreate => factory.article(None)?,
        EndpointId::NotificationCreate => factory.notification(None)?,
        _ => return Ok(None),
    };
    Ok(Some(body))
}
