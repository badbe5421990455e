// crates/yggdrasil-harness/src/suites/escalation.rs
// ============================================================================
// Module: Escalation Suite
// Description: Vertical and horizontal privilege escalation checks.
// Purpose: Prove a user can neither raise their own role nor read a peer.
// Dependencies: serde_json, yggdrasil-core
// ============================================================================

//! ## Overview
//! Self-escalation: every non-admin user asks the profile-update endpoint for
//! each higher role. Every attempt must be rejected with 403, and the role
//! must be unchanged both as the user service reports it and as stored.
//!
//! Horizontal isolation: two users of the same non-admin role; each must be
//! able to read their own record by id and must get 403 reading the other's.

use serde_json::Value;
use serde_json::json;
use yggdrasil_core::Access;
use yggdrasil_core::EndpointId;
use yggdrasil_core::Expectation;
use yggdrasil_core::Principal;
use yggdrasil_core::Role;
use yggdrasil_core::ServiceName;
use yggdrasil_core::TestUser;
use yggdrasil_core::authorize;
use yggdrasil_core::escalation_expectation;

use super::probe::check;
use crate::client::ApiClient;
use crate::fixture::FixtureContext;
use crate::report::ScenarioReport;
use crate::report::StepOutcome;

const SUITE: &str = "escalation";

/// Roles that have something to escalate to.
const NON_ADMIN: [Role; 3] = [Role::Student, Role::Teacher, Role::Staff];

// ============================================================================
// SECTION: Self Escalation
// ============================================================================

/// Every non-admin role tries to promote itself through its own profile.
pub async fn self_escalation(context: &FixtureContext) -> ScenarioReport {
    let mut report = ScenarioReport::new(SUITE, "self escalation");
    let datastore = match context.database().connect().await {
        Ok(()) => true,
        Err(err) => {
            report.record(
                "datastore connect",
                StepOutcome::EnvironmentUnavailable {
                    service: "datastore".to_string(),
                    reason: err.to_string(),
                },
            );
            false
        }
    };
    for role in NON_ADMIN {
        let user = match context.auth().create_test_user(role, None).await {
            Ok(user) => user,
            Err(err) => {
                report.fixture_failed(format!("create {role}"), &err);
                continue;
            }
        };
        let client = match context.auth().create_authenticated_client(ServiceName::User, &user).await {
            Ok(client) => client,
            Err(err) => {
                report.fixture_failed(format!("authenticate {role}"), &err);
                continue;
            }
        };
        let update = EndpointId::ProfileUpdate.endpoint();
        for requested in role.higher_roles() {
            let Some(access) = escalation_expectation(role, requested) else {
                continue;
            };
            let body = json!({ "role": requested });
            let (outcome, _) =
                check(&client, update, &[], Some(&body), &Expectation::exactly(access)).await;
            report.record(format!("{role} requests {requested}"), outcome);
        }
        verify_reported_role(&mut report, &client, &user).await;
        if datastore {
            verify_stored_role(&mut report, context, &user).await;
        }
    }
    report.finish()
}

async fn verify_reported_role(report: &mut ScenarioReport, client: &ApiClient, user: &TestUser) {
    let read = EndpointId::ProfileRead.endpoint();
    let (outcome, observation) =
        check(client, read, &[], None, &Expectation::exactly(Access::Allow)).await;
    let step = format!("{} profile role unchanged", user.role);
    let Some(data) = observation.as_ref().and_then(|observation| observation.data()) else {
        report.record(step, outcome);
        return;
    };
    match reported_role(data) {
        Some(role) if role == user.role => report.pass(step),
        Some(role) => report.record(
            step,
            StepOutcome::violation(
                read.service.as_str(),
                read.label(),
                format!("role {}", user.role),
                format!("role {role}"),
            ),
        ),
        None => report.record(
            step,
            StepOutcome::EnvironmentUnavailable {
                service: read.service.as_str().to_string(),
                reason: "profile reply carried no role".to_string(),
            },
        ),
    }
}

async fn verify_stored_role(report: &mut ScenarioReport, context: &FixtureContext, user: &TestUser) {
    let step = format!("{} stored role unchanged", user.role);
    match context.database().find_user(&user.id).await {
        Ok(Some(stored)) if stored.role == user.role => report.pass(step),
        Ok(Some(stored)) => report.record(
            step,
            StepOutcome::violation(
                "datastore",
                "stored role",
                format!("role {}", user.role),
                format!("role {}", stored.role),
            ),
        ),
        Ok(None) => report.record(
            step,
            StepOutcome::FixtureFailed {
                reason: format!("user {} missing from datastore", user.id),
            },
        ),
        Err(err) => report.record(
            step,
            StepOutcome::EnvironmentUnavailable {
                service: "datastore".to_string(),
                reason: err.to_string(),
            },
        ),
    }
}

/// Reads `role` or `user.role` from a profile reply.
fn reported_role(data: &Value) -> Option<Role> {
    [data.get("role"), data.get("user").and_then(|user| user.get("role"))]
        .into_iter()
        .flatten()
        .find_map(Value::as_str)
        .and_then(|role| role.parse().ok())
}

// ============================================================================
// SECTION: Horizontal Isolation
// ============================================================================

/// Two peers of each non-admin role try to read each other by id.
pub async fn horizontal_isolation(context: &FixtureContext) -> ScenarioReport {
    let mut report = ScenarioReport::new(SUITE, "horizontal isolation");
    let by_id = EndpointId::UserById.endpoint();
    for role in NON_ADMIN {
        let peers = match (
            context.auth().create_test_user(role, None).await,
            context.auth().create_test_user(role, None).await,
        ) {
            (Ok(first), Ok(second)) => [first, second],
            (Err(err), _) | (_, Err(err)) => {
                report.fixture_failed(format!("create {role} peers"), &err);
                continue;
            }
        };
        for (actor, target) in [(&peers[0], &peers[1]), (&peers[1], &peers[0])] {
            let client = match context.auth().create_authenticated_client(by_id.service, actor).await {
                Ok(client) => client,
                Err(err) => {
                    report.fixture_failed(format!("authenticate {role}"), &err);
                    continue;
                }
            };
            let principal = Principal::Active {
                id: actor.id.clone(),
                role,
            };
            for (subject, label) in [(actor, "self"), (target, "peer")] {
                let expected = authorize(&principal, by_id, Some(&subject.id));
                let params = [("userId", subject.id.as_str())];
                let (outcome, _) = check(&client, by_id, &params, None, &expected).await;
                report.record(format!("{role} reads {label} by id"), outcome);
            }
        }
    }
    report.finish()
}
