// crates/yggdrasil-harness/src/suites/toggles.rs
// ============================================================================
// Module: Toggle Suite
// Description: Like, pin, and attendance toggles must alternate.
// Purpose: Catch toggles that accumulate instead of flipping.
// Dependencies: serde_json, yggdrasil-core
// ============================================================================

//! ## Overview
//! For each catalogue toggle, the admin actor seeds the target resource and
//! the least-privileged role allowed to toggle calls it three times. The actor
//! first reads the flag's current value (article by id for likes and pins,
//! the event listing for attendance); every call must then report the
//! opposite of the previous value. When the flag is absent from the read, the
//! first call only establishes the starting value.

use serde_json::Value;
use yggdrasil_core::Access;
use yggdrasil_core::ENDPOINTS;
use yggdrasil_core::Endpoint;
use yggdrasil_core::EndpointId;
use yggdrasil_core::Expectation;
use yggdrasil_core::Principal;
use yggdrasil_core::Role;
use yggdrasil_core::UserId;
use yggdrasil_core::authorize;

use super::probe::check;
use super::probe::list_items;
use super::probe::resource_id;
use super::seed_resource;
use crate::client::ApiClient;
use crate::error::HarnessError;
use crate::fixture::FixtureContext;
use crate::report::ScenarioReport;
use crate::report::StepOutcome;

const SUITE: &str = "toggles";

/// Toggle calls made per endpoint.
const CALLS: usize = 3;

/// Runs every catalogue toggle.
pub async fn run(context: &FixtureContext) -> ScenarioReport {
    let mut report = ScenarioReport::new(SUITE, "toggle alternation");
    for endpoint in ENDPOINTS.iter().filter(|endpoint| endpoint.toggle_field.is_some()) {
        toggle(context, &mut report, endpoint).await;
    }
    report.finish()
}

async fn toggle(context: &FixtureContext, report: &mut ScenarioReport, endpoint: &'static Endpoint) {
    let Some(field) = endpoint.toggle_field else {
        return;
    };
    let label = endpoint.label();
    let Some(role) = least_privileged(endpoint) else {
        report.record(
            format!("{label} actor"),
            StepOutcome::FixtureFailed {
                reason: "no role may call this toggle".to_string(),
            },
        );
        return;
    };
    let resource = match seed_target(context, endpoint.id).await {
        Ok(resource) => resource,
        Err(err) => {
            report.fixture_failed(format!("{label} seed"), &err);
            return;
        }
    };
    let actor = match context.auth().create_test_user(role, None).await {
        Ok(actor) => actor,
        Err(err) => {
            report.fixture_failed(format!("{label} actor"), &err);
            return;
        }
    };
    let client = match context.auth().create_authenticated_client(endpoint.service, &actor).await {
        Ok(client) => client,
        Err(err) => {
            report.fixture_failed(format!("{label} authenticate"), &err);
            return;
        }
    };
    let params: Vec<(&str, &str)> =
        endpoint.path_params().into_iter().map(|name| (name, resource.as_str())).collect();
    let expected = Expectation::exactly(Access::Allow);
    let mut previous = current_state(&client, endpoint.id, field, &resource).await;
    for call in 1..=CALLS {
        let step = format!("{label} call {call} by {role}");
        let (outcome, observation) = check(&client, endpoint, &params, None, &expected).await;
        if !outcome.is_pass() {
            report.record(step, outcome);
            return;
        }
        let observed = observation
            .as_ref()
            .and_then(|observation| observation.data())
            .and_then(|data| toggle_state(data, field));
        match flip(previous, observed) {
            Ok(state) => {
                report.pass(step);
                previous = Some(state);
            }
            Err(expected_state) => {
                let expected_state = expected_state
                    .map_or_else(|| format!("{field} present"), |state| format!("{field}={state}"));
                let actual =
                    observed.map_or_else(|| format!("{field} missing"), |value| format!("{field}={value}"));
                report.record(
                    step,
                    StepOutcome::violation(endpoint.service.as_str(), label.clone(), expected_state, actual),
                );
                return;
            }
        }
    }
}

/// Checks one call's reported flag against the value before it.
///
/// Returns the new value, or the value the call should have reported.
fn flip(previous: Option<bool>, observed: Option<bool>) -> Result<bool, Option<bool>> {
    match (previous, observed) {
        (Some(before), Some(after)) if after == before => Err(Some(!before)),
        (_, Some(after)) => Ok(after),
        (before, None) => Err(before.map(|state| !state)),
    }
}

/// Reads the caller's current flag value for `resource`, if exposed.
async fn current_state(
    client: &ApiClient,
    toggle: EndpointId,
    field: &str,
    resource: &str,
) -> Option<bool> {
    let reader = match toggle {
        EndpointId::EventAttendance => EndpointId::EventsList,
        _ => EndpointId::NewsById,
    }
    .endpoint();
    let params: Vec<(&str, &str)> = reader.path_params().into_iter().map(|name| (name, resource)).collect();
    let path = reader.render(&params).ok()?;
    let response = client.request(reader.method, &path, None).await.ok()?;
    if reader.path_params().is_empty() {
        list_items(&response.data)
            .into_iter()
            .find(|item| resource_id(item).as_deref() == Some(resource))
            .and_then(|item| toggle_state(item, field))
    } else {
        toggle_state(&response.data, field)
    }
}

/// Returns the lowest role the catalogue allows on `endpoint`.
fn least_privileged(endpoint: &Endpoint) -> Option<Role> {
    let probe = UserId::new("toggle-actor");
    Role::ALL.into_iter().find(|role| {
        let principal = Principal::Active {
            id: probe.clone(),
            role: *role,
        };
        authorize(&principal, endpoint, None).primary == Access::Allow
    })
}

async fn seed_target(context: &FixtureContext, toggle: EndpointId) -> Result<String, HarnessError> {
    let factory = context.auth().factory();
    match toggle {
        EndpointId::EventAttendance => {
            seed_resource(context, EndpointId::EventCreate, &factory.event(None)?).await
        }
        _ => seed_resource(context, EndpointId::NewsCreate, &factory.article(None)?).await,
    }
}

/// Reads the flag from `field` or `data.<field>`.
fn toggle_state(data: &Value, field: &str) -> Option<bool> {
    data.get(field)
        .or_else(|| data.get("data").and_then(|inner| inner.get(field)))
        .and_then(Value::as_bool)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
