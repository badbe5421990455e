// crates/yggdrasil-harness/src/suites/propagation.rs
// ============================================================================
// Module: Propagation Suite
// Description: Deactivation and deletion must revoke live tokens everywhere.
// Purpose: Catch services that trust a token without re-reading user state.
// Dependencies: yggdrasil-core
// ============================================================================

//! ## Overview
//! A fresh user obtains one client per service, all carrying the same token.
//! Each baseline read must succeed; then the user is deactivated or deleted,
//! either directly in the datastore or through the admin API, and the exact
//! same calls are repeated with the original token. Every service must now
//! answer 401. For deletion, the user's own by-id lookup may also answer 404.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use yggdrasil_core::Endpoint;
use yggdrasil_core::EndpointId;
use yggdrasil_core::Principal;
use yggdrasil_core::Role;
use yggdrasil_core::ServiceName;
use yggdrasil_core::TestUser;
use yggdrasil_core::authorize;
use yggdrasil_core::baseline_endpoints;

use super::probe::check;
use crate::client::ApiClient;
use crate::error::HarnessError;
use crate::fixture::FixtureContext;
use crate::report::ScenarioReport;
use crate::report::StepOutcome;

// ============================================================================
// SECTION: Types
// ============================================================================

const SUITE: &str = "propagation";

/// Services touched by the single-user walkthrough.
pub const WALKTHROUGH_SERVICES: [ServiceName; 6] = [
    ServiceName::Auth,
    ServiceName::User,
    ServiceName::Course,
    ServiceName::News,
    ServiceName::Planning,
    ServiceName::Statistics,
];

/// State change applied behind the user's token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mutation {
    /// Set `isActive = false`.
    Deactivate,
    /// Remove the record.
    Delete,
}

/// Path the mutation takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Direct datastore write.
    Datastore,
    /// Admin call through the user service.
    Api,
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Deactivate => "deactivate",
            Self::Delete => "delete",
        })
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Datastore => "datastore",
            Self::Api => "api",
        })
    }
}

// ============================================================================
// SECTION: Suite
// ============================================================================

/// Runs every role through both mutations over every reachable channel.
pub async fn run(context: &FixtureContext) -> Vec<ScenarioReport> {
    let mut channels = vec![Channel::Api];
    let mut reports = Vec::new();
    match context.database().connect().await {
        Ok(()) => channels.insert(0, Channel::Datastore),
        Err(err) => {
            let mut report = ScenarioReport::new(SUITE, "datastore channel");
            report.record(
                "connect",
                StepOutcome::EnvironmentUnavailable {
                    service: "datastore".to_string(),
                    reason: err.to_string(),
                },
            );
            reports.push(report.finish());
        }
    }
    for role in Role::ALL {
        for mutation in [Mutation::Deactivate, Mutation::Delete] {
            for channel in &channels {
                reports.push(scenario(context, role, mutation, *channel, &ServiceName::ALL).await);
            }
        }
    }
    reports
}

/// Student walkthrough: six baseline reads, a datastore deactivation, and
/// the same six reads again.
pub async fn walkthrough(context: &FixtureContext) -> ScenarioReport {
    scenario(context, Role::Student, Mutation::Deactivate, Channel::Datastore, &WALKTHROUGH_SERVICES)
        .await
}

/// Runs one propagation scenario over the baseline endpoints of `services`.
pub async fn scenario(
    context: &FixtureContext,
    role: Role,
    mutation: Mutation,
    channel: Channel,
    services: &[ServiceName],
) -> ScenarioReport {
    let mut report = ScenarioReport::new(SUITE, format!("{mutation} {role} via {channel}"));
    let user = match context.auth().create_test_user(role, None).await {
        Ok(user) => user,
        Err(err) => {
            report.fixture_failed("create user", &err);
            return report.finish();
        }
    };
    let mut probes: Vec<&'static Endpoint> = baseline_endpoints()
        .into_iter()
        .filter(|endpoint| services.contains(&endpoint.service))
        .collect();
    if mutation == Mutation::Delete && services.contains(&ServiceName::User) {
        probes.push(EndpointId::UserById.endpoint());
    }
    let clients = match clients_for(context, &user, &probes).await {
        Ok(clients) => clients,
        Err(err) => {
            report.fixture_failed("authenticate", &err);
            return report.finish();
        }
    };

    let active = Principal::Active {
        id: user.id.clone(),
        role,
    };
    probe_all(&mut report, "before", &clients, &probes, &active, &user).await;

    if let Err(err) = mutate(context, &user, mutation, channel).await {
        report.fixture_failed(format!("{mutation} via {channel}"), &err);
        return report.finish();
    }

    let revoked = match mutation {
        Mutation::Deactivate => Principal::Inactive {
            id: user.id.clone(),
        },
        Mutation::Delete => Principal::Deleted {
            id: user.id.clone(),
        },
    };
    probe_all(&mut report, "after", &clients, &probes, &revoked, &user).await;
    report.finish()
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

async fn clients_for(
    context: &FixtureContext,
    user: &TestUser,
    probes: &[&'static Endpoint],
) -> Result<BTreeMap<ServiceName, ApiClient>, HarnessError> {
    let mut clients = BTreeMap::new();
    for endpoint in probes {
        if !clients.contains_key(&endpoint.service) {
            let client = context.auth().create_authenticated_client(endpoint.service, user).await?;
            clients.insert(endpoint.service, client);
        }
    }
    Ok(clients)
}

async fn probe_all(
    report: &mut ScenarioReport,
    phase: &str,
    clients: &BTreeMap<ServiceName, ApiClient>,
    probes: &[&'static Endpoint],
    principal: &Principal,
    user: &TestUser,
) {
    let params = [("userId", user.id.as_str())];
    for endpoint in probes {
        let Some(client) = clients.get(&endpoint.service) else {
            continue;
        };
        let target = endpoint.targets_user().then_some(&user.id);
        let expected = authorize(principal, endpoint, target);
        let (outcome, _) = check(client, endpoint, &params, None, &expected).await;
        report.record(format!("{phase}: {}", endpoint.label()), outcome);
    }
}

async fn mutate(
    context: &FixtureContext,
    user: &TestUser,
    mutation: Mutation,
    channel: Channel,
) -> Result<(), HarnessError> {
    match channel {
        Channel::Datastore => {
            let database = context.database();
            database.connect().await?;
            match mutation {
                Mutation::Deactivate => database.deactivate_user(&user.id).await?,
                Mutation::Delete => database.delete_user(&user.id).await?,
            }
        }
        Channel::Api => match mutation {
            Mutation::Deactivate => context.auth().deactivate_user(&user.id).await?,
            Mutation::Delete => context.auth().delete_user(&user.id).await?,
        },
    }
    Ok(())
}
