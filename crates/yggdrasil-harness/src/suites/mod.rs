// crates/yggdrasil-harness/src/suites/mod.rs
// ============================================================================
// Module: Scenario Suites
// Description: Executable authorization-matrix scenarios.
// Purpose: Select, run, and aggregate suites into a single report.
// Dependencies: yggdrasil-core
// ============================================================================

//! ## Overview
//! Each suite is a plain async function over a [`FixtureContext`] that
//! returns [`ScenarioReport`]s. Suites never return errors: fixture and
//! environment failures become advisory steps, and only policy violations
//! make a report blocking.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod escalation;
pub mod hierarchy;
pub mod probe;
pub mod propagation;
pub mod toggles;
pub mod visibility;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use yggdrasil_core::EndpointId;
use yggdrasil_core::TestUser;

use crate::error::HarnessError;
use crate::fixture::FixtureContext;
use crate::report::ScenarioReport;
use crate::report::SuiteReport;

// ============================================================================
// SECTION: Suite Selection
// ============================================================================

/// Named scenario suites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuiteKind {
    /// Deactivation and deletion propagation.
    Propagation,
    /// Self-escalation and horizontal isolation.
    Escalation,
    /// Toggle alternation.
    Toggles,
    /// Role hierarchy matrix.
    Hierarchy,
    /// Content visibility filtering.
    Visibility,
}

impl SuiteKind {
    /// Every suite in run order.
    pub const ALL: [Self; 5] =
        [Self::Propagation, Self::Escalation, Self::Toggles, Self::Hierarchy, Self::Visibility];

    /// Returns the suite label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Propagation => "propagation",
            Self::Escalation => "escalation",
            Self::Toggles => "toggles",
            Self::Hierarchy => "hierarchy",
            Self::Visibility => "visibility",
        }
    }
}

impl fmt::Display for SuiteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SuiteKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| format!("unknown suite: {value}"))
    }
}

// ============================================================================
// SECTION: Runner
// ============================================================================

/// Runs one suite.
pub async fn run_suite(context: &FixtureContext, kind: SuiteKind) -> Vec<ScenarioReport> {
    match kind {
        SuiteKind::Propagation => propagation::run(context).await,
        SuiteKind::Escalation => {
            vec![
                escalation::self_escalation(context).await,
                escalation::horizontal_isolation(context).await,
            ]
        }
        SuiteKind::Toggles => vec![toggles::run(context).await],
        SuiteKind::Hierarchy => vec![hierarchy::run(context).await],
        SuiteKind::Visibility => vec![visibility::run(context).await],
    }
}

/// Runs `kinds` in order and aggregates the reports.
pub async fn run_all(context: &FixtureContext, kinds: &[SuiteKind]) -> SuiteReport {
    let mut report = SuiteReport::new();
    for kind in kinds {
        report.extend(run_suite(context, *kind).await);
    }
    report
}

// ============================================================================
// SECTION: Shared Fixtures
// ============================================================================

/// Creates a resource through `endpoint` as the admin actor; returns its id.
pub(crate) async fn seed_resource(
    context: &FixtureContext,
    endpoint: EndpointId,
    body: &Value,
) -> Result<String, HarnessError> {
    let admin = context.auth().admin_actor().await?;
    seed_resource_as(context, &admin, endpoint, body).await
}

/// Creates a resource through `endpoint` as `author`; returns its id.
pub(crate) async fn seed_resource_as(
    context: &FixtureContext,
    author: &TestUser,
    endpoint: EndpointId,
    body: &Value,
) -> Result<String, HarnessError> {
    let endpoint = endpoint.endpoint();
    let path = endpoint.render(&[])?;
    let client = context.auth().create_authenticated_client(endpoint.service, author).await?;
    let response = client
        .request(endpoint.method, &path, Some(body))
        .await
        .map_err(|err| HarnessError::api(format!("seed {} as {}", endpoint.label(), author.role), err))?;
    probe::resource_id(&response.data).ok_or_else(|| {
        HarnessError::Fixture(format!("{} returned no resource id", endpoint.label()))
    })
}
