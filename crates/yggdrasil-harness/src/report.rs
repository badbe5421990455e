// crates/yggdrasil-harness/src/report.rs
// ============================================================================
// Module: Suite Reports
// Description: Step outcomes, scenario reports, and the suite verdict.
// Purpose: Separate blocking security violations from advisory environment noise.
// Dependencies: serde, serde_json, tracing, yggdrasil-core
// ============================================================================

//! ## Overview
//! Every probe a scenario makes becomes a [`StepReport`]. A
//! [`SuiteReport`] folds them into one [`Verdict`]:
//! - `Blocking` when any step observed a security violation.
//! - `Advisory` when steps were lost to fixture or environment failures only.
//! - `Clean` otherwise.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::fmt::Write as _;

use serde::Serialize;
use tracing::info;
use tracing::warn;

use crate::error::FailureCategory;
use crate::error::HarnessError;

// ============================================================================
// SECTION: Outcomes
// ============================================================================

/// Result of one scenario step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    /// The service behaved as the policy requires.
    Pass,
    /// The service violated the policy.
    Violation {
        /// Service that answered.
        service: String,
        /// Endpoint label (`METHOD path`) or checked property.
        endpoint: String,
        /// Expected outcome.
        expected: String,
        /// Observed outcome.
        actual: String,
    },
    /// Fixture setup failed; the step never ran.
    FixtureFailed {
        /// Failure detail.
        reason: String,
    },
    /// The service was unreachable or answered unusably.
    EnvironmentUnavailable {
        /// Service (or datastore) involved.
        service: String,
        /// Failure detail.
        reason: String,
    },
}

impl StepOutcome {
    /// Builds a violation outcome.
    pub fn violation(
        service: impl Into<String>,
        endpoint: impl Into<String>,
        expected: impl fmt::Display,
        actual: impl fmt::Display,
    ) -> Self {
        Self::Violation {
            service: service.into(),
            endpoint: endpoint.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Classifies a harness error into a non-violation outcome.
    #[must_use]
    pub fn from_error(service: &str, err: &HarnessError) -> Self {
        match err.category() {
            FailureCategory::Transport => Self::EnvironmentUnavailable {
                service: service.to_string(),
                reason: err.to_string(),
            },
            FailureCategory::Assertion
            | FailureCategory::Fixture
            | FailureCategory::Cleanup
            | FailureCategory::Config => Self::FixtureFailed {
                reason: err.to_string(),
            },
        }
    }

    /// Returns true for [`StepOutcome::Pass`].
    #[must_use]
    pub const fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }

    /// Returns true for [`StepOutcome::Violation`].
    #[must_use]
    pub const fn is_violation(&self) -> bool {
        matches!(self, Self::Violation { .. })
    }

    const fn verdict(&self) -> Verdict {
        match self {
            Self::Pass => Verdict::Clean,
            Self::Violation { .. } => Verdict::Blocking,
            Self::FixtureFailed { .. } | Self::EnvironmentUnavailable { .. } => Verdict::Advisory,
        }
    }
}

/// One recorded step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    /// Step description.
    pub name: String,
    /// Step result.
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

// ============================================================================
// SECTION: Verdict
// ============================================================================

/// Aggregate run verdict, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Every step passed.
    Clean,
    /// Only environment or fixture failures occurred.
    Advisory,
    /// At least one security violation occurred.
    Blocking,
}

impl Verdict {
    /// Returns the verdict label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Clean => "clean",
            Self::Advisory => "advisory",
            Self::Blocking => "blocking",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Scenario Report
// ============================================================================

/// Steps recorded by one scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioReport {
    /// Owning suite.
    pub suite: String,
    /// Scenario name.
    pub name: String,
    /// Recorded steps, in execution order.
    pub steps: Vec<StepReport>,
}

impl ScenarioReport {
    /// Creates an empty scenario report.
    pub fn new(suite: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            suite: suite.into(),
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Records a step.
    pub fn record(&mut self, name: impl Into<String>, outcome: StepOutcome) {
        let name = name.into();
        if outcome.is_violation() {
            warn!(suite = %self.suite, scenario = %self.name, step = %name, ?outcome, "policy violation");
        }
        self.steps.push(StepReport {
            name,
            outcome,
        });
    }

    /// Records a passing step.
    pub fn pass(&mut self, name: impl Into<String>) {
        self.record(name, StepOutcome::Pass);
    }

    /// Records a fixture failure.
    pub fn fixture_failed(&mut self, name: impl Into<String>, err: &HarnessError) {
        let name = name.into();
        warn!(suite = %self.suite, scenario = %self.name, step = %name, error = %err, "fixture failed");
        self.steps.push(StepReport {
            name,
            outcome: StepOutcome::from_error("fixture", err),
        });
    }

    /// Returns the scenario verdict.
    #[must_use]
    pub fn verdict(&self) -> Verdict {
        self.steps.iter().map(|step| step.outcome.verdict()).max().unwrap_or(Verdict::Clean)
    }

    /// Returns the violating steps.
    pub fn violations(&self) -> impl Iterator<Item = &StepReport> {
        self.steps.iter().filter(|step| step.outcome.is_violation())
    }

    /// Logs the scenario verdict and returns the report.
    #[must_use]
    pub fn finish(self) -> Self {
        info!(
            suite = %self.suite,
            scenario = %self.name,
            steps = self.steps.len(),
            verdict = %self.verdict(),
            "scenario finished"
        );
        self
    }
}

// ============================================================================
// SECTION: Suite Report
// ============================================================================

/// Step counts per outcome class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeCounts {
    /// Passing steps.
    pub passed: usize,
    /// Violations.
    pub violations: usize,
    /// Fixture failures.
    pub fixture_failures: usize,
    /// Environment failures.
    pub environment_failures: usize,
}

/// Aggregated report across scenarios.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SuiteReport {
    /// Scenario reports, in execution order.
    pub scenarios: Vec<ScenarioReport>,
}

impl SuiteReport {
    /// Creates an empty report.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            scenarios: Vec::new(),
        }
    }

    /// Appends a scenario report.
    pub fn push(&mut self, scenario: ScenarioReport) {
        self.scenarios.push(scenario);
    }

    /// Returns the run verdict.
    #[must_use]
    pub fn verdict(&self) -> Verdict {
        self.scenarios.iter().map(ScenarioReport::verdict).max().unwrap_or(Verdict::Clean)
    }

    /// Returns step counts per outcome class.
    #[must_use]
    pub fn counts(&self) -> OutcomeCounts {
        let mut counts = OutcomeCounts::default();
        for step in self.scenarios.iter().flat_map(|scenario| &scenario.steps) {
            match step.outcome {
                StepOutcome::Pass => counts.passed += 1,
                StepOutcome::Violation { .. } => counts.violations += 1,
                StepOutcome::FixtureFailed { .. } => counts.fixture_failures += 1,
                StepOutcome::EnvironmentUnavailable { .. } => counts.environment_failures += 1,
            }
        }
        counts
    }

    /// Serializes the report with verdict and counts for CI consumption.
    ///
    /// # Errors
    ///
    /// Returns [`serde_json::Error`] when serialization fails.
    pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        Ok(serde_json::json!({
            "verdict": self.verdict(),
            "counts": self.counts(),
            "scenarios": serde_json::to_value(&self.scenarios)?,
        }))
    }

    /// Renders a human-readable summary listing every non-passing step.
    #[must_use]
    pub fn render_text(&self) -> String {
        let counts = self.counts();
        let mut out = format!(
            "verdict: {} (passed {}, violations {}, fixture failures {}, environment failures {})\n",
            self.verdict(),
            counts.passed,
            counts.violations,
            counts.fixture_failures,
            counts.environment_failures
        );
        for scenario in &self.scenarios {
            let _ = writeln!(out, "[{}] {}/{}", scenario.verdict(), scenario.suite, scenario.name);
            for step in scenario.steps.iter().filter(|step| !step.outcome.is_pass()) {
                let detail = match &step.outcome {
                    StepOutcome::Pass => continue,
                    StepOutcome::Violation {
                        service,
                        endpoint,
                        expected,
                        actual,
                    } => format!("VIOLATION {service} {endpoint}: expected {expected}, got {actual}"),
                    StepOutcome::FixtureFailed {
                        reason,
                    } => format!("fixture failed: {reason}"),
                    StepOutcome::EnvironmentUnavailable {
                        service,
                        reason,
                    } => format!("{service} unavailable: {reason}"),
                };
                let _ = writeln!(out, "  - {}: {detail}", step.name);
            }
        }
        out
    }
}

impl Extend<ScenarioReport> for SuiteReport {
    fn extend<I: IntoIterator<Item = ScenarioReport>>(&mut self, iter: I) {
        self.scenarios.extend(iter);
    }
}
