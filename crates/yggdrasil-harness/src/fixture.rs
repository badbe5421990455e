// crates/yggdrasil-harness/src/fixture.rs
// ============================================================================
// Module: Fixture Context
// Description: Per-run bundle of config, identity helper, and datastore helper.
// Purpose: Scope fixtures to a run and always release them.
// Dependencies: tokio, tracing, yggdrasil-config, yggdrasil-core
// ============================================================================

//! ## Overview
//! A [`FixtureContext`] is built once per run and passed explicitly to every
//! scenario. [`with_fixtures`] runs a scenario on its own task and releases
//! the context afterwards whether the scenario returned, failed, or panicked;
//! a panic is re-raised after release.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::future::Future;
use std::panic::resume_unwind;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;
use tracing::warn;
use yggdrasil_config::HarnessConfig;
use yggdrasil_core::TestDataFactory;

use crate::auth::AuthHelper;
use crate::auth::CleanupSummary;
use crate::client::Transcript;
use crate::database::DatabaseHelper;
use crate::error::HarnessError;
use crate::store::UserStore;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Outcome of [`FixtureContext::release`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReleaseSummary {
    /// Users removed through the API.
    pub users: CleanupSummary,
    /// Fixture accounts purged from the datastore.
    pub purged: u64,
    /// Swallowed teardown errors.
    pub errors: Vec<String>,
}

/// Fixture resources for one run.
#[derive(Debug)]
pub struct FixtureContext {
    config: Arc<HarnessConfig>,
    auth: AuthHelper,
    database: DatabaseHelper,
    transcript: Transcript,
}

impl FixtureContext {
    /// Creates a context whose datastore helper targets MongoDB.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError`] when HTTP clients cannot be built.
    pub fn new(config: HarnessConfig) -> Result<Self, HarnessError> {
        let database = DatabaseHelper::new(config.database.clone(), config.timeouts.database);
        Self::assemble(config, database, TestDataFactory::new())
    }

    /// Creates a context over a caller-supplied store and factory.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError`] when HTTP clients cannot be built.
    pub fn with_store(
        config: HarnessConfig,
        store: Arc<dyn UserStore>,
        factory: TestDataFactory,
    ) -> Result<Self, HarnessError> {
        let database = DatabaseHelper::with_store(store, config.database.cleanup);
        Self::assemble(config, database, factory)
    }

    fn assemble(
        config: HarnessConfig,
        database: DatabaseHelper,
        factory: TestDataFactory,
    ) -> Result<Self, HarnessError> {
        let config = Arc::new(config);
        let transcript = Transcript::new();
        let auth = AuthHelper::new(Arc::clone(&config), factory, transcript.clone())?;
        Ok(Self {
            config,
            auth,
            database,
            transcript,
        })
    }

    /// Returns the resolved configuration.
    #[must_use]
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Returns the identity helper.
    #[must_use]
    pub const fn auth(&self) -> &AuthHelper {
        &self.auth
    }

    /// Returns the datastore helper.
    #[must_use]
    pub const fn database(&self) -> &DatabaseHelper {
        &self.database
    }

    /// Returns the transcript shared by every client of this context.
    #[must_use]
    pub const fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Releases fixtures: deletes created users, purges fixture accounts,
    /// and disconnects. Never fails.
    pub async fn release(&self) -> ReleaseSummary {
        let mut summary = ReleaseSummary {
            users: self.auth.cleanup().await,
            ..ReleaseSummary::default()
        };
        if self.database.is_connected() {
            match self.database.cleanup_test_data().await {
                Ok(purged) => summary.purged = purged,
                Err(err) => summary.errors.push(format!("datastore purge: {err}")),
            }
            self.database.disconnect().await;
        }
        if summary.users.failed > 0 {
            summary.errors.push(format!("{} fixture users not deleted", summary.users.failed));
        }
        for error in &summary.errors {
            warn!(error = %error, "fixture release error");
        }
        summary
    }
}

// ============================================================================
// SECTION: Scoped Execution
// ============================================================================

/// Runs `scenario` with `context`, always releasing the context afterwards.
///
/// # Errors
///
/// Returns the scenario's error, or [`HarnessError::Fixture`] when the
/// scenario task was cancelled.
///
/// # Panics
///
/// Re-raises a panic from `scenario` after release completes.
pub async fn with_fixtures<F, Fut, T>(
    context: Arc<FixtureContext>,
    scenario: F,
) -> Result<(T, ReleaseSummary), HarnessError>
where
    F: FnOnce(Arc<FixtureContext>) -> Fut,
    Fut: Future<Output = Result<T, HarnessError>> + Send + 'static,
    T: Send + 'static,
{
    let joined = tokio::spawn(scenario(Arc::clone(&context))).await;
    let released = context.release().await;
    info!(
        deleted = released.users.deleted,
        failed = released.users.failed,
        purged = released.purged,
        "fixtures released"
    );
    match joined {
        Ok(result) => result.map(|value| (value, released)),
        Err(err) if err.is_panic() => resume_unwind(err.into_panic()),
        Err(err) => Err(HarnessError::Fixture(format!("scenario task cancelled: {err}"))),
    }
}
