// crates/yggdrasil-harness/src/lib.rs
// ============================================================================
// Module: Yggdrasil Harness Library
// Description: Live-service half of the authorization harness.
// Purpose: Expose clients, fixtures, reports, and scenario suites.
// Dependencies: crate::{auth, client, database, error, fixture, mongo, readiness, report, store, suites}
// ============================================================================

//! ## Overview
//! The harness drives the services of a Yggdrasil deployment over HTTP and
//! compares what they answer with the expected authorization matrix from
//! `yggdrasil-core`. A [`FixtureContext`] bundles the identity helper, the
//! datastore side-channel, and a shared request transcript for one run;
//! [`suites::run_all`] turns a context into a [`SuiteReport`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod auth;
pub mod client;
pub mod database;
pub mod error;
pub mod fixture;
pub mod mongo;
pub mod readiness;
pub mod report;
pub mod store;
pub mod suites;


// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use auth::AuthHelper;
pub use auth::CleanupSummary;
pub use auth::Session;
pub use client::ApiClient;
pub use client::ApiResponse;
pub use client::RequestOptions;
pub use client::Transcript;
pub use client::TranscriptEntry;
pub use database::DatabaseHelper;
pub use error::ApiError;
pub use error::ErrorResponse;
pub use error::FailureCategory;
pub use error::HarnessError;
pub use error::TransportKind;
pub use fixture::FixtureContext;
pub use fixture::ReleaseSummary;
pub use fixture::with_fixtures;
pub use mongo::MongoUserStore;
pub use readiness::wait_for_services;
pub use report::OutcomeCounts;
pub use report::ScenarioReport;
pub use report::StepOutcome;
pub use report::StepReport;
pub use report::SuiteReport;
pub use report::Verdict;
pub use store::InMemoryUserStore;
pub use store::StoreError;
pub use store::StoredUser;
pub use store::UserPatch;
pub use store::UserStore;
pub use suites::SuiteKind;

// ============================================================================
// SECTION: Convenience
// ============================================================================

/// Builds one unauthenticated client per configured service.
///
/// # Errors
///
/// Returns [`ApiError::Transport`] when a client cannot be built.
pub fn service_clients(
    config: &yggdrasil_config::HarnessConfig,
    transcript: &Transcript,
) -> Result<Vec<ApiClient>, ApiError> {
    yggdrasil_core::ServiceName::ALL
        .into_iter()
        .map(|service| {
            ApiClient::for_service(config, service).map(|client| client.with_transcript(transcript.clone()))
        })
        .collect()
}
