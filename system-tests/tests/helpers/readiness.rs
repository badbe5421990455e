// system-tests/tests/helpers/readiness.rs
// ============================================================================
// Module: Readiness Helpers
// Description: Readiness probes for the platform stub.
// Purpose: Ensure every stub service answers before suites start.
// Dependencies: yggdrasil-harness
// ============================================================================

use std::time::Duration;

use yggdrasil_harness::FixtureContext;
use yggdrasil_harness::service_clients;
use yggdrasil_harness::wait_for_services;

use super::timeouts::resolve_timeout;

/// Polls every configured service's health endpoint until all answer.
pub async fn wait_for_platform(context: &FixtureContext, timeout: Duration) -> Result<(), String> {
    let clients = service_clients(context.config(), context.transcript())
        .map_err(|err| format!("cannot build service clients: {err}"))?;
    wait_for_services(&clients, resolve_timeout(timeout))
        .await
        .map_err(|err| format!("platform readiness failed: {err}"))
}
