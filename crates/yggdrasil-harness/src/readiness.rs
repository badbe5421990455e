// crates/yggdrasil-harness/src/readiness.rs
// ============================================================================
// Module: Readiness
// Description: Health polling across service clients.
// Purpose: Wait for services without arbitrary sleeps.
// Dependencies: tokio, tracing
// ============================================================================

use std::time::Duration;
use std::time::Instant;

use tokio::time::sleep;
use tracing::debug;

use crate::client::ApiClient;
use crate::error::HarnessError;

/// Delay between polling rounds.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Polls every client's health probe until all answer or `timeout` expires.
///
/// # Errors
///
/// Returns [`HarnessError::Unavailable`] naming the services still down.
pub async fn wait_for_services(clients: &[ApiClient], timeout: Duration) -> Result<(), HarnessError> {
    let start = Instant::now();
    let mut pending: Vec<&ApiClient> = clients.iter().collect();
    let mut rounds = 0u32;
    loop {
        rounds = rounds.saturating_add(1);
        let mut still_down = Vec::with_capacity(pending.len());
        for client in pending {
            if !client.health_check().await {
                still_down.push(client);
            }
        }
        pending = still_down;
        if pending.is_empty() {
            debug!(rounds, "all services ready");
            return Ok(());
        }
        if start.elapsed() > timeout {
            return Err(HarnessError::Unavailable(
                pending.iter().map(|client| client.label().to_string()).collect(),
            ));
        }
        sleep(POLL_INTERVAL).await;
    }
}
