// crates/yggdrasil-harness/src/database.rs
// ============================================================================
// Module: Database Helper
// Description: Connection-owning wrapper around the datastore side-channel.
// Purpose: Force user state changes the HTTP API does not expose.
// Dependencies: tracing, yggdrasil-config, yggdrasil-core
// ============================================================================

//! ## Overview
//! [`DatabaseHelper`] owns at most one [`UserStore`] connection for a fixture
//! context. Scenarios use it to deactivate or hard-delete a user behind the
//! services' backs and then check that every service notices on the next
//! request.
//!
//! Security posture: the helper bypasses all business-rule validation. It is
//! only ever pointed at test datastores, and purges touch nothing outside
//! [`TEST_EMAIL_DOMAIN`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use tracing::debug;
use tracing::info;
use yggdrasil_config::DatabaseConfig;
use yggdrasil_core::TEST_EMAIL_DOMAIN;
use yggdrasil_core::UserId;

use crate::mongo::MongoUserStore;
use crate::store::StoreError;
use crate::store::StoredUser;
use crate::store::UserPatch;
use crate::store::UserStore;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Where connections come from.
enum StoreSource {
    /// Build a MongoDB client on connect.
    Mongo {
        config: DatabaseConfig,
        timeout: Duration,
    },
    /// Reuse a caller-supplied store.
    Shared(Arc<dyn UserStore>),
}

/// Datastore side-channel for one fixture context.
///
/// # Invariants
/// - At most one live connection exists; `connect` is idempotent.
/// - `cleanup_test_data` is a no-op when cleanup is disabled.
pub struct DatabaseHelper {
    source: StoreSource,
    cleanup: bool,
    active: Mutex<Option<Arc<dyn UserStore>>>,
}

impl std::fmt::Debug for DatabaseHelper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let source = match &self.source {
            StoreSource::Mongo { config, .. } => config.redacted_uri(),
            StoreSource::Shared(_) => "shared".to_string(),
        };
        f.debug_struct("DatabaseHelper")
            .field("source", &source)
            .field("cleanup", &self.cleanup)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl DatabaseHelper {
    /// Creates a helper that connects to MongoDB on demand.
    #[must_use]
    pub fn new(config: DatabaseConfig, timeout: Duration) -> Self {
        let cleanup = config.cleanup;
        Self {
            source: StoreSource::Mongo {
                config,
                timeout,
            },
            cleanup,
            active: Mutex::new(None),
        }
    }

    /// Creates a helper over an existing store.
    #[must_use]
    pub fn with_store(store: Arc<dyn UserStore>, cleanup: bool) -> Self {
        Self {
            source: StoreSource::Shared(store),
            cleanup,
            active: Mutex::new(None),
        }
    }

    /// Opens (or reuses) the connection and verifies it with a ping.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] when the datastore cannot be reached.
    pub async fn connect(&self) -> Result<(), StoreError> {
        if self.is_connected() {
            return Ok(());
        }
        let store: Arc<dyn UserStore> = match &self.source {
            StoreSource::Mongo {
                config,
                timeout,
            } => Arc::new(MongoUserStore::connect(config, *timeout).await?),
            StoreSource::Shared(store) => Arc::clone(store),
        };
        store.ping().await?;
        let mut guard = self.slot()?;
        if guard.is_none() {
            *guard = Some(store);
            debug!("datastore connected");
        }
        Ok(())
    }

    /// Closes the connection; safe to call when not connected.
    pub async fn disconnect(&self) {
        let store = self.active.lock().ok().and_then(|mut guard| guard.take());
        if let Some(store) = store {
            store.close().await;
            debug!("datastore disconnected");
        }
    }

    /// Returns true while a connection is held.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.active.lock().is_ok_and(|guard| guard.is_some())
    }

    /// Returns whether `cleanup_test_data` actually deletes.
    #[must_use]
    pub const fn cleanup_enabled(&self) -> bool {
        self.cleanup
    }

    /// Applies `patch` directly to a stored user.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no record matched, or the
    /// store's failure otherwise.
    pub async fn update_user(&self, id: &UserId, patch: &UserPatch) -> Result<(), StoreError> {
        if patch.is_empty() {
            return Ok(());
        }
        if self.store()?.update_user(id, patch).await? {
            Ok(())
        } else {
            Err(StoreError::NotFound(id.clone()))
        }
    }

    /// Forces `isActive = false` on a stored user.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the update fails or no record matched.
    pub async fn deactivate_user(&self, id: &UserId) -> Result<(), StoreError> {
        self.update_user(id, &UserPatch::deactivate()).await
    }

    /// Hard-deletes a stored user.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no record matched.
    pub async fn delete_user(&self, id: &UserId) -> Result<(), StoreError> {
        if self.store()?.delete_user(id).await? {
            Ok(())
        } else {
            Err(StoreError::NotFound(id.clone()))
        }
    }

    /// Loads a stored user.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when not connected or the query fails.
    pub async fn find_user(&self, id: &UserId) -> Result<Option<StoredUser>, StoreError> {
        self.store()?.find_user(id).await
    }

    /// Deletes every fixture account; returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when not connected or the purge fails.
    pub async fn cleanup_test_data(&self) -> Result<u64, StoreError> {
        if !self.cleanup {
            return Ok(0);
        }
        let removed = self.store()?.delete_users_in_domain(TEST_EMAIL_DOMAIN).await?;
        info!(removed, domain = TEST_EMAIL_DOMAIN, "purged fixture accounts");
        Ok(removed)
    }

    fn store(&self) -> Result<Arc<dyn UserStore>, StoreError> {
        self.slot()?.as_ref().map(Arc::clone).ok_or(StoreError::NotConnected)
    }

    fn slot(&self) -> Result<std::sync::MutexGuard<'_, Option<Arc<dyn UserStore>>>, StoreError> {
        self.active.lock().map_err(|_| StoreError::Query("datastore slot mutex poisoned".to_string()))
    }
}
