// crates/yggdrasil-harness/src/store.rs
// ============================================================================
// Module: User Store
// Description: Datastore seam for out-of-band user mutation.
// Purpose: Abstract the direct datastore side-channel behind one trait.
// Dependencies: async-trait, yggdrasil-core
// ============================================================================

//! ## Overview
//! [`UserStore`] is the side-channel the harness uses to change user state
//! without going through any service's HTTP API. Backends:
//! - [`crate::mongo::MongoUserStore`] talks to the platform's datastore.
//! - [`InMemoryUserStore`] is shared with in-process stub services so that
//!   out-of-band mutations are visible to them on the very next request.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use yggdrasil_core::Role;
use yggdrasil_core::UserId;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Datastore errors.
///
/// # Invariants
/// - [`StoreError::Unavailable`] is the only variant classified as transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The datastore could not be reached.
    #[error("datastore unavailable: {0}")]
    Unavailable(String),
    /// No connection has been established.
    #[error("datastore not connected")]
    NotConnected,
    /// The addressed user does not exist.
    #[error("user not found: {0}")]
    NotFound(UserId),
    /// A query was rejected or returned malformed data.
    #[error("datastore query failed: {0}")]
    Query(String),
}

impl StoreError {
    /// Returns true when the failure means the datastore is unreachable.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Persisted user record as seen by the harness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredUser {
    /// User identifier.
    pub id: UserId,
    /// Login email.
    pub email: String,
    /// Current role.
    pub role: Role,
    /// Whether the account is active.
    pub is_active: bool,
}

/// Partial update applied directly to a stored user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserPatch {
    /// New active flag.
    pub is_active: Option<bool>,
    /// New role.
    pub role: Option<Role>,
}

impl UserPatch {
    /// Patch that deactivates the account.
    #[must_use]
    pub const fn deactivate() -> Self {
        Self {
            is_active: Some(false),
            role: None,
        }
    }

    /// Patch that reactivates the account.
    #[must_use]
    pub const fn reactivate() -> Self {
        Self {
            is_active: Some(true),
            role: None,
        }
    }

    /// Patch that changes the role.
    #[must_use]
    pub const fn role(role: Role) -> Self {
        Self {
            is_active: None,
            role: Some(role),
        }
    }

    /// Returns true when the patch changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.is_active.is_none() && self.role.is_none()
    }

    /// Applies the patch to a record.
    pub fn apply(&self, user: &mut StoredUser) {
        if let Some(active) = self.is_active {
            user.is_active = active;
        }
        if let Some(role) = self.role {
            user.role = role;
        }
    }
}

// ============================================================================
// SECTION: Store Trait
// ============================================================================

/// Direct datastore access for user records.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Verifies the datastore is reachable.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Loads a user record.
    async fn find_user(&self, id: &UserId) -> Result<Option<StoredUser>, StoreError>;

    /// Applies a patch; returns false when no record matched.
    async fn update_user(&self, id: &UserId, patch: &UserPatch) -> Result<bool, StoreError>;

    /// Hard-deletes a record; returns false when no record matched.
    async fn delete_user(&self, id: &UserId) -> Result<bool, StoreError>;

    /// Deletes every user whose email ends with `@{email_domain}`.
    async fn delete_users_in_domain(&self, email_domain: &str) -> Result<u64, StoreError>;

    /// Releases backend resources.
    async fn close(&self) {}
}

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// Process-local user store shared by reference.
#[derive(Debug, Clone, Default)]
pub struct InMemoryUserStore {
    users: Arc<Mutex<BTreeMap<UserId, StoredUser>>>,
}

impl InMemoryUserStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Query`] when the store mutex is poisoned.
    pub fn insert(&self, user: StoredUser) -> Result<(), StoreError> {
        self.lock()?.insert(user.id.clone(), user);
        Ok(())
    }

    /// Returns a copy of a record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Query`] when the store mutex is poisoned.
    pub fn get(&self, id: &UserId) -> Result<Option<StoredUser>, StoreError> {
        Ok(self.lock()?.get(id).cloned())
    }

    /// Finds a record by email.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Query`] when the store mutex is poisoned.
    pub fn find_by_email(&self, email: &str) -> Result<Option<StoredUser>, StoreError> {
        Ok(self.lock()?.values().find(|user| user.email.eq_ignore_ascii_case(email)).cloned())
    }

    /// Applies a patch synchronously.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Query`] when the store mutex is poisoned.
    pub fn patch(&self, id: &UserId, patch: &UserPatch) -> Result<bool, StoreError> {
        let mut guard = self.lock()?;
        match guard.get_mut(id) {
            Some(user) => {
                patch.apply(user);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Removes a record synchronously.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Query`] when the store mutex is poisoned.
    pub fn remove(&self, id: &UserId) -> Result<bool, StoreError> {
        Ok(self.lock()?.remove(id).is_some())
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.users.lock().map_or(0, |users| users.len())
    }

    /// Returns true when the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<UserId, StoredUser>>, StoreError> {
        self.users.lock().map_err(|_| StoreError::Query("user store mutex poisoned".to_string()))
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.lock().map(|_| ())
    }

    async fn find_user(&self, id: &UserId) -> Result<Option<StoredUser>, StoreError> {
        self.get(id)
    }

    async fn update_user(&self, id: &UserId, patch: &UserPatch) -> Result<bool, StoreError> {
        self.patch(id, patch)
    }

    async fn delete_user(&self, id: &UserId) -> Result<bool, StoreError> {
        self.remove(id)
    }

    async fn delete_users_in_domain(&self, email_domain: &str) -> Result<u64, StoreError> {
        let suffix = format!("@{}", email_domain.to_ascii_lowercase());
        let mut guard = self.lock()?;
        let before = guard.len();
        guard.retain(|_, user| !user.email.to_ascii_lowercase().ends_with(&suffix));
        Ok(u64::try_from(before - guard.len()).unwrap_or(u64::MAX))
    }
}
