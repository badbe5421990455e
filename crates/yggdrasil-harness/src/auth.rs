// crates/yggdrasil-harness/src/auth.rs
// ============================================================================
// Module: Auth Helper
// Description: Identity lifecycle against the auth service.
// Purpose: Mint fixture users, issue tokens, and build authenticated clients.
// Dependencies: serde_json, tokio, tracing, yggdrasil-core, yggdrasil-config
// ============================================================================

//! ## Overview
//! [`AuthHelper`] registers fixture users, exchanges their credentials for a
//! bearer token, and hands out [`ApiClient`]s bound to any service carrying
//! that token. Tokens are cached per identity: every service sees the same
//! credential for the same user, so an authorization difference between two
//! services can only come from the services themselves.
//!
//! Every created user is tracked and deleted by [`AuthHelper::cleanup`],
//! which never fails. Admin-only mutations (deactivate, reactivate, delete,
//! role change) go through a lazily registered admin actor.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use tracing::debug;
use tracing::info;
use tracing::warn;
use yggdrasil_config::HarnessConfig;
use yggdrasil_core::EndpointId;
use yggdrasil_core::Role;
use yggdrasil_core::ServiceName;
use yggdrasil_core::TestDataFactory;
use yggdrasil_core::TestUser;
use yggdrasil_core::TestUserSet;
use yggdrasil_core::UserId;

use crate::client::ApiClient;
use crate::client::Transcript;
use crate::error::HarnessError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Registration endpoint on the auth service.
pub const REGISTER_PATH: &str = "/api/auth/register";
/// Credential exchange endpoint on the auth service.
pub const LOGIN_PATH: &str = "/api/auth/login";
/// Refresh-token exchange endpoint on the auth service.
pub const REFRESH_PATH: &str = "/api/auth/refresh";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Tokens issued for one identity.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    /// Bearer access token.
    pub token: String,
    /// Refresh token, when the auth service issued one.
    pub refresh_token: Option<String>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Outcome of [`AuthHelper::cleanup`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupSummary {
    /// Users confirmed gone (deleted now or already missing).
    pub deleted: usize,
    /// Users whose deletion failed.
    pub failed: usize,
}

/// Identity lifecycle helper.
pub struct AuthHelper {
    config: Arc<HarnessConfig>,
    factory: TestDataFactory,
    auth: ApiClient,
    transcript: Transcript,
    sessions: Mutex<BTreeMap<UserId, Session>>,
    created: Mutex<Vec<TestUser>>,
    admin: tokio::sync::Mutex<Option<TestUser>>,
}

impl fmt::Debug for AuthHelper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthHelper")
            .field("auth", &self.auth)
            .field("run_tag", &self.factory.run_tag())
            .field("created", &self.created_count())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// SECTION: Construction
// ============================================================================

impl AuthHelper {
    /// Creates a helper bound to the configured auth service.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Api`] when the HTTP client cannot be built.
    pub fn new(
        config: Arc<HarnessConfig>,
        factory: TestDataFactory,
        transcript: Transcript,
    ) -> Result<Self, HarnessError> {
        let auth = ApiClient::for_service(&config, ServiceName::Auth)
            .map_err(|err| HarnessError::api("build auth client", err))?
            .with_transcript(transcript.clone());
        Ok(Self {
            config,
            factory,
            auth,
            transcript,
            sessions: Mutex::new(BTreeMap::new()),
            created: Mutex::new(Vec::new()),
            admin: tokio::sync::Mutex::new(None),
        })
    }

    /// Returns the payload factory.
    #[must_use]
    pub const fn factory(&self) -> &TestDataFactory {
        &self.factory
    }

    /// Returns the number of users created and not yet cleaned up.
    #[must_use]
    pub fn created_count(&self) -> usize {
        self.created.lock().map_or(0, |created| created.len())
    }

    // ========================================================================
    // SECTION: Identity Creation
    // ========================================================================

    /// Registers a fresh user of `role` and tracks it for cleanup.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError`] when the payload is invalid, registration is
    /// rejected, or the reply carries no user id.
    pub async fn create_test_user(
        &self,
        role: Role,
        overrides: Option<&Value>,
    ) -> Result<TestUser, HarnessError> {
        let new_user = self.factory.user(role, overrides)?;
        let response = self
            .auth
            .post(REGISTER_PATH, Some(&new_user.body))
            .await
            .map_err(|err| HarnessError::api(format!("register {role} user"), err))?;
        let id = extract_user_id(&response.data).ok_or_else(|| {
            HarnessError::Fixture(format!("registration of {} returned no user id", new_user.email))
        })?;
        let user = TestUser {
            id,
            email: new_user.email,
            role: new_user.role,
            profile: new_user.profile,
            password: new_user.password,
            is_active: true,
        };
        if let Some(session) = extract_session(&response.data) {
            lock(&self.sessions)?.insert(user.id.clone(), session);
        }
        lock(&self.created)?.push(user.clone());
        debug!(user = %user.id, role = %user.role, "registered fixture user");
        Ok(user)
    }

    /// Registers one user per role.
    ///
    /// # Errors
    ///
    /// Returns the first registration failure.
    pub async fn create_test_user_set(&self) -> Result<TestUserSet, HarnessError> {
        Ok(TestUserSet {
            admin: self.create_test_user(Role::Admin, None).await?,
            staff: self.create_test_user(Role::Staff, None).await?,
            teacher: self.create_test_user(Role::Teacher, None).await?,
            student: self.create_test_user(Role::Student, None).await?,
        })
    }

    // ========================================================================
    // SECTION: Sessions
    // ========================================================================

    /// Exchanges `user`'s credentials for a session and caches it.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError`] when login is rejected or returns no token.
    pub async fn login(&self, user: &TestUser) -> Result<Session, HarnessError> {
        let body = json!({ "email": user.email, "password": user.password });
        let response = self
            .auth
            .post(LOGIN_PATH, Some(&body))
            .await
            .map_err(|err| HarnessError::api(format!("login {}", user.id), err))?;
        let session = extract_session(&response.data).ok_or_else(|| {
            HarnessError::Fixture(format!("login of {} returned no token", user.id))
        })?;
        lock(&self.sessions)?.insert(user.id.clone(), session.clone());
        Ok(session)
    }

    /// Returns the cached token for `user`, logging in on a miss.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError`] when login is needed and fails.
    pub async fn token_for(&self, user: &TestUser) -> Result<String, HarnessError> {
        let cached = lock(&self.sessions)?.get(&user.id).map(|session| session.token.clone());
        match cached {
            Some(token) => Ok(token),
            None => Ok(self.login(user).await?.token),
        }
    }

    /// Returns a client for `service` carrying `user`'s token.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError`] when no token can be obtained.
    pub async fn create_authenticated_client(
        &self,
        service: ServiceName,
        user: &TestUser,
    ) -> Result<ApiClient, HarnessError> {
        let token = self.token_for(user).await?;
        Ok(self.anonymous_client(service)?.with_token(token))
    }

    /// Returns an unauthenticated client for `service` sharing the transcript.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Api`] when the HTTP client cannot be built.
    pub fn anonymous_client(&self, service: ServiceName) -> Result<ApiClient, HarnessError> {
        Ok(ApiClient::for_service(&self.config, service)
            .map_err(|err| HarnessError::api(format!("build {service} client"), err))?
            .with_transcript(self.transcript.clone()))
    }

    /// Drops the cached session so the next client logs in again.
    ///
    /// Returns true when a session was cached.
    pub fn invalidate_token(&self, id: &UserId) -> bool {
        self.sessions.lock().is_ok_and(|mut sessions| sessions.remove(id).is_some())
    }

    /// Obtains a fresh access token for `user`.
    ///
    /// Uses the refresh token when one was issued, otherwise logs in again.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError`] when neither path yields a token.
    pub async fn refresh_token(&self, user: &TestUser) -> Result<String, HarnessError> {
        let refresh = lock(&self.sessions)?.get(&user.id).and_then(|s| s.refresh_token.clone());
        let Some(refresh) = refresh else {
            self.invalidate_token(&user.id);
            return Ok(self.login(user).await?.token);
        };
        let body = json!({ "refreshToken": refresh });
        let response = self
            .auth
            .post(REFRESH_PATH, Some(&body))
            .await
            .map_err(|err| HarnessError::api(format!("refresh {}", user.id), err))?;
        let mut session = extract_session(&response.data).ok_or_else(|| {
            HarnessError::Fixture(format!("refresh of {} returned no token", user.id))
        })?;
        if session.refresh_token.is_none() {
            session.refresh_token = Some(refresh);
        }
        let token = session.token.clone();
        lock(&self.sessions)?.insert(user.id.clone(), session);
        Ok(token)
    }

    /// Returns true when `token` is structurally well-formed and unexpired.
    ///
    /// Fixture validation only; services are always asked for real decisions.
    #[must_use]
    pub fn is_token_valid(token: &str) -> bool {
        yggdrasil_core::is_token_valid(token)
    }

    /// Returns the role claimed by `token`, if any.
    #[must_use]
    pub fn role_from_token(token: &str) -> Option<Role> {
        yggdrasil_core::role_from_token(token)
    }

    // ========================================================================
    // SECTION: Admin Mutations
    // ========================================================================

    /// Returns a client for `service` authenticated as the admin actor.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError`] when the admin actor cannot be registered.
    pub async fn admin_client(&self, service: ServiceName) -> Result<ApiClient, HarnessError> {
        let admin = self.admin_actor().await?;
        self.create_authenticated_client(service, &admin).await
    }

    /// Returns the admin actor, registering it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError`] when registration fails.
    pub async fn admin_actor(&self) -> Result<TestUser, HarnessError> {
        let mut slot = self.admin.lock().await;
        if let Some(admin) = slot.as_ref() {
            return Ok(admin.clone());
        }
        let admin = self.create_test_user(Role::Admin, None).await?;
        *slot = Some(admin.clone());
        Ok(admin)
    }

    /// Deactivates `id` through the user service.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError`] when the admin call fails.
    pub async fn deactivate_user(&self, id: &UserId) -> Result<(), HarnessError> {
        self.admin_call(EndpointId::UserDeactivate, id, None).await
    }

    /// Reactivates `id` through the user service.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError`] when the admin call fails.
    pub async fn reactivate_user(&self, id: &UserId) -> Result<(), HarnessError> {
        self.admin_call(EndpointId::UserActivate, id, None).await
    }

    /// Deletes `id` through the user service.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError`] when the admin call fails.
    pub async fn delete_user(&self, id: &UserId) -> Result<(), HarnessError> {
        self.admin_call(EndpointId::UserDelete, id, None).await?;
        if let Ok(mut created) = self.created.lock() {
            created.retain(|user| &user.id != id);
        }
        Ok(())
    }

    /// Changes `id`'s role through the user service.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError`] when the admin call fails.
    pub async fn change_role(&self, id: &UserId, role: Role) -> Result<(), HarnessError> {
        let body = json!({ "role": role });
        self.admin_call(EndpointId::UserRoleChange, id, Some(&body)).await
    }

    async fn admin_call(
        &self,
        endpoint: EndpointId,
        id: &UserId,
        body: Option<&Value>,
    ) -> Result<(), HarnessError> {
        let endpoint = endpoint.endpoint();
        let path = endpoint.render(&[("userId", id.as_str())])?;
        let client = self.admin_client(endpoint.service).await?;
        client
            .request(endpoint.method, &path, body)
            .await
            .map_err(|err| HarnessError::api(format!("admin {}", endpoint.label()), err))?;
        info!(user = %id, endpoint = %endpoint.label(), "admin mutation applied");
        Ok(())
    }

    // ========================================================================
    // SECTION: Cleanup
    // ========================================================================

    /// Deletes every tracked user; never fails.
    ///
    /// The admin actor is deleted last so it can remove everyone else.
    pub async fn cleanup(&self) -> CleanupSummary {
        let mut users = self.drain_created();
        let mut summary = CleanupSummary::default();
        if users.is_empty() {
            return summary;
        }
        let client = match self.admin_client(ServiceName::User).await {
            Ok(client) => client,
            Err(err) => {
                users.extend(self.drain_created());
                warn!(error = %err, users = users.len(), "cleanup could not authenticate an admin");
                summary.failed = users.len();
                self.reset_sessions().await;
                return summary;
            }
        };
        let actor = self.admin.lock().await.take();
        users.extend(self.drain_created());
        if let Some(actor) = &actor {
            users.retain(|user| user.id != actor.id);
        }
        for id in users.iter().map(|user| &user.id).chain(actor.as_ref().map(|actor| &actor.id)) {
            if delete_best_effort(&client, id).await {
                summary.deleted += 1;
            } else {
                summary.failed += 1;
            }
        }
        self.reset_sessions().await;
        info!(deleted = summary.deleted, failed = summary.failed, "fixture users cleaned up");
        summary
    }

    fn drain_created(&self) -> Vec<TestUser> {
        self.created.lock().map(|mut created| created.drain(..).collect()).unwrap_or_default()
    }

    async fn reset_sessions(&self) {
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.clear();
        }
        *self.admin.lock().await = None;
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Deletes one user, counting an already-missing user as deleted.
async fn delete_best_effort(client: &ApiClient, id: &UserId) -> bool {
    let Ok(path) = EndpointId::UserDelete.endpoint().render(&[("userId", id.as_str())]) else {
        return false;
    };
    match client.delete(&path).await {
        Ok(_) => true,
        Err(err) if err.status() == Some(404) => true,
        Err(err) => {
            warn!(user = %id, error = %err, "fixture user deletion failed");
            false
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, HarnessError> {
    mutex.lock().map_err(|_| HarnessError::Fixture("auth helper state mutex poisoned".to_string()))
}

/// Reads the assigned id from a registration reply.
///
/// Accepts `user.id`, `user._id`, `id`, `_id`, or `userId`.
fn extract_user_id(data: &Value) -> Option<UserId> {
    let user = data.get("user");
    [
        user.and_then(|user| user.get("id")),
        user.and_then(|user| user.get("_id")),
        data.get("id"),
        data.get("_id"),
        data.get("userId"),
    ]
    .into_iter()
    .flatten()
    .find_map(id_string)
    .map(UserId::new)
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

/// Reads tokens from a login or registration reply.
///
/// Accepts `token`, `accessToken`, or `tokens.accessToken`.
fn extract_session(data: &Value) -> Option<Session> {
    let tokens = data.get("tokens");
    let token = [
        data.get("token"),
        data.get("accessToken"),
        tokens.and_then(|tokens| tokens.get("accessToken")),
    ]
    .into_iter()
    .flatten()
    .find_map(Value::as_str)?;
    let refresh_token = [data.get("refreshToken"), tokens.and_then(|tokens| tokens.get("refreshToken"))]
        .into_iter()
        .flatten()
        .find_map(Value::as_str)
        .map(str::to_string);
    Some(Session {
        token: token.to_string(),
        refresh_token,
    })
}

// ============================================================================
// SECTION: Tests
// ============================================================================
