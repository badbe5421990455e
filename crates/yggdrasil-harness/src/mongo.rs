// crates/yggdrasil-harness/src/mongo.rs
// ============================================================================
// Module: MongoDB User Store
// Description: UserStore backend over the platform's MongoDB users collection.
// Purpose: Mutate user records directly, bypassing every service's HTTP API.
// Dependencies: mongodb, tokio, tracing
// ============================================================================

//! ## Overview
//! [`MongoUserStore`] writes to the `users` collection the services read on
//! every request. Each operation is bounded by the configured database
//! timeout; server-selection, I/O and timeout failures surface as
//! [`StoreError::Unavailable`] so callers can classify them as environment
//! problems rather than defects.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::future::IntoFuture;
use std::time::Duration;

use async_trait::async_trait;
use mongodb::Client;
use mongodb::Collection;
use mongodb::Database;
use mongodb::bson::Bson;
use mongodb::bson::DateTime;
use mongodb::bson::Document;
use mongodb::bson::doc;
use mongodb::bson::oid::ObjectId;
use mongodb::error::ErrorKind;
use mongodb::options::ClientOptions;
use tokio::time::timeout;
use tracing::debug;
use yggdrasil_config::DatabaseConfig;
use yggdrasil_core::Role;
use yggdrasil_core::UserId;

use crate::store::StoreError;
use crate::store::StoredUser;
use crate::store::UserPatch;
use crate::store::UserStore;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Collection holding platform accounts.
const USERS_COLLECTION: &str = "users";
/// Application name reported to the server.
const APP_NAME: &str = "yggdrasil-harness";

// ============================================================================
// SECTION: Store
// ============================================================================

/// MongoDB-backed [`UserStore`].
#[derive(Clone)]
pub struct MongoUserStore {
    client: Client,
    database: Database,
    users: Collection<Document>,
    timeout: Duration,
    redacted_uri: String,
}

impl std::fmt::Debug for MongoUserStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoUserStore")
            .field("uri", &self.redacted_uri)
            .field("database", &self.database.name())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl MongoUserStore {
    /// Builds a client for `config`; no round trip happens until first use.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] when the URI cannot be resolved and
    /// [`StoreError::Query`] when the client options are rejected.
    pub async fn connect(config: &DatabaseConfig, op_timeout: Duration) -> Result<Self, StoreError> {
        let mut options = bounded(op_timeout, "parse uri", ClientOptions::parse(&config.uri)).await?;
        options.app_name = Some(APP_NAME.to_string());
        options.connect_timeout = Some(op_timeout);
        options.server_selection_timeout = Some(op_timeout);
        let client = Client::with_options(options).map_err(map_error)?;
        let database = client.database(&config.name);
        let users = database.collection::<Document>(USERS_COLLECTION);
        debug!(uri = %config.redacted_uri(), database = %config.name, "mongodb client built");
        Ok(Self {
            client,
            database,
            users,
            timeout: op_timeout,
            redacted_uri: config.redacted_uri(),
        })
    }
}

#[async_trait]
impl UserStore for MongoUserStore {
    async fn ping(&self) -> Result<(), StoreError> {
        bounded(self.timeout, "ping", self.database.run_command(doc! { "ping": 1 })).await?;
        Ok(())
    }

    async fn find_user(&self, id: &UserId) -> Result<Option<StoredUser>, StoreError> {
        let found = bounded(self.timeout, "find user", self.users.find_one(id_filter(id))).await?;
        found.map(|document| parse_user(&document)).transpose()
    }

    async fn update_user(&self, id: &UserId, patch: &UserPatch) -> Result<bool, StoreError> {
        let mut set = doc! { "updatedAt": DateTime::now() };
        if let Some(active) = patch.is_active {
            set.insert("isActive", active);
        }
        if let Some(role) = patch.role {
            set.insert("role", role.as_str());
        }
        let result = bounded(
            self.timeout,
            "update user",
            self.users.update_one(id_filter(id), doc! { "$set": set }),
        )
        .await?;
        debug!(user = %id, matched = result.matched_count, "datastore user update");
        Ok(result.matched_count > 0)
    }

    async fn delete_user(&self, id: &UserId) -> Result<bool, StoreError> {
        let result = bounded(self.timeout, "delete user", self.users.delete_one(id_filter(id))).await?;
        debug!(user = %id, deleted = result.deleted_count, "datastore user delete");
        Ok(result.deleted_count > 0)
    }

    async fn delete_users_in_domain(&self, email_domain: &str) -> Result<u64, StoreError> {
        let filter = doc! {
            "email": { "$regex": format!("@{}$", escape_regex(email_domain)), "$options": "i" }
        };
        let result = bounded(self.timeout, "purge test users", self.users.delete_many(filter)).await?;
        Ok(result.deleted_count)
    }

    async fn close(&self) {
        self.client.clone().shutdown().await;
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Runs a driver action under `limit`, mapping failures into [`StoreError`].
async fn bounded<F, T>(limit: Duration, operation: &str, action: F) -> Result<T, StoreError>
where
    F: IntoFuture<Output = mongodb::error::Result<T>>,
{
    match timeout(limit, action).await {
        Ok(result) => result.map_err(map_error),
        Err(_) => Err(StoreError::Unavailable(format!(
            "{operation} timed out after {}ms",
            limit.as_millis()
        ))),
    }
}

fn map_error(err: mongodb::error::Error) -> StoreError {
    match *err.kind {
        ErrorKind::ServerSelection { .. } | ErrorKind::Io(_) | ErrorKind::DnsResolve { .. } => {
            StoreError::Unavailable(err.to_string())
        }
        _ => StoreError::Query(err.to_string()),
    }
}

/// Matches `_id` as an ObjectId when the id is one, else as a string.
fn id_filter(id: &UserId) -> Document {
    ObjectId::parse_str(id.as_str())
        .map_or_else(|_| doc! { "_id": id.as_str() }, |oid| doc! { "_id": oid })
}

fn parse_user(document: &Document) -> Result<StoredUser, StoreError> {
    let id = match document.get("_id") {
        Some(Bson::ObjectId(oid)) => oid.to_hex(),
        Some(Bson::String(id)) => id.clone(),
        _ => return Err(StoreError::Query("user record has no usable _id".to_string())),
    };
    let email = document
        .get_str("email")
        .map_err(|err| StoreError::Query(format!("user {id}: email: {err}")))?
        .to_string();
    let role = document
        .get_str("role")
        .map_err(|err| StoreError::Query(format!("user {id}: role: {err}")))?
        .parse::<Role>()
        .map_err(|err| StoreError::Query(format!("user {id}: {err}")))?;
    let is_active = document.get_bool("isActive").unwrap_or(true);
    Ok(StoredUser {
        id: UserId::new(id),
        email,
        role,
        is_active,
    })
}

/// Escapes regex metacharacters so a domain matches literally.
pub(crate) fn escape_regex(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len() * 2);
    for ch in raw.chars() {
        if matches!(
            ch,
            '.' | '^' | '$' | '*' | '+' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '|' | '\\'
        ) {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}
