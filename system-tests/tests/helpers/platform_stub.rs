// system-tests/tests/helpers/platform_stub.rs
// ============================================================================
// Module: Platform Stub
// Description: In-process stand-in for the seven Yggdrasil services.
// Purpose: Give the harness a correct platform, and defective variants of it.
// Dependencies: axum, tokio, yggdrasil-core, yggdrasil-harness
// ============================================================================

//! ## Overview
//! Every service listens on its own loopback port and shares one platform
//! state. Tokens are opaque strings mapped to user ids; each request joins the
//! token against the shared [`InMemoryUserStore`], so a datastore write made
//! by the harness is visible on the very next call.
//!
//! [`Defect`] switches on one known-bad behavior so suites can prove they
//! notice it.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::net::TcpListener as StdTcpListener;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::thread;

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::Path;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::patch;
use axum::routing::post;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;
use tokio::runtime::Builder;
use tokio::sync::oneshot;
use yggdrasil_core::ContentStatus;
use yggdrasil_core::HEALTH_PATH;
use yggdrasil_core::Role;
use yggdrasil_core::ServiceName;
use yggdrasil_core::UserId;
use yggdrasil_core::Visibility;
use yggdrasil_core::can_view;
use yggdrasil_harness::InMemoryUserStore;
use yggdrasil_harness::StoredUser;
use yggdrasil_harness::UserPatch;

// ============================================================================
// SECTION: Defects
// ============================================================================

/// Deviations from the default behavior the stub can be told to exhibit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Defect {
    /// The service remembers the first principal a token resolved to.
    CachedTokenValidity(ServiceName),
    /// Profile updates apply a requested role.
    SelfRoleChange,
    /// Any authenticated user may read any user by id.
    PeerRead,
    /// Likes accumulate instead of toggling.
    StickyLike,
    /// News listings ignore status and visibility.
    LeakyListing,
    /// Statistics admin view is open to staff.
    StaffSeesAdminStatistics,
    /// Authors get no special access to their own articles.
    IgnoresAuthorship,
    /// Restricted articles are visible to their author only.
    RestrictedAuthorsOnly,
    /// New articles start pinned. Not a defect.
    PinnedOnCreate,
}

// ============================================================================
// SECTION: Handle
// ============================================================================

/// Running platform stub; stops on drop.
pub struct PlatformStub {
    urls: BTreeMap<ServiceName, String>,
    store: InMemoryUserStore,
    shutdown: Option<oneshot::Sender<()>>,
    join: Option<thread::JoinHandle<()>>,
}

impl PlatformStub {
    /// Returns the base URL of `service`.
    pub fn url(&self, service: ServiceName) -> &str {
        self.urls.get(&service).map_or("", String::as_str)
    }

    /// Returns the user store shared with the harness.
    pub const fn store(&self) -> &InMemoryUserStore {
        &self.store
    }
}

impl Drop for PlatformStub {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// Starts all seven services with the given defects switched on.
pub fn spawn_platform(defects: &[Defect]) -> Result<PlatformStub, String> {
    let store = InMemoryUserStore::new();
    let platform = Arc::new(Platform {
        store: store.clone(),
        defects: defects.to_vec(),
        sequence: AtomicU64::new(0),
        data: Mutex::new(PlatformData::default()),
    });
    let mut listeners = Vec::with_capacity(ServiceName::ALL.len());
    let mut urls = BTreeMap::new();
    for service in ServiceName::ALL {
        let listener = StdTcpListener::bind("127.0.0.1:0")
            .map_err(|err| format!("{service} stub bind failed: {err}"))?;
        listener
            .set_nonblocking(true)
            .map_err(|err| format!("{service} stub listener nonblocking failed: {err}"))?;
        let addr = listener.local_addr().map_err(|err| format!("{service} stub local addr failed: {err}"))?;
        urls.insert(service, format!("http://{addr}"));
        listeners.push((service, listener));
    }

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let join = thread::spawn(move || {
        let Ok(runtime) = Builder::new_current_thread().enable_all().build() else {
            return;
        };
        runtime.block_on(async move {
            let mut servers = Vec::with_capacity(listeners.len());
            for (service, listener) in listeners {
                let Ok(listener) = tokio::net::TcpListener::from_std(listener) else {
                    continue;
                };
                let app = service_router(service).with_state(ServiceState {
                    service,
                    platform: Arc::clone(&platform),
                });
                servers.push(tokio::spawn(async move {
                    let _ = axum::serve(listener, app).await;
                }));
            }
            let _ = shutdown_rx.await;
            for server in servers {
                server.abort();
            }
        });
    });
    Ok(PlatformStub {
        urls,
        store,
        shutdown: Some(shutdown_tx),
        join: Some(join),
    })
}

// ============================================================================
// SECTION: State
// ============================================================================

struct Platform {
    store: InMemoryUserStore,
    defects: Vec<Defect>,
    sequence: AtomicU64,
    data: Mutex<PlatformData>,
}

#[derive(Default)]
struct PlatformData {
    accounts: BTreeMap<String, Account>,
    tokens: BTreeMap<String, UserId>,
    refresh_tokens: BTreeMap<String, UserId>,
    profiles: BTreeMap<UserId, Value>,
    token_cache: BTreeMap<(ServiceName, String), Caller>,
    courses: Vec<Value>,
    articles: BTreeMap<String, Article>,
    events: BTreeMap<String, Event>,
    notifications: Vec<Value>,
}

struct Account {
    id: UserId,
    password: String,
}

#[derive(Clone)]
struct Caller {
    id: UserId,
    role: Role,
}

struct Article {
    id: String,
    author: UserId,
    status: ContentStatus,
    visibility: Visibility,
    body: Value,
    likes: BTreeSet<UserId>,
    pinned: bool,
}

struct Event {
    id: String,
    body: Value,
    attendees: BTreeSet<UserId>,
}

#[derive(Clone)]
struct ServiceState {
    service: ServiceName,
    platform: Arc<Platform>,
}

type Reply = Result<Response, Response>;

impl Platform {
    fn has(&self, defect: Defect) -> bool {
        self.defects.contains(&defect)
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.sequence.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn lock(&self) -> Result<MutexGuard<'_, PlatformData>, Response> {
        self.data.lock().map_err(|_| fail(StatusCode::INTERNAL_SERVER_ERROR, "platform state poisoned"))
    }

    fn user(&self, id: &UserId) -> Result<Option<StoredUser>, Response> {
        self.store.get(id).map_err(|err| fail(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string()))
    }

    fn issue_tokens(&self, data: &mut PlatformData, id: &UserId) -> (String, String) {
        let token = self.next_id(&format!("tok-{id}"));
        let refresh = self.next_id(&format!("ref-{id}"));
        data.tokens.insert(token.clone(), id.clone());
        data.refresh_tokens.insert(refresh.clone(), id.clone());
        (token, refresh)
    }
}

impl ServiceState {
    /// Joins the bearer token against current user state.
    fn authenticate(&self, headers: &HeaderMap) -> Result<Caller, Response> {
        let token = bearer(headers).ok_or_else(|| fail(StatusCode::UNAUTHORIZED, "missing bearer token"))?;
        let platform = &self.platform;
        let caches = platform.has(Defect::CachedTokenValidity(self.service));
        let mut data = platform.lock()?;
        let cache_key = (self.service, token.to_string());
        if caches && let Some(caller) = data.token_cache.get(&cache_key) {
            return Ok(caller.clone());
        }
        let revoked = || fail(StatusCode::UNAUTHORIZED, "token is invalid or revoked");
        let id = data.tokens.get(token).cloned().ok_or_else(revoked)?;
        let user = platform.user(&id)?.filter(|user| user.is_active).ok_or_else(revoked)?;
        let caller = Caller {
            id,
            role: user.role,
        };
        if caches {
            data.token_cache.insert(cache_key, caller.clone());
        }
        Ok(caller)
    }

    fn require(&self, headers: &HeaderMap, role: Role) -> Result<Caller, Response> {
        let caller = self.authenticate(headers)?;
        if caller.role.at_least(role) {
            Ok(caller)
        } else {
            Err(fail(StatusCode::FORBIDDEN, &format!("requires role {role}")))
        }
    }
}

// ============================================================================
// SECTION: Routing
// ============================================================================

fn service_router(service: ServiceName) -> Router<ServiceState> {
    let router = Router::new().route(HEALTH_PATH, get(health));
    match service {
        ServiceName::Auth => router
            .route("/api/auth/register", post(register))
            .route("/api/auth/login", post(login))
            .route("/api/auth/refresh", post(refresh))
            .route("/api/auth/me", get(me)),
        ServiceName::User => router
            .route("/api/users/profile", get(profile).put(update_profile))
            .route("/api/users", get(list_users))
            .route("/api/users/{user_id}", get(user_by_id).delete(delete_user))
            .route("/api/users/{user_id}/role", patch(change_role))
            .route("/api/users/{user_id}/deactivate", patch(deactivate))
            .route("/api/users/{user_id}/activate", patch(activate)),
        ServiceName::Course => router.route("/api/courses", get(list_courses).post(create_course)),
        ServiceName::News => router
            .route("/api/news", get(list_news).post(create_article))
            .route("/api/news/{article_id}", get(article_by_id))
            .route("/api/news/{article_id}/like", post(like_article))
            .route("/api/news/{article_id}/pin", post(pin_article)),
        ServiceName::Planning => router
            .route("/api/planning/events", get(list_events).post(create_event))
            .route("/api/planning/events/{event_id}/attendance", post(toggle_attendance)),
        ServiceName::Statistics => router
            .route("/api/statistics/dashboard", get(dashboard))
            .route("/api/statistics/admin", get(admin_statistics)),
        ServiceName::Notification => {
            router.route("/api/notifications", get(list_notifications).post(create_notification))
        }
    }
}

async fn health(State(state): State<ServiceState>) -> Response {
    ok(json!({ "status": "ok", "service": state.service.as_str() }))
}

// ============================================================================
// SECTION: Auth Service
// ============================================================================

async fn register(State(state): State<ServiceState>, body: Bytes) -> Reply {
    let body = parse_body(&body);
    let email = text_field(&body, "email").filter(|email| email.contains('@'));
    let email = email.ok_or_else(|| fail(StatusCode::BAD_REQUEST, "a valid email is required"))?;
    let password = text_field(&body, "password").filter(|password| password.len() >= 8);
    let password = password.ok_or_else(|| fail(StatusCode::BAD_REQUEST, "password too short"))?;
    let role = match text_field(&body, "role") {
        Some(role) => role.parse::<Role>().map_err(|_| fail(StatusCode::BAD_REQUEST, "unknown role"))?,
        None => Role::Student,
    };
    let platform = &state.platform;
    let mut data = platform.lock()?;
    let key = email.to_ascii_lowercase();
    if let Some(existing) = data.accounts.get(&key)
        && platform.user(&existing.id)?.is_some()
    {
        return Err(fail(StatusCode::CONFLICT, "email already registered"));
    }
    let id = UserId::new(platform.next_id("usr"));
    let user = StoredUser {
        id: id.clone(),
        email: email.to_string(),
        role,
        is_active: true,
    };
    platform.store.insert(user.clone()).map_err(|err| fail(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string()))?;
    let profile = body.get("profile").cloned().unwrap_or_else(|| json!({}));
    data.accounts.insert(
        key,
        Account {
            id: id.clone(),
            password: password.to_string(),
        },
    );
    data.profiles.insert(id.clone(), profile);
    let (token, refresh) = platform.issue_tokens(&mut data, &id);
    Ok(created(json!({
        "user": user_view(&user, data.profiles.get(&id)),
        "token": token,
        "refreshToken": refresh,
    })))
}

async fn login(State(state): State<ServiceState>, body: Bytes) -> Reply {
    let body = parse_body(&body);
    let rejected = || fail(StatusCode::UNAUTHORIZED, "invalid credentials");
    let email = text_field(&body, "email").ok_or_else(rejected)?.to_ascii_lowercase();
    let password = text_field(&body, "password").ok_or_else(rejected)?;
    let platform = &state.platform;
    let mut data = platform.lock()?;
    let id = data
        .accounts
        .get(&email)
        .filter(|account| account.password == password)
        .map(|account| account.id.clone())
        .ok_or_else(rejected)?;
    let user = platform.user(&id)?.filter(|user| user.is_active).ok_or_else(rejected)?;
    let (token, refresh) = platform.issue_tokens(&mut data, &id);
    Ok(ok(json!({
        "user": user_view(&user, data.profiles.get(&id)),
        "token": token,
        "refreshToken": refresh,
    })))
}

async fn refresh(State(state): State<ServiceState>, body: Bytes) -> Reply {
    let body = parse_body(&body);
    let rejected = || fail(StatusCode::UNAUTHORIZED, "refresh token is invalid or revoked");
    let refresh = text_field(&body, "refreshToken").ok_or_else(rejected)?;
    let platform = &state.platform;
    let mut data = platform.lock()?;
    let id = data.refresh_tokens.get(refresh).cloned().ok_or_else(rejected)?;
    platform.user(&id)?.filter(|user| user.is_active).ok_or_else(rejected)?;
    let token = platform.next_id(&format!("tok-{id}"));
    data.tokens.insert(token.clone(), id);
    Ok(ok(json!({ "token": token })))
}

async fn me(State(state): State<ServiceState>, headers: HeaderMap) -> Reply {
    let caller = state.authenticate(&headers)?;
    caller_view(&state, &caller)
}

// ============================================================================
// SECTION: User Service
// ============================================================================

async fn profile(State(state): State<ServiceState>, headers: HeaderMap) -> Reply {
    let caller = state.authenticate(&headers)?;
    caller_view(&state, &caller)
}

async fn update_profile(State(state): State<ServiceState>, headers: HeaderMap, body: Bytes) -> Reply {
    let caller = state.authenticate(&headers)?;
    let body = parse_body(&body);
    let platform = &state.platform;
    if let Some(requested) = text_field(&body, "role") {
        let requested =
            requested.parse::<Role>().map_err(|_| fail(StatusCode::BAD_REQUEST, "unknown role"))?;
        if requested != caller.role {
            if !platform.has(Defect::SelfRoleChange) {
                return Err(fail(StatusCode::FORBIDDEN, "role changes require an administrator"));
            }
            platform
                .store
                .patch(&caller.id, &UserPatch::role(requested))
                .map_err(|err| fail(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string()))?;
        }
    }
    if let Some(Value::Object(update)) = body.get("profile") {
        let mut data = platform.lock()?;
        let entry = data.profiles.entry(caller.id.clone()).or_insert_with(|| json!({}));
        if let Value::Object(existing) = entry {
            existing.extend(update.clone());
        }
    }
    caller_view(&state, &caller)
}

async fn list_users(State(state): State<ServiceState>, headers: HeaderMap) -> Reply {
    state.require(&headers, Role::Staff)?;
    let platform = &state.platform;
    let data = platform.lock()?;
    let mut users = Vec::new();
    for account in data.accounts.values() {
        if let Some(user) = platform.user(&account.id)? {
            users.push(user_view(&user, data.profiles.get(&account.id)));
        }
    }
    Ok(ok(Value::Array(users)))
}

async fn user_by_id(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Reply {
    let caller = state.authenticate(&headers)?;
    let target = UserId::new(user_id);
    let platform = &state.platform;
    if caller.id != target && !caller.role.at_least(Role::Admin) && !platform.has(Defect::PeerRead) {
        return Err(fail(StatusCode::FORBIDDEN, "cannot read another user"));
    }
    let user = platform.user(&target)?.ok_or_else(|| fail(StatusCode::NOT_FOUND, "user not found"))?;
    let data = platform.lock()?;
    Ok(ok(user_view(&user, data.profiles.get(&target))))
}

async fn change_role(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
    body: Bytes,
) -> Reply {
    state.require(&headers, Role::Admin)?;
    let body = parse_body(&body);
    let role = text_field(&body, "role")
        .and_then(|role| role.parse::<Role>().ok())
        .ok_or_else(|| fail(StatusCode::BAD_REQUEST, "a valid role is required"))?;
    apply_patch(&state, &UserId::new(user_id), &UserPatch::role(role))
}

async fn deactivate(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Reply {
    state.require(&headers, Role::Admin)?;
    apply_patch(&state, &UserId::new(user_id), &UserPatch::deactivate())
}

async fn activate(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Reply {
    state.require(&headers, Role::Admin)?;
    apply_patch(&state, &UserId::new(user_id), &UserPatch::reactivate())
}

async fn delete_user(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Reply {
    state.require(&headers, Role::Admin)?;
    let target = UserId::new(user_id);
    let platform = &state.platform;
    let removed =
        platform.store.remove(&target).map_err(|err| fail(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string()))?;
    if !removed {
        return Err(fail(StatusCode::NOT_FOUND, "user not found"));
    }
    platform.lock()?.profiles.remove(&target);
    Ok(ok(json!({ "id": target.as_str(), "deleted": true })))
}

fn apply_patch(state: &ServiceState, target: &UserId, patch: &UserPatch) -> Reply {
    let platform = &state.platform;
    let matched =
        platform.store.patch(target, patch).map_err(|err| fail(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string()))?;
    if !matched {
        return Err(fail(StatusCode::NOT_FOUND, "user not found"));
    }
    let user = platform.user(target)?.ok_or_else(|| fail(StatusCode::NOT_FOUND, "user not found"))?;
    let data = platform.lock()?;
    Ok(ok(user_view(&user, data.profiles.get(target))))
}

// ============================================================================
// SECTION: Course Service
// ============================================================================

async fn list_courses(State(state): State<ServiceState>, headers: HeaderMap) -> Reply {
    state.authenticate(&headers)?;
    let data = state.platform.lock()?;
    Ok(ok(Value::Array(data.courses.clone())))
}

async fn create_course(State(state): State<ServiceState>, headers: HeaderMap, body: Bytes) -> Reply {
    let caller = state.require(&headers, Role::Teacher)?;
    let id = state.platform.next_id("crs");
    let course = with_fields(parse_body(&body), [("id", json!(id)), ("teacherId", json!(caller.id.as_str()))]);
    state.platform.lock()?.courses.push(course.clone());
    Ok(created(course))
}

// ============================================================================
// SECTION: News Service
// ============================================================================

impl Platform {
    fn visible(&self, article: &Article, caller: &Caller) -> bool {
        let is_author = article.author == caller.id && !self.has(Defect::IgnoresAuthorship);
        if article.visibility == Visibility::Restricted && self.has(Defect::RestrictedAuthorsOnly) {
            return is_author;
        }
        can_view(caller.role, is_author, article.status, article.visibility)
    }
}

fn article_view(article: &Article, caller: &Caller) -> Value {
    with_fields(
        article.body.clone(),
        [
            ("id", json!(article.id)),
            ("authorId", json!(article.author.as_str())),
            ("status", json!(article.status)),
            ("visibility", json!(article.visibility)),
            ("pinned", json!(article.pinned)),
            ("likes", json!(article.likes.len())),
            ("liked", json!(article.likes.contains(&caller.id))),
        ],
    )
}

async fn list_news(State(state): State<ServiceState>, headers: HeaderMap) -> Reply {
    let caller = state.authenticate(&headers)?;
    let leaky = state.platform.has(Defect::LeakyListing);
    let data = state.platform.lock()?;
    let articles: Vec<Value> = data
        .articles
        .values()
        .filter(|article| leaky || state.platform.visible(article, &caller))
        .map(|article| article_view(article, &caller))
        .collect();
    Ok(ok(json!({ "articles": articles, "total": articles.len() })))
}

async fn article_by_id(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(article_id): Path<String>,
) -> Reply {
    let caller = state.authenticate(&headers)?;
    let data = state.platform.lock()?;
    let article = data
        .articles
        .get(&article_id)
        .filter(|article| state.platform.visible(article, &caller))
        .ok_or_else(|| fail(StatusCode::NOT_FOUND, "article not found"))?;
    Ok(ok(article_view(article, &caller)))
}

async fn create_article(State(state): State<ServiceState>, headers: HeaderMap, body: Bytes) -> Reply {
    let caller = state.require(&headers, Role::Staff)?;
    let pinned = state.platform.has(Defect::PinnedOnCreate);
    let body = parse_body(&body);
    let status = enum_field(&body, "status")?.unwrap_or(ContentStatus::Published);
    let visibility = enum_field(&body, "visibility")?.unwrap_or(Visibility::Public);
    let article = Article {
        id: state.platform.next_id("art"),
        author: caller.id.clone(),
        status,
        visibility,
        body,
        likes: BTreeSet::new(),
        pinned,
    };
    let view = article_view(&article, &caller);
    state.platform.lock()?.articles.insert(article.id.clone(), article);
    Ok(created(view))
}

async fn like_article(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(article_id): Path<String>,
) -> Reply {
    let caller = state.authenticate(&headers)?;
    let sticky = state.platform.has(Defect::StickyLike);
    let mut data = state.platform.lock()?;
    let article = data
        .articles
        .get_mut(&article_id)
        .filter(|article| state.platform.visible(article, &caller))
        .ok_or_else(|| fail(StatusCode::NOT_FOUND, "article not found"))?;
    let liked = if sticky || !article.likes.contains(&caller.id) {
        article.likes.insert(caller.id.clone());
        true
    } else {
        article.likes.remove(&caller.id);
        false
    };
    Ok(ok(json!({ "id": article.id, "liked": liked, "likes": article.likes.len() })))
}

async fn pin_article(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(article_id): Path<String>,
) -> Reply {
    state.require(&headers, Role::Staff)?;
    let mut data = state.platform.lock()?;
    let article =
        data.articles.get_mut(&article_id).ok_or_else(|| fail(StatusCode::NOT_FOUND, "article not found"))?;
    article.pinned = !article.pinned;
    Ok(ok(json!({ "id": article.id, "pinned": article.pinned })))
}

// ============================================================================
// SECTION: Planning Service
// ============================================================================

async fn list_events(State(state): State<ServiceState>, headers: HeaderMap) -> Reply {
    let caller = state.authenticate(&headers)?;
    let data = state.platform.lock()?;
    let events: Vec<Value> = data
        .events
        .values()
        .map(|event| {
            with_fields(
                event.body.clone(),
                [("id", json!(event.id)), ("attending", json!(event.attendees.contains(&caller.id)))],
            )
        })
        .collect();
    Ok(ok(json!({ "events": events })))
}

async fn create_event(State(state): State<ServiceState>, headers: HeaderMap, body: Bytes) -> Reply {
    let caller = state.require(&headers, Role::Teacher)?;
    let id = state.platform.next_id("evt");
    let body = with_fields(parse_body(&body), [("id", json!(id)), ("organizerId", json!(caller.id.as_str()))]);
    let event = Event {
        id: id.clone(),
        body: body.clone(),
        attendees: BTreeSet::new(),
    };
    state.platform.lock()?.events.insert(id, event);
    Ok(created(body))
}

async fn toggle_attendance(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(event_id): Path<String>,
) -> Reply {
    let caller = state.authenticate(&headers)?;
    let mut data = state.platform.lock()?;
    let event = data.events.get_mut(&event_id).ok_or_else(|| fail(StatusCode::NOT_FOUND, "event not found"))?;
    let attending = if event.attendees.remove(&caller.id) {
        false
    } else {
        event.attendees.insert(caller.id.clone());
        true
    };
    Ok(ok(json!({ "id": event.id, "attending": attending, "attendees": event.attendees.len() })))
}

// ============================================================================
// SECTION: Statistics and Notification Services
// ============================================================================

async fn dashboard(State(state): State<ServiceState>, headers: HeaderMap) -> Reply {
    state.authenticate(&headers)?;
    let data = state.platform.lock()?;
    Ok(ok(json!({
        "courses": data.courses.len(),
        "articles": data.articles.len(),
        "events": data.events.len(),
    })))
}

async fn admin_statistics(State(state): State<ServiceState>, headers: HeaderMap) -> Reply {
    let required =
        if state.platform.has(Defect::StaffSeesAdminStatistics) { Role::Staff } else { Role::Admin };
    state.require(&headers, required)?;
    let platform = &state.platform;
    let data = platform.lock()?;
    Ok(ok(json!({
        "accounts": data.accounts.len(),
        "storedUsers": platform.store.len(),
        "issuedTokens": data.tokens.len(),
    })))
}

async fn list_notifications(State(state): State<ServiceState>, headers: HeaderMap) -> Reply {
    state.authenticate(&headers)?;
    let data = state.platform.lock()?;
    Ok(ok(Value::Array(data.notifications.clone())))
}

async fn create_notification(State(state): State<ServiceState>, headers: HeaderMap, body: Bytes) -> Reply {
    let caller = state.require(&headers, Role::Staff)?;
    let id = state.platform.next_id("ntf");
    let notification = with_fields(parse_body(&body), [("id", json!(id)), ("senderId", json!(caller.id.as_str()))]);
    state.platform.lock()?.notifications.push(notification.clone());
    Ok(created(notification))
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn ok(data: Value) -> Response {
    (StatusCode::OK, Json(json!({ "success": true, "data": data }))).into_response()
}

fn created(data: Value) -> Response {
    (StatusCode::CREATED, Json(json!({ "success": true, "data": data }))).into_response()
}

fn fail(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "success": false, "error": message }))).into_response()
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .filter(|token| !token.is_empty())
}

fn parse_body(body: &Bytes) -> Value {
    serde_json::from_slice(body).unwrap_or(Value::Null)
}

fn text_field<'a>(body: &'a Value, field: &str) -> Option<&'a str> {
    body.get(field).and_then(Value::as_str)
}

fn enum_field<T: serde::de::DeserializeOwned>(body: &Value, field: &str) -> Result<Option<T>, Response> {
    body.get(field)
        .map(|value| {
            serde_json::from_value(value.clone())
                .map_err(|_| fail(StatusCode::UNPROCESSABLE_ENTITY, &format!("invalid {field}")))
        })
        .transpose()
}

fn with_fields<const N: usize>(body: Value, fields: [(&str, Value); N]) -> Value {
    let mut map = match body {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    for (key, value) in fields {
        map.insert(key.to_string(), value);
    }
    Value::Object(map)
}

fn user_view(user: &StoredUser, profile: Option<&Value>) -> Value {
    json!({
        "id": user.id.as_str(),
        "email": user.email,
        "role": user.role,
        "isActive": user.is_active,
        "profile": profile.cloned().unwrap_or_else(|| json!({})),
    })
}

fn caller_view(state: &ServiceState, caller: &Caller) -> Reply {
    let platform = &state.platform;
    let user = platform.user(&caller.id)?.ok_or_else(|| fail(StatusCode::UNAUTHORIZED, "token is invalid or revoked"))?;
    let data = platform.lock()?;
    Ok(ok(user_view(&user, data.profiles.get(&caller.id))))
}
