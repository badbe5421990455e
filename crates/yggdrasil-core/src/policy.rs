// crates/yggdrasil-core/src/policy.rs
// ============================================================================
// Module: Authorization Policy
// Description: Expected authorization matrix for the Yggdrasil platform.
// Purpose: Define role x endpoint -> outcome as a total, testable function.
// Dependencies: crate::identity, crate::services, serde
// ============================================================================

//! ## Overview
//! The platform's authorization contract is captured as a static endpoint
//! catalogue plus [`authorize`], a total function from principal, endpoint, and
//! target to the single expected [`Access`] outcome. Scenario suites compare
//! live service responses against this function.
//!
//! Invariants:
//! - Inactive and deleted principals are unauthenticated everywhere; the only
//!   tolerated alternative is 404 for by-id lookups of the deleted user itself.
//! - For every endpoint, if a role is allowed then every more privileged role is
//!   allowed (role hierarchy monotonicity).
//! - Hidden content is never readable; direct reads of it expect 404.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::envelope::is_success;
use crate::identity::Role;
use crate::identity::UserId;
use crate::services::ServiceName;

// ============================================================================
// SECTION: Endpoint Catalogue
// ============================================================================

/// HTTP method of a catalogue endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// GET.
    Get,
    /// POST.
    Post,
    /// PUT.
    Put,
    /// PATCH.
    Patch,
    /// DELETE.
    Delete,
}

impl HttpMethod {
    /// Returns the uppercase method name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    /// Returns true when repeating the request cannot change server state
    /// beyond the first delivery.
    #[must_use]
    pub const fn is_idempotent(self) -> bool {
        matches!(self, Self::Get | Self::Put | Self::Delete)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Access rule attached to an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessRule {
    /// Any active, authenticated user.
    Authenticated,
    /// Active users holding at least the given role.
    MinRole(Role),
    /// The addressed user themself, or users holding at least the given role.
    SelfOrMinRole(Role),
}

/// Stable endpoint identifiers; discriminants index [`ENDPOINTS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointId {
    /// `GET /api/auth/me`.
    AuthMe,
    /// `GET /api/users/profile`.
    ProfileRead,
    /// `PUT /api/users/profile`.
    ProfileUpdate,
    /// `GET /api/users`.
    UsersList,
    /// `GET /api/users/{userId}`.
    UserById,
    /// `PATCH /api/users/{userId}/role`.
    UserRoleChange,
    /// `PATCH /api/users/{userId}/deactivate`.
    UserDeactivate,
    /// `PATCH /api/users/{userId}/activate`.
    UserActivate,
    /// `DELETE /api/users/{userId}`.
    UserDelete,
    /// `GET /api/courses`.
    CoursesList,
    /// `POST /api/courses`.
    CourseCreate,
    /// `GET /api/news`.
    NewsList,
    /// `GET /api/news/{articleId}`.
    NewsById,
    /// `POST /api/news`.
    NewsCreate,
    /// `POST /api/news/{articleId}/like`.
    NewsLike,
    /// `POST /api/news/{articleId}/pin`.
    NewsPin,
    /// `GET /api/planning/events`.
    EventsList,
    /// `POST /api/planning/events`.
    EventCreate,
    /// `POST /api/planning/events/{eventId}/attendance`.
    EventAttendance,
    /// `GET /api/statistics/dashboard`.
    StatisticsDashboard,
    /// `GET /api/statistics/admin`.
    StatisticsAdmin,
    /// `GET /api/notifications`.
    NotificationsList,
    /// `POST /api/notifications`.
    NotificationCreate,
}

impl EndpointId {
    /// Returns the catalogue entry for this identifier.
    #[must_use]
    pub fn endpoint(self) -> &'static Endpoint {
        &ENDPOINTS[self as usize]
    }
}

/// Catalogue entry describing one endpoint's authorization contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    /// Stable identifier.
    pub id: EndpointId,
    /// Owning service.
    pub service: ServiceName,
    /// HTTP method.
    pub method: HttpMethod,
    /// Path template; `{name}` segments are path parameters.
    pub path: &'static str,
    /// Access rule for active principals.
    pub rule: AccessRule,
    /// Boolean response field flipped by a toggle endpoint.
    pub toggle_field: Option<&'static str>,
    /// Whether a successful call destroys or disables shared fixtures.
    pub destructive: bool,
    /// Whether this is the service's baseline read endpoint.
    pub baseline: bool,
}

const fn entry(
    id: EndpointId,
    service: ServiceName,
    method: HttpMethod,
    path: &'static str,
    rule: AccessRule,
) -> Endpoint {
    Endpoint {
        id,
        service,
        method,
        path,
        rule,
        toggle_field: None,
        destructive: false,
        baseline: false,
    }
}

const fn baseline(mut endpoint: Endpoint) -> Endpoint {
    endpoint.baseline = true;
    endpoint
}

const fn destructive(mut endpoint: Endpoint) -> Endpoint {
    endpoint.destructive = true;
    endpoint
}

const fn toggle(mut endpoint: Endpoint, field: &'static str) -> Endpoint {
    endpoint.toggle_field = Some(field);
    endpoint
}

/// The endpoint catalogue, ordered by [`EndpointId`] discriminant.
pub static ENDPOINTS: [Endpoint; 23] = {
    use AccessRule::Authenticated;
    use AccessRule::MinRole;
    use AccessRule::SelfOrMinRole;
    use EndpointId as E;
    use HttpMethod::Delete;
    use HttpMethod::Get;
    use HttpMethod::Patch;
    use HttpMethod::Post;
    use HttpMethod::Put;
    use ServiceName as S;
    [
        baseline(entry(E::AuthMe, S::Auth, Get, "/api/auth/me", Authenticated)),
        baseline(entry(E::ProfileRead, S::User, Get, "/api/users/profile", Authenticated)),
        entry(E::ProfileUpdate, S::User, Put, "/api/users/profile", Authenticated),
        entry(E::UsersList, S::User, Get, "/api/users", MinRole(Role::Staff)),
        entry(E::UserById, S::User, Get, "/api/users/{userId}", SelfOrMinRole(Role::Admin)),
        destructive(entry(
            E::UserRoleChange,
            S::User,
            Patch,
            "/api/users/{userId}/role",
            MinRole(Role::Admin),
        )),
        destructive(entry(
            E::UserDeactivate,
            S::User,
            Patch,
            "/api/users/{userId}/deactivate",
            MinRole(Role::Admin),
        )),
        entry(
            E::UserActivate,
            S::User,
            Patch,
            "/api/users/{userId}/activate",
            MinRole(Role::Admin),
        ),
        destructive(entry(E::UserDelete, S::User, Delete, "/api/users/{userId}", MinRole(Role::Admin))),
        baseline(entry(E::CoursesList, S::Course, Get, "/api/courses", Authenticated)),
        entry(E::CourseCreate, S::Course, Post, "/api/courses", MinRole(Role::Teacher)),
        baseline(entry(E::NewsList, S::News, Get, "/api/news", Authenticated)),
        entry(E::NewsById, S::News, Get, "/api/news/{articleId}", Authenticated),
        entry(E::NewsCreate, S::News, Post, "/api/news", MinRole(Role::Staff)),
        toggle(entry(E::NewsLike, S::News, Post, "/api/news/{articleId}/like", Authenticated), "liked"),
        toggle(
            entry(E::NewsPin, S::News, Post, "/api/news/{articleId}/pin", MinRole(Role::Staff)),
            "pinned",
        ),
        baseline(entry(E::EventsList, S::Planning, Get, "/api/planning/events", Authenticated)),
        entry(E::EventCreate, S::Planning, Post, "/api/planning/events", MinRole(Role::Teacher)),
        toggle(
            entry(
                E::EventAttendance,
                S::Planning,
                Post,
                "/api/planning/events/{eventId}/attendance",
                Authenticated,
            ),
            "attending",
        ),
        baseline(entry(
            E::StatisticsDashboard,
            S::Statistics,
            Get,
            "/api/statistics/dashboard",
            Authenticated,
        )),
        entry(E::StatisticsAdmin, S::Statistics, Get, "/api/statistics/admin", MinRole(Role::Admin)),
        baseline(entry(
            E::NotificationsList,
            S::Notification,
            Get,
            "/api/notifications",
            Authenticated,
        )),
        entry(
            E::NotificationCreate,
            S::Notification,
            Post,
            "/api/notifications",
            MinRole(Role::Staff),
        ),
    ]
};

/// Policy errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    /// A path template parameter was not supplied.
    #[error("missing path parameter {param} for {path}")]
    MissingParam {
        /// Parameter name.
        param: String,
        /// Path template.
        path: &'static str,
    },
}

impl Endpoint {
    /// Returns the path parameter names in template order.
    #[must_use]
    pub fn path_params(&self) -> Vec<&'static str> {
        self.path
            .split('/')
            .filter_map(|segment| segment.strip_prefix('{').and_then(|rest| rest.strip_suffix('}')))
            .collect()
    }

    /// Returns true when the endpoint addresses a user by id.
    #[must_use]
    pub fn targets_user(&self) -> bool {
        self.path.contains("{userId}")
    }

    /// Renders the path template with the supplied parameters.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::MissingParam`] when a template parameter is absent.
    pub fn render(&self, params: &[(&str, &str)]) -> Result<String, PolicyError> {
        let mut rendered = Vec::new();
        for segment in self.path.split('/') {
            match segment.strip_prefix('{').and_then(|rest| rest.strip_suffix('}')) {
                Some(name) => {
                    let value = params
                        .iter()
                        .find(|(key, _)| *key == name)
                        .map(|(_, value)| *value)
                        .ok_or_else(|| PolicyError::MissingParam {
                            param: name.to_string(),
                            path: self.path,
                        })?;
                    rendered.push(value.to_string());
                }
                None => rendered.push(segment.to_string()),
            }
        }
        Ok(rendered.join("/"))
    }

    /// Returns a short `METHOD path` label.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

/// Returns the baseline read endpoint of every service, in catalogue order.
#[must_use]
pub fn baseline_endpoints() -> Vec<&'static Endpoint> {
    ENDPOINTS.iter().filter(|endpoint| endpoint.baseline).collect()
}

// ============================================================================
// SECTION: Outcomes
// ============================================================================

/// Authorization outcome class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    /// Request permitted (any 2xx).
    Allow,
    /// Credential missing or no longer valid (401).
    Unauthenticated,
    /// Authenticated but not entitled (403).
    Forbidden,
    /// Resource absent or hidden (404).
    NotFound,
}

impl Access {
    /// Returns true when `status` belongs to this outcome class.
    #[must_use]
    pub const fn matches(self, status: u16) -> bool {
        match self {
            Self::Allow => is_success(status),
            Self::Unauthenticated => status == 401,
            Self::Forbidden => status == 403,
            Self::NotFound => status == 404,
        }
    }

    /// Classifies a status code, returning `None` for statuses outside the model.
    #[must_use]
    pub const fn classify(status: u16) -> Option<Self> {
        match status {
            200..=299 => Some(Self::Allow),
            401 => Some(Self::Unauthenticated),
            403 => Some(Self::Forbidden),
            404 => Some(Self::NotFound),
            _ => None,
        }
    }

    /// Returns a status label (`2xx`, `401`, `403`, `404`).
    #[must_use]
    pub const fn status_label(self) -> &'static str {
        match self {
            Self::Allow => "2xx",
            Self::Unauthenticated => "401",
            Self::Forbidden => "403",
            Self::NotFound => "404",
        }
    }
}

/// Expected outcome of one call.
///
/// # Invariants
/// - `tolerated` is only set for documented alternatives (deleted-user by-id lookups).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expectation {
    /// The outcome the platform must produce.
    pub primary: Access,
    /// A documented alternative outcome, if any.
    pub tolerated: Option<Access>,
}

impl Expectation {
    /// Expects exactly one outcome.
    #[must_use]
    pub const fn exactly(access: Access) -> Self {
        Self {
            primary: access,
            tolerated: None,
        }
    }

    /// Returns true when `status` satisfies the expectation.
    #[must_use]
    pub fn accepts(&self, status: u16) -> bool {
        self.primary.matches(status) || self.tolerated.is_some_and(|alt| alt.matches(status))
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tolerated {
            Some(alt) => write!(f, "{}|{}", self.primary.status_label(), alt.status_label()),
            None => f.write_str(self.primary.status_label()),
        }
    }
}

// ============================================================================
// SECTION: Authorization Function
// ============================================================================

/// Caller identity state at request time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    /// No credential presented.
    Anonymous,
    /// Active account.
    Active {
        /// User identifier.
        id: UserId,
        /// Current role.
        role: Role,
    },
    /// Account exists but has been deactivated.
    Inactive {
        /// User identifier.
        id: UserId,
    },
    /// Account record has been deleted.
    Deleted {
        /// User identifier.
        id: UserId,
    },
}

/// Returns the expected outcome for `principal` calling `endpoint` on `target`.
///
/// `target` is the user addressed by a `{userId}` path parameter, if any.
#[must_use]
pub fn authorize(principal: &Principal, endpoint: &Endpoint, target: Option<&UserId>) -> Expectation {
    match principal {
        Principal::Anonymous | Principal::Inactive { .. } => {
            Expectation::exactly(Access::Unauthenticated)
        }
        Principal::Deleted { id } => {
            if endpoint.targets_user() && target == Some(id) {
                Expectation {
                    primary: Access::Unauthenticated,
                    tolerated: Some(Access::NotFound),
                }
            } else {
                Expectation::exactly(Access::Unauthenticated)
            }
        }
        Principal::Active { id, role } => {
            let allowed = match endpoint.rule {
                AccessRule::Authenticated => true,
                AccessRule::MinRole(required) => role.at_least(required),
                AccessRule::SelfOrMinRole(required) => {
                    target == Some(id) || role.at_least(required)
                }
            };
            Expectation::exactly(if allowed { Access::Allow } else { Access::Forbidden })
        }
    }
}

/// Returns the expected outcome of a self profile update requesting `requested`.
///
/// Returns `None` when the request does not raise privilege.
#[must_use]
pub fn escalation_expectation(current: Role, requested: Role) -> Option<Access> {
    (requested > current).then_some(Access::Forbidden)
}

/// One row of the rendered expectation matrix.
#[derive(Debug, Clone)]
pub struct MatrixRow {
    /// Catalogue endpoint.
    pub endpoint: &'static Endpoint,
    /// Expected outcome per role, least privileged first.
    pub cells: Vec<(Role, Expectation)>,
}

/// Renders the expected matrix for active principals addressing another user.
#[must_use]
pub fn expected_matrix() -> Vec<MatrixRow> {
    let caller = UserId::new("caller");
    let other = UserId::new("other");
    ENDPOINTS
        .iter()
        .map(|endpoint| MatrixRow {
            endpoint,
            cells: Role::ALL
                .into_iter()
                .map(|role| {
                    let principal = Principal::Active {
                        id: caller.clone(),
                        role,
                    };
                    (role, authorize(&principal, endpoint, Some(&other)))
                })
                .collect(),
        })
        .collect()
}

// ============================================================================
// SECTION: Content Visibility
// ============================================================================

/// Publication status of news and announcement content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentStatus {
    /// Not yet published.
    Draft,
    /// Publicly listed.
    Published,
    /// Withdrawn from listings.
    Archived,
}

impl ContentStatus {
    /// All statuses in lifecycle order.
    pub const ALL: [Self; 3] = [Self::Draft, Self::Published, Self::Archived];

    /// Returns the wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Archived => "archived",
        }
    }

    /// Returns true when the lifecycle allows moving from `self` to `next`.
    ///
    /// The lifecycle is `draft -> published -> archived`; archived is terminal.
    #[must_use]
    pub const fn can_transition(self, next: Self) -> bool {
        matches!((self, next), (Self::Draft, Self::Published) | (Self::Published, Self::Archived))
    }
}

/// Audience restriction of content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Every authenticated user.
    Public,
    /// Course participants; modelled as teacher and above.
    CourseOnly,
    /// Staff and administrators.
    StaffOnly,
    /// Administrators and the author.
    Restricted,
}

impl Visibility {
    /// All visibilities, least restrictive first.
    pub const ALL: [Self; 4] = [Self::Public, Self::CourseOnly, Self::StaffOnly, Self::Restricted];

    /// Returns the wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::CourseOnly => "course_only",
            Self::StaffOnly => "staff_only",
            Self::Restricted => "restricted",
        }
    }
}

/// Returns true when a caller of `role` may see content with the given attributes.
#[must_use]
pub fn can_view(role: Role, is_author: bool, status: ContentStatus, visibility: Visibility) -> bool {
    if is_author {
        return true;
    }
    if status != ContentStatus::Published && !role.at_least(Role::Staff) {
        return false;
    }
    match visibility {
        Visibility::Public => true,
        Visibility::CourseOnly => role.at_least(Role::Teacher),
        Visibility::StaffOnly => role.at_least(Role::Staff),
        Visibility::Restricted => role == Role::Admin,
    }
}

/// Returns the expected outcome of a direct read of content by id.
#[must_use]
pub fn read_expectation(
    role: Role,
    is_author: bool,
    status: ContentStatus,
    visibility: Visibility,
) -> Access {
    if can_view(role, is_author, status, visibility) { Access::Allow } else { Access::NotFound }
}
