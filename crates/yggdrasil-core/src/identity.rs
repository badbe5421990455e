// crates/yggdrasil-core/src/identity.rs
// ============================================================================
// Module: Identity Model
// Description: Platform roles, user identifiers, and test identities.
// Purpose: Provide the typed identity every scenario and policy decision uses.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! A [`TestUser`] is a platform identity minted by the auth service for a
//! single scenario. Its [`Role`] fixes the full permission set of every token
//! issued for it; its [`UserId`] is assigned once by the auth service and never
//! changes afterwards.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

// ============================================================================
// SECTION: Role
// ============================================================================

/// Platform role.
///
/// # Invariants
/// - Variants are totally ordered by privilege: `Student < Teacher < Staff < Admin`.
/// - Wire form is the lowercase variant name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Enrolled learner.
    Student,
    /// Course owner and instructor.
    Teacher,
    /// Administrative staff.
    Staff,
    /// Platform administrator.
    Admin,
}

impl Role {
    /// All roles, least privileged first.
    pub const ALL: [Self; 4] = [Self::Student, Self::Teacher, Self::Staff, Self::Admin];

    /// Returns the wire label for the role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Teacher => "teacher",
            Self::Staff => "staff",
            Self::Admin => "admin",
        }
    }

    /// Returns true when this role holds at least the privileges of `required`.
    #[must_use]
    pub fn at_least(self, required: Self) -> bool {
        self >= required
    }

    /// Returns every role strictly more privileged than this one.
    #[must_use]
    pub fn higher_roles(self) -> Vec<Self> {
        Self::ALL.into_iter().filter(|role| *role > self).collect()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a role label is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "student" => Ok(Self::Student),
            "teacher" => Ok(Self::Teacher),
            "staff" => Ok(Self::Staff),
            "admin" => Ok(Self::Admin),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

// ============================================================================
// SECTION: Identifiers
// ============================================================================

/// User identifier assigned by the auth service.
///
/// # Invariants
/// - Opaque string; the harness never derives meaning from its content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Creates a user identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// SECTION: Test Users
// ============================================================================

/// Profile block submitted at registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// Optional phone number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Optional department or programme.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    /// Additional profile fields passed through untouched.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Identity created for one scenario.
///
/// # Invariants
/// - `id` is the auth-service identifier captured at registration.
/// - `password` is never included in `Debug` output.
#[derive(Clone, PartialEq)]
pub struct TestUser {
    /// Identifier assigned by the auth service.
    pub id: UserId,
    /// Login email.
    pub email: String,
    /// Role at creation time.
    pub role: Role,
    /// Registration profile.
    pub profile: Profile,
    /// Plaintext password used to obtain tokens.
    pub password: String,
    /// Whether the account was active when last observed.
    pub is_active: bool,
}

impl TestUser {
    /// Returns a display name built from the profile.
    #[must_use]
    pub fn display_name(&self) -> String {
        format!("{} {}", self.profile.first_name, self.profile.last_name)
    }
}

impl fmt::Debug for TestUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestUser")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("role", &self.role)
            .field("profile", &self.profile)
            .field("password", &"<redacted>")
            .field("is_active", &self.is_active)
            .finish()
    }
}

/// One freshly created user per role.
#[derive(Debug, Clone)]
pub struct TestUserSet {
    /// Administrator.
    pub admin: TestUser,
    /// Staff member.
    pub staff: TestUser,
    /// Teacher.
    pub teacher: TestUser,
    /// Student.
    pub student: TestUser,
}

impl TestUserSet {
    /// Returns the user holding `role`.
    #[must_use]
    pub const fn get(&self, role: Role) -> &TestUser {
        match role {
            Role::Admin => &self.admin,
            Role::Staff => &self.staff,
            Role::Teacher => &self.teacher,
            Role::Student => &self.student,
        }
    }

    /// Iterates users least privileged first.
    pub fn iter(&self) -> impl Iterator<Item = &TestUser> {
        Role::ALL.into_iter().map(|role| self.get(role))
    }
}
