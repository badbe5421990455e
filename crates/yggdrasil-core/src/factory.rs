// crates/yggdrasil-core/src/factory.rs
// ============================================================================
// Module: Test Data Factory
// Description: Realistic request payloads for users, courses, events, articles, notifications.
// Purpose: Generate create-contract payloads from templates plus randomization.
// Dependencies: rand, serde, serde_json, time
// ============================================================================

//! ## Overview
//! [`TestDataFactory`] builds payloads that honor each service's create
//! contract. Overrides are deep-merged over the generated payload and the
//! merged result is re-validated, so an override can change any field but
//! cannot produce a payload that breaks a contract invariant (for example an
//! event whose `startDate` is not before its `endDate`).
//!
//! Every generated email lives under [`TEST_EMAIL_DOMAIN`] and embeds a
//! per-factory run tag plus a counter, so concurrent runs never collide.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Mutex;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use rand::Rng;
use rand::SeedableRng;
use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use time::Duration;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::identity::Profile;
use crate::identity::Role;
use crate::policy::ContentStatus;
use crate::policy::Visibility;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Email domain reserved for generated identities.
pub const TEST_EMAIL_DOMAIN: &str = "yggdrasil-test.local";

const FIRST_NAMES: &[&str] = &[
    "Astrid", "Bjorn", "Freya", "Leif", "Ingrid", "Sven", "Sigrid", "Erik", "Helga", "Ivar",
    "Maja", "Nils", "Liv", "Tove", "Ragnar", "Solveig",
];
const LAST_NAMES: &[&str] = &[
    "Andersen", "Berg", "Dahl", "Eriksen", "Holm", "Johansen", "Lund", "Nilsen", "Olsen",
    "Strand", "Vik", "Haugen",
];
const DEPARTMENTS: &[&str] =
    &["Computer Science", "Mathematics", "Physics", "Literature", "History", "Biology"];
const COURSE_SUBJECTS: &[&str] = &[
    "Distributed Systems",
    "Linear Algebra",
    "Organic Chemistry",
    "Modern Poetry",
    "Medieval History",
    "Compiler Construction",
    "Statistics",
];
const COURSE_LEVELS: &[&str] = &["beginner", "intermediate", "advanced"];
const WEEKDAYS: &[&str] = &["monday", "tuesday", "wednesday", "thursday", "friday"];
const ROOMS: &[&str] = &["A101", "B204", "C310", "Lab 2", "Auditorium"];
const EVENT_TYPES: &[&str] = &["lecture", "exam", "workshop", "meeting"];
const NEWS_CATEGORIES: &[&str] = &["announcement", "academic", "campus", "events"];
const NOTIFICATION_TYPES: &[&str] = &["info", "reminder", "alert"];
const NOTIFICATION_PRIORITIES: &[&str] = &["low", "normal", "high"];

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Factory errors.
///
/// # Invariants
/// - Variants are stable for fixture diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FactoryError {
    /// Merged payload no longer matches the create contract shape.
    #[error("invalid {kind} payload: {message}")]
    Invalid {
        /// Payload kind.
        kind: &'static str,
        /// Failure detail.
        message: String,
    },
    /// Payload could not be serialized.
    #[error("payload serialization failed: {0}")]
    Serialization(String),
}

fn invalid(kind: &'static str, message: impl Into<String>) -> FactoryError {
    FactoryError::Invalid {
        kind,
        message: message.into(),
    }
}

// ============================================================================
// SECTION: Payload Shapes
// ============================================================================

/// Registration payload accepted by the auth service.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserPayload {
    email: String,
    password: String,
    role: Role,
    profile: Profile,
}

/// Weekly schedule slot of a course.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleSlot {
    /// Lowercase weekday name.
    pub day_of_week: String,
    /// Start time `HH:MM`.
    pub start_time: String,
    /// End time `HH:MM`.
    pub end_time: String,
    /// Room label.
    pub room: String,
}

/// Course creation payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoursePayload {
    /// Course title.
    pub title: String,
    /// Course code.
    pub code: String,
    /// Free-text description.
    pub description: String,
    /// Duration in weeks; must be positive.
    pub duration: u32,
    /// Weekly schedule; must not be empty.
    pub schedule: Vec<ScheduleSlot>,
    /// Maximum enrollment.
    pub capacity: u32,
    /// Difficulty level.
    pub level: String,
    /// ECTS credits.
    pub credits: u32,
}

/// Calendar event creation payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    /// Event title.
    pub title: String,
    /// Free-text description.
    pub description: String,
    /// RFC 3339 start; strictly before `end_date`.
    pub start_date: String,
    /// RFC 3339 end.
    pub end_date: String,
    /// Location label.
    pub location: String,
    /// Event type.
    #[serde(rename = "type")]
    pub kind: String,
    /// Audience restriction.
    pub visibility: Visibility,
}

/// News article creation payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticlePayload {
    /// Headline.
    pub title: String,
    /// Short summary.
    pub summary: String,
    /// Body text.
    pub content: String,
    /// Category label.
    pub category: String,
    /// Lifecycle status.
    pub status: ContentStatus,
    /// Audience restriction.
    pub visibility: Visibility,
    /// Free-form tags.
    pub tags: Vec<String>,
}

/// Notification creation payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    /// Title line.
    pub title: String,
    /// Message body.
    pub message: String,
    /// Notification type.
    #[serde(rename = "type")]
    pub kind: String,
    /// Delivery priority.
    pub priority: String,
    /// Recipient roles.
    pub recipient_roles: Vec<Role>,
}

/// A generated registration request plus the credentials it carries.
#[derive(Clone)]
pub struct NewUser {
    /// Login email.
    pub email: String,
    /// Plaintext password.
    pub password: String,
    /// Requested role.
    pub role: Role,
    /// Profile block.
    pub profile: Profile,
    /// Full registration body after overrides.
    pub body: Value,
}

impl std::fmt::Debug for NewUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewUser")
            .field("email", &self.email)
            .field("role", &self.role)
            .field("profile", &self.profile)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// SECTION: Factory
// ============================================================================

/// Generator of realistic create payloads.
///
/// # Invariants
/// - Generated emails are unique per factory instance.
pub struct TestDataFactory {
    rng: Mutex<StdRng>,
    run_tag: String,
    counter: AtomicU64,
}

impl Default for TestDataFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl TestDataFactory {
    /// Creates a factory seeded from OS entropy.
    #[must_use]
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    /// Creates a deterministic factory for reproducible fixtures.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(mut rng: StdRng) -> Self {
        let run_tag: String =
            (&mut rng).sample_iter(&Alphanumeric).take(6).map(char::from).collect();
        Self {
            rng: Mutex::new(rng),
            run_tag: run_tag.to_ascii_lowercase(),
            counter: AtomicU64::new(0),
        }
    }

    /// Returns the tag embedded in every identity this factory generates.
    #[must_use]
    pub fn run_tag(&self) -> &str {
        &self.run_tag
    }

    /// Builds a registration payload for `role`.
    ///
    /// # Errors
    ///
    /// Returns [`FactoryError`] when overrides break the payload shape.
    pub fn user(&self, role: Role, overrides: Option<&Value>) -> Result<NewUser, FactoryError> {
        let sequence = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let payload = self.with_rng(|rng| {
            let first = pick(rng, FIRST_NAMES);
            let last = pick(rng, LAST_NAMES);
            let suffix: String = (0..10).map(|_| char::from(rng.sample(Alphanumeric))).collect();
            UserPayload {
                email: format!(
                    "{}.{}.{}{sequence}@{TEST_EMAIL_DOMAIN}",
                    first.to_ascii_lowercase(),
                    last.to_ascii_lowercase(),
                    self.run_tag
                ),
                password: format!("Ygg!{suffix}9a"),
                role,
                profile: Profile {
                    first_name: first.to_string(),
                    last_name: last.to_string(),
                    phone: Some(format!("+47 {}", rng.gen_range(40_000_000..99_999_999))),
                    department: Some(pick(rng, DEPARTMENTS).to_string()),
                    extra: std::collections::BTreeMap::new(),
                },
            }
        });
        let body = merged("user", &payload, overrides)?;
        let parsed: UserPayload =
            serde_json::from_value(body.clone()).map_err(|err| invalid("user", err.to_string()))?;
        if !parsed.email.contains('@') {
            return Err(invalid("user", "email must contain '@'"));
        }
        if parsed.password.len() < 8 {
            return Err(invalid("user", "password must be at least 8 characters"));
        }
        Ok(NewUser {
            email: parsed.email,
            password: parsed.password,
            role: parsed.role,
            profile: parsed.profile,
            body,
        })
    }

    /// Builds `count` registration payloads for `role`.
    ///
    /// # Errors
    ///
    /// Returns [`FactoryError`] when any payload fails validation.
    pub fn users(&self, role: Role, count: usize) -> Result<Vec<NewUser>, FactoryError> {
        (0..count).map(|_| self.user(role, None)).collect()
    }

    /// Builds a course creation payload.
    ///
    /// # Errors
    ///
    /// Returns [`FactoryError`] when the merged payload has no schedule or zero duration.
    pub fn course(&self, overrides: Option<&Value>) -> Result<Value, FactoryError> {
        let payload = self.with_rng(|rng| {
            let subject = pick(rng, COURSE_SUBJECTS);
            let slots = rng.gen_range(1..=3);
            let mut days: Vec<&str> = WEEKDAYS.to_vec();
            days.shuffle(rng);
            let schedule = days
                .into_iter()
                .take(slots)
                .map(|day| {
                    let start = rng.gen_range(8..16);
                    ScheduleSlot {
                        day_of_week: day.to_string(),
                        start_time: format!("{start:02}:00"),
                        end_time: format!("{:02}:30", start + 1),
                        room: pick(rng, ROOMS).to_string(),
                    }
                })
                .collect();
            CoursePayload {
                title: format!("{subject} {}", rng.gen_range(100..500)),
                code: format!("YGG-{}", rng.gen_range(1000..9999)),
                description: format!("An introduction to {}.", subject.to_ascii_lowercase()),
                duration: rng.gen_range(4..=16),
                schedule,
                capacity: rng.gen_range(10..=120),
                level: pick(rng, COURSE_LEVELS).to_string(),
                credits: *[5_u32, 7, 10, 15].choose(rng).unwrap_or(&5),
            }
        });
        let body = merged("course", &payload, overrides)?;
        let parsed: CoursePayload =
            serde_json::from_value(body.clone()).map_err(|err| invalid("course", err.to_string()))?;
        if parsed.duration == 0 {
            return Err(invalid("course", "duration must be positive"));
        }
        if parsed.schedule.is_empty() {
            return Err(invalid("course", "schedule must not be empty"));
        }
        Ok(body)
    }

    /// Builds a calendar event creation payload.
    ///
    /// # Errors
    ///
    /// Returns [`FactoryError`] when dates do not parse or `startDate >= endDate`.
    pub fn event(&self, overrides: Option<&Value>) -> Result<Value, FactoryError> {
        let now = OffsetDateTime::now_utc();
        let payload = self.with_rng(|rng| {
            let start = now + Duration::days(rng.gen_range(1..30)) + Duration::hours(rng.gen_range(0..8));
            let end = start + Duration::minutes(rng.gen_range(1..=4) * 45);
            EventPayload {
                title: format!("{} session", pick(rng, COURSE_SUBJECTS)),
                description: "Generated calendar event.".to_string(),
                start_date: start.format(&Rfc3339).unwrap_or_default(),
                end_date: end.format(&Rfc3339).unwrap_or_default(),
                location: pick(rng, ROOMS).to_string(),
                kind: pick(rng, EVENT_TYPES).to_string(),
                visibility: Visibility::Public,
            }
        });
        let body = merged("event", &payload, overrides)?;
        let parsed: EventPayload =
            serde_json::from_value(body.clone()).map_err(|err| invalid("event", err.to_string()))?;
        let start = OffsetDateTime::parse(&parsed.start_date, &Rfc3339)
            .map_err(|err| invalid("event", format!("startDate: {err}")))?;
        let end = OffsetDateTime::parse(&parsed.end_date, &Rfc3339)
            .map_err(|err| invalid("event", format!("endDate: {err}")))?;
        if start >= end {
            return Err(invalid("event", "startDate must be before endDate"));
        }
        Ok(body)
    }

    /// Builds a news article creation payload (published, public by default).
    ///
    /// # Errors
    ///
    /// Returns [`FactoryError`] when the merged payload has an unknown status or visibility.
    pub fn article(&self, overrides: Option<&Value>) -> Result<Value, FactoryError> {
        let payload = self.with_rng(|rng| {
            let category = pick(rng, NEWS_CATEGORIES);
            ArticlePayload {
                title: format!("{} update #{}", capitalize(category), rng.gen_range(1..1000)),
                summary: "Generated announcement summary.".to_string(),
                content: "Generated announcement body for authorization scenarios.".to_string(),
                category: category.to_string(),
                status: ContentStatus::Published,
                visibility: Visibility::Public,
                tags: vec![category.to_string(), "generated".to_string()],
            }
        });
        let body = merged("article", &payload, overrides)?;
        serde_json::from_value::<ArticlePayload>(body.clone())
            .map_err(|err| invalid("article", err.to_string()))?;
        Ok(body)
    }

    /// Builds a notification creation payload.
    ///
    /// # Errors
    ///
    /// Returns [`FactoryError`] when the merged payload has no recipients.
    pub fn notification(&self, overrides: Option<&Value>) -> Result<Value, FactoryError> {
        let payload = self.with_rng(|rng| NotificationPayload {
            title: "Schedule change".to_string(),
            message: format!("Room moved to {}.", pick(rng, ROOMS)),
            kind: pick(rng, NOTIFICATION_TYPES).to_string(),
            priority: pick(rng, NOTIFICATION_PRIORITIES).to_string(),
            recipient_roles: vec![Role::Student, Role::Teacher],
        });
        let body = merged("notification", &payload, overrides)?;
        let parsed: NotificationPayload = serde_json::from_value(body.clone())
            .map_err(|err| invalid("notification", err.to_string()))?;
        if parsed.recipient_roles.is_empty() {
            return Err(invalid("notification", "recipientRoles must not be empty"));
        }
        Ok(body)
    }

    fn with_rng<T>(&self, build: impl FnOnce(&mut StdRng) -> T) -> T {
        match self.rng.lock() {
            Ok(mut guard) => build(&mut guard),
            Err(poisoned) => build(&mut poisoned.into_inner()),
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Deep-merges `overrides` into `base`: objects merge per key, everything else replaces.
pub fn merge_overrides(base: &mut Value, overrides: &Value) {
    match (base, overrides) {
        (Value::Object(base), Value::Object(overrides)) => {
            for (key, value) in overrides {
                match base.get_mut(key) {
                    Some(existing) => merge_overrides(existing, value),
                    None => {
                        base.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overrides) => *base = overrides.clone(),
    }
}

fn merged<T: Serialize>(
    kind: &'static str,
    payload: &T,
    overrides: Option<&Value>,
) -> Result<Value, FactoryError> {
    let mut body =
        serde_json::to_value(payload).map_err(|err| FactoryError::Serialization(err.to_string()))?;
    if let Some(overrides) = overrides {
        if !overrides.is_object() {
            return Err(invalid(kind, "overrides must be a json object"));
        }
        merge_overrides(&mut body, overrides);
    }
    Ok(body)
}

fn pick<'a>(rng: &mut StdRng, items: &[&'a str]) -> &'a str {
    items.choose(rng).copied().unwrap_or_default()
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    chars.next().map_or_else(String::new, |first| first.to_uppercase().chain(chars).collect())
}
