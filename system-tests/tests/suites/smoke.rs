// system-tests/tests/suites/smoke.rs
// ============================================================================
// Module: Smoke Tests
// Description: Readiness and identity round trips against the platform stub.
// Purpose: Fail fast when the stub or the harness clients are miswired.
// Dependencies: system-tests helpers, yggdrasil-harness
// ============================================================================

//! Smoke tests for the platform stub and the identity helper.

use helpers::artifacts::TestReporter;
use helpers::harness::READY_TIMEOUT;
use helpers::harness::fixture_context;
use helpers::platform_stub::spawn_platform;
use helpers::readiness::wait_for_platform;
use serde_json::json;
use yggdrasil_core::Role;
use yggdrasil_core::ServiceName;

use crate::helpers;

type TestResult = Result<(), String>;

#[tokio::test(flavor = "multi_thread")]
async fn every_service_answers_health() -> TestResult {
    let mut reporter = TestReporter::new("every_service_answers_health").map_err(|err| err.to_string())?;
    let stub = spawn_platform(&[])?;
    let context = fixture_context(&stub)?;
    wait_for_platform(&context, READY_TIMEOUT).await?;
    for service in ServiceName::ALL {
        assert!(stub.url(service).starts_with("http://127.0.0.1:"), "{service} url");
    }
    let probes = context.transcript().len();
    assert!(probes >= ServiceName::ALL.len(), "expected one probe per service, saw {probes}");
    reporter
        .finish("pass", vec!["all seven services ready".to_string()], Vec::new())
        .map_err(|err| err.to_string())
}

#[tokio::test(flavor = "multi_thread")]
async fn registration_login_and_refresh_issue_tokens() -> TestResult {
    let mut reporter =
        TestReporter::new("registration_login_and_refresh_issue_tokens").map_err(|err| err.to_string())?;
    let stub = spawn_platform(&[])?;
    let context = fixture_context(&stub)?;
    wait_for_platform(&context, READY_TIMEOUT).await?;
    let auth = context.auth();

    let user = auth.create_test_user(Role::Teacher, None).await.map_err(|err| err.to_string())?;
    let stored = stub.store().get(&user.id).map_err(|err| err.to_string())?.expect("stored user");
    assert_eq!(stored.role, Role::Teacher);
    assert!(stored.is_active);

    let session = auth.login(&user).await.map_err(|err| err.to_string())?;
    assert!(session.refresh_token.is_some());
    let refreshed = auth.refresh_token(&user).await.map_err(|err| err.to_string())?;
    assert_ne!(refreshed, session.token);

    let client =
        auth.create_authenticated_client(ServiceName::Auth, &user).await.map_err(|err| err.to_string())?;
    let me = client.get("/api/auth/me").await.map_err(|err| err.to_string())?;
    assert_eq!(me.status, 200);
    assert_eq!(me.data["role"], json!("teacher"));
    assert_eq!(me.data["id"], json!(user.id.as_str()));

    let anonymous = auth.anonymous_client(ServiceName::Auth).map_err(|err| err.to_string())?;
    let rejected = anonymous.get("/api/auth/me").await.expect_err("anonymous me");
    assert_eq!(rejected.status(), Some(401));

    let released = context.release().await;
    assert_eq!(released.users.failed, 0);
    assert!(released.users.deleted >= 1);
    assert!(stub.store().get(&user.id).map_err(|err| err.to_string())?.is_none());
    reporter
        .finish("pass", vec!["tokens issued, refreshed, and revoked on cleanup".to_string()], Vec::new())
        .map_err(|err| err.to_string())
}

#[tokio::test(flavor = "multi_thread")]
async fn cleanup_counts_missing_users_as_deleted() -> TestResult {
    let mut reporter =
        TestReporter::new("cleanup_counts_missing_users_as_deleted").map_err(|err| err.to_string())?;
    let stub = spawn_platform(&[])?;
    let context = fixture_context(&stub)?;
    wait_for_platform(&context, READY_TIMEOUT).await?;
    let auth = context.auth();
    let first = auth.create_test_user(Role::Student, None).await.map_err(|err| err.to_string())?;
    let second = auth.create_test_user(Role::Staff, None).await.map_err(|err| err.to_string())?;
    assert!(stub.store().remove(&first.id).map_err(|err| err.to_string())?);

    let released = context.release().await;
    assert_eq!(released.users.failed, 0);
    assert_eq!(released.users.deleted, 3, "two fixtures plus the admin actor");
    for id in [&first.id, &second.id] {
        assert!(stub.store().get(id).map_err(|err| err.to_string())?.is_none());
    }
    reporter
        .finish("pass", vec!["cleanup tolerated an already-deleted user".to_string()], Vec::new())
        .map_err(|err| err.to_string())
}

#[tokio::test(flavor = "multi_thread")]
async fn admin_mutations_apply_to_live_tokens() -> TestResult {
    let mut reporter =
        TestReporter::new("admin_mutations_apply_to_live_tokens").map_err(|err| err.to_string())?;
    let stub = spawn_platform(&[])?;
    let context = fixture_context(&stub)?;
    wait_for_platform(&context, READY_TIMEOUT).await?;
    let auth = context.auth();

    let user = auth.create_test_user(Role::Student, None).await.map_err(|err| err.to_string())?;
    let courses =
        auth.create_authenticated_client(ServiceName::Course, &user).await.map_err(|err| err.to_string())?;
    let profile =
        auth.create_authenticated_client(ServiceName::User, &user).await.map_err(|err| err.to_string())?;
    assert_eq!(courses.get("/api/courses").await.map_err(|err| err.to_string())?.status, 200);

    auth.deactivate_user(&user.id).await.map_err(|err| err.to_string())?;
    let rejected = courses.get("/api/courses").await.expect_err("deactivated token");
    assert_eq!(rejected.status(), Some(401));
    let stored = stub.store().get(&user.id).map_err(|err| err.to_string())?.expect("stored user");
    assert!(!stored.is_active);

    auth.reactivate_user(&user.id).await.map_err(|err| err.to_string())?;
    assert_eq!(courses.get("/api/courses").await.map_err(|err| err.to_string())?.status, 200);
    let stored = stub.store().get(&user.id).map_err(|err| err.to_string())?.expect("stored user");
    assert!(stored.is_active);

    auth.change_role(&user.id, Role::Teacher).await.map_err(|err| err.to_string())?;
    let me = profile.get("/api/users/profile").await.map_err(|err| err.to_string())?;
    assert_eq!(me.data["role"], json!("teacher"));
    let stored = stub.store().get(&user.id).map_err(|err| err.to_string())?.expect("stored user");
    assert_eq!(stored.role, Role::Teacher);

    let addressed = format!("/api/users/{}/", user.id.as_str());
    let mutations: Vec<(String, Option<u16>)> = context
        .transcript()
        .entries()
        .into_iter()
        .filter(|entry| entry.method == "PATCH" && entry.path.starts_with(&addressed))
        .map(|entry| (entry.path[addressed.len()..].to_string(), entry.status))
        .collect();
    let expected: Vec<(String, Option<u16>)> =
        ["deactivate", "activate", "role"].into_iter().map(|action| (action.to_string(), Some(200))).collect();
    assert_eq!(mutations, expected);

    let released = context.release().await;
    assert_eq!(released.users.failed, 0);
    reporter
        .finish("pass", vec!["deactivate, reactivate, and role change observed live".to_string()], Vec::new())
        .map_err(|err| err.to_string())
}
