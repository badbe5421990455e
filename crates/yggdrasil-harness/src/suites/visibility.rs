// crates/yggdrasil-harness/src/suites/visibility.rs
// ============================================================================
// Module: Visibility Suite
// Description: Listing and direct-read filtering of news content.
// Purpose: Ensure hidden drafts and restricted items never leak.
// Dependencies: serde_json, yggdrasil-core
// ============================================================================

//! ## Overview
//! Two authors, the admin actor and a staff user, each author one article per
//! status and visibility pair. Viewers of every role, including an admin who
//! authored nothing, then list news and read every article by id, as do both
//! authors. Authorship is judged per article:
//! - a hidden article appearing in the listing is a violation;
//! - a direct read must answer 200 when visible and 404 when hidden.
//!
//! Visible articles missing from a listing are not flagged, since live
//! services may paginate. Anonymous callers get 401 for both calls.

use std::collections::BTreeSet;

use serde_json::json;
use yggdrasil_core::ContentStatus;
use yggdrasil_core::EndpointId;
use yggdrasil_core::Expectation;
use yggdrasil_core::Principal;
use yggdrasil_core::Role;
use yggdrasil_core::ServiceName;
use yggdrasil_core::TestUser;
use yggdrasil_core::UserId;
use yggdrasil_core::Visibility;
use yggdrasil_core::authorize;
use yggdrasil_core::can_view;
use yggdrasil_core::read_expectation;

use super::probe::check;
use super::probe::list_items;
use super::probe::resource_id;
use super::seed_resource_as;
use crate::error::HarnessError;
use crate::fixture::FixtureContext;
use crate::report::ScenarioReport;
use crate::report::StepOutcome;

const SUITE: &str = "visibility";

/// An article seeded for the matrix.
struct Seeded {
    id: String,
    author: UserId,
    author_role: Role,
    status: ContentStatus,
    visibility: Visibility,
}

impl Seeded {
    fn label(&self) -> String {
        format!("{}/{} by {}", self.status.as_str(), self.visibility.as_str(), self.author_role)
    }
}

/// Runs listing and direct-read checks for every viewer role and both authors.
pub async fn run(context: &FixtureContext) -> ScenarioReport {
    let mut report = ScenarioReport::new(SUITE, "content visibility");
    let authors = match authors(context).await {
        Ok(authors) => authors,
        Err(err) => {
            report.fixture_failed("create authors", &err);
            return report.finish();
        }
    };
    let mut articles = Vec::new();
    for author in &authors {
        match seed_articles(context, author).await {
            Ok(seeded) => articles.extend(seeded),
            Err(err) => {
                report.fixture_failed(format!("seed {} articles", author.role), &err);
                return report.finish();
            }
        }
    }
    for role in Role::ALL {
        match context.auth().create_test_user(role, None).await {
            Ok(viewer) => view_all(context, &mut report, &viewer, &role.to_string(), &articles).await,
            Err(err) => report.fixture_failed(format!("create {role} viewer"), &err),
        }
    }
    for author in &authors {
        let name = format!("{} author", author.role);
        view_all(context, &mut report, author, &name, &articles).await;
    }
    anonymous(context, &mut report, &articles).await;
    report.finish()
}

/// Returns the admin actor and a fresh staff author.
async fn authors(context: &FixtureContext) -> Result<[TestUser; 2], HarnessError> {
    let admin = context.auth().admin_actor().await?;
    let staff = context.auth().create_test_user(Role::Staff, None).await?;
    Ok([admin, staff])
}

async fn seed_articles(context: &FixtureContext, author: &TestUser) -> Result<Vec<Seeded>, HarnessError> {
    let factory = context.auth().factory();
    let mut articles = Vec::new();
    for status in ContentStatus::ALL {
        for visibility in Visibility::ALL {
            let body = factory.article(Some(&json!({ "status": status, "visibility": visibility })))?;
            let id = seed_resource_as(context, author, EndpointId::NewsCreate, &body).await?;
            articles.push(Seeded {
                id,
                author: author.id.clone(),
                author_role: author.role,
                status,
                visibility,
            });
        }
    }
    Ok(articles)
}

async fn view_all(
    context: &FixtureContext,
    report: &mut ScenarioReport,
    viewer: &TestUser,
    name: &str,
    articles: &[Seeded],
) {
    let role = viewer.role;
    let client = match context.auth().create_authenticated_client(ServiceName::News, viewer).await {
        Ok(client) => client,
        Err(err) => {
            report.fixture_failed(format!("authenticate {name} viewer"), &err);
            return;
        }
    };
    let list = EndpointId::NewsList.endpoint();
    let principal = Principal::Active {
        id: viewer.id.clone(),
        role,
    };
    let (outcome, observation) = check(&client, list, &[], None, &authorize(&principal, list, None)).await;
    let listed: Option<BTreeSet<String>> = observation
        .as_ref()
        .and_then(|observation| observation.data())
        .map(|data| list_items(data).into_iter().filter_map(resource_id).collect());
    match listed {
        Some(listed) if outcome.is_pass() => {
            let mut leaked = false;
            for article in articles {
                let is_author = article.author == viewer.id;
                if listed.contains(&article.id)
                    && !can_view(role, is_author, article.status, article.visibility)
                {
                    leaked = true;
                    report.record(
                        format!("{name} listing omits {}", article.label()),
                        StepOutcome::violation(list.service.as_str(), list.label(), "omitted", "listed"),
                    );
                }
            }
            if !leaked {
                report.pass(format!("{name} listing filtered"));
            }
        }
        _ => report.record(format!("{name} listing"), outcome),
    }

    let by_id = EndpointId::NewsById.endpoint();
    for article in articles {
        let is_author = article.author == viewer.id;
        let access = read_expectation(role, is_author, article.status, article.visibility);
        let params = [("articleId", article.id.as_str())];
        let (outcome, _) = check(&client, by_id, &params, None, &Expectation::exactly(access)).await;
        report.record(format!("{name} reads {}", article.label()), outcome);
    }
}

async fn anonymous(context: &FixtureContext, report: &mut ScenarioReport, articles: &[Seeded]) {
    let client = match context.auth().anonymous_client(ServiceName::News) {
        Ok(client) => client,
        Err(err) => {
            report.fixture_failed("anonymous client", &err);
            return;
        }
    };
    let list = EndpointId::NewsList.endpoint();
    let (outcome, _) = check(&client, list, &[], None, &authorize(&Principal::Anonymous, list, None)).await;
    report.record("anonymous listing", outcome);
    if let Some(article) = articles.iter().find(|article| article.status == ContentStatus::Published) {
        let by_id = EndpointId::NewsById.endpoint();
        let params = [("articleId", article.id.as_str())];
        let expected = authorize(&Principal::Anonymous, by_id, None);
        let (outcome, _) = check(&client, by_id, &params, None, &expected).await;
        report.record(format!("anonymous reads {}", article.label()), outcome);
    }
}
