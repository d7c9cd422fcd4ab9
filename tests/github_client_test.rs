use httpmock::prelude::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracker_migrate::adapters::github::client::IMPORT_ACCEPT_HEADER;
use tracker_migrate::adapters::github::{ClientSettings, GithubClient, RateLimiter};
use tracker_migrate::domain::model::{ImportComment, ImportIssue, IssueImport};
use tokio_test::{assert_err, assert_ok};
use tracker_migrate::utils::error::MigrationError;

fn client(server: &MockServer) -> GithubClient<tracker_migrate::adapters::ReqwestTransport> {
    client_with_project(server, None)
}

fn client_with_project(
    server: &MockServer,
    project: Option<&str>,
) -> GithubClient<tracker_migrate::adapters::ReqwestTransport> {
    let mut settings = ClientSettings::new(server.base_url(), "acme/app");
    settings.import.poll_interval = Duration::from_millis(10);
    settings.import.poll_timeout = Duration::from_secs(5);
    settings.import.inline_comment_cap = 2;
    settings.import.batch_pause = Duration::from_millis(1);
    settings.retry.backoff_base = Duration::from_millis(10);
    settings.retry.backoff_cap = Duration::from_millis(50);
    settings.project = project.map(str::to_string);

    let limiter = Arc::new(RateLimiter::new(100, Duration::from_secs(60), Duration::ZERO));
    GithubClient::with_token("secret", limiter, settings).unwrap()
}

fn import(comment_count: usize) -> IssueImport {
    IssueImport {
        source_key: "PRJ-1".to_string(),
        issue: ImportIssue {
            title: "[PRJ-1] Crash on save".to_string(),
            body: "Steps".to_string(),
            created_at: "2021-01-22T10:11:47Z".to_string(),
            closed: false,
            labels: vec!["bug".to_string()],
            assignee: None,
        },
        comments: (0..comment_count)
            .map(|i| ImportComment {
                body: format!("comment-{}", i),
                created_at: "2021-02-01T08:00:00Z".to_string(),
            })
            .collect(),
    }
}

#[tokio::test]
async fn test_accepted_import_is_polled_until_imported() {
    let server = MockServer::start_async().await;
    let status_url = server.url("/repos/acme/app/import/issues/77");

    let submit = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/repos/acme/app/import/issues")
                .header("accept", IMPORT_ACCEPT_HEADER)
                .header("authorization", "token secret")
                .body_contains("[PRJ-1] Crash on save");
            then.status(202)
                .json_body(json!({"id": 77, "status": "pending", "url": status_url}));
        })
        .await;
    let status = server
        .mock_async(|when, then| {
            when.method(GET).path("/repos/acme/app/import/issues/77");
            then.status(200).json_body(json!({
                "status": "imported",
                "issue_url": "https://api.github.com/repos/acme/app/issues/12"
            }));
        })
        .await;

    let number = assert_ok!(client(&server).submit_import(&import(1)).await);

    assert_eq!(number, 12);
    submit.assert_async().await;
    status.assert_async().await;
}

#[tokio::test]
async fn test_synchronous_create_skips_polling() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/repos/acme/app/import/issues");
            then.status(201).json_body(json!({"number": 5}));
        })
        .await;

    assert_eq!(client(&server).submit_import(&import(0)).await.unwrap(), 5);
}

#[tokio::test]
async fn test_overflow_comments_are_posted_after_import() {
    let server = MockServer::start_async().await;
    let submit = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/repos/acme/app/import/issues")
                .body_contains("comment-1");
            then.status(201).json_body(json!({"number": 9}));
        })
        .await;
    let overflow = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/repos/acme/app/issues/9/comments")
                .body_contains("comment-2");
            then.status(201).json_body(json!({"id": 1}));
        })
        .await;

    assert_eq!(client(&server).submit_import(&import(3)).await.unwrap(), 9);
    submit.assert_async().await;
    overflow.assert_async().await;
}

#[tokio::test]
async fn test_failed_job_reports_diagnostics() {
    let server = MockServer::start_async().await;
    let status_url = server.url("/repos/acme/app/import/issues/3");
    server
        .mock_async(|when, then| {
            when.method(POST).path("/repos/acme/app/import/issues");
            then.status(202)
                .json_body(json!({"id": 3, "status": "pending", "url": status_url}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/repos/acme/app/import/issues/3");
            then.status(200).json_body(json!({
                "status": "failed",
                "errors": [{"field": "assignee", "code": "invalid"}]
            }));
        })
        .await;

    let err = assert_err!(client(&server).submit_import(&import(0)).await);
    match err {
        MigrationError::TerminalImportFailure { job_id, diagnostics } => {
            assert_eq!(job_id, 3);
            assert!(diagnostics.contains("assignee"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_validation_error_is_not_retried() {
    let server = MockServer::start_async().await;
    let submit = server
        .mock_async(|when, then| {
            when.method(POST).path("/repos/acme/app/import/issues");
            then.status(422).json_body(json!({"message": "Validation Failed"}));
        })
        .await;

    let err = assert_err!(client(&server).submit_import(&import(0)).await);
    assert!(matches!(err, MigrationError::UnexpectedStatus { status: 422, .. }));
    submit.assert_hits_async(1).await;
}

#[tokio::test]
async fn test_server_errors_are_retried_until_attempts_run_out() {
    let server = MockServer::start_async().await;
    let submit = server
        .mock_async(|when, then| {
            when.method(POST).path("/repos/acme/app/import/issues");
            then.status(502).body("bad gateway");
        })
        .await;

    let err = assert_err!(client(&server).submit_import(&import(0)).await);
    assert!(matches!(err, MigrationError::UnexpectedStatus { status: 502, .. }));
    submit.assert_hits_async(3).await;
}

#[tokio::test]
async fn test_overflow_failure_keeps_created_issue_number() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/repos/acme/app/import/issues");
            then.status(201).json_body(json!({"number": 9}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/repos/acme/app/issues/9/comments");
            then.status(422).json_body(json!({"message": "Validation Failed"}));
        })
        .await;

    let err = assert_err!(client(&server).submit_import(&import(3)).await);
    assert_eq!(err.created_issue(), Some(9));
    assert!(err.to_string().contains("0 of 1"));
}

#[tokio::test]
async fn test_imported_issue_is_added_to_project_board() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/repos/acme/app/import/issues");
            then.status(201).json_body(json!({"number": 5}));
        })
        .await;
    let projects = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/graphql")
                .header("authorization", "token secret")
                .body_contains("projectsV2");
            then.status(200).json_body(json!({"data": {"repository": {"projectsV2": {"nodes": [
                {"id": "PVT_board", "number": 2, "title": "Migration"}
            ]}}}}));
        })
        .await;
    let issue_node = server
        .mock_async(|when, then| {
            when.method(POST).path("/graphql").body_contains("issue(number");
            then.status(200)
                .json_body(json!({"data": {"repository": {"issue": {"id": "I_kw5"}}}}));
        })
        .await;
    let add_item = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/graphql")
                .body_contains("addProjectV2ItemById")
                .body_contains("PVT_board")
                .body_contains("I_kw5");
            then.status(200)
                .json_body(json!({"data": {"addProjectV2ItemById": {"item": {"id": "PVTI_1"}}}}));
        })
        .await;

    let client = client_with_project(&server, Some("Migration"));
    assert_eq!(assert_ok!(client.submit_import(&import(0)).await), 5);

    projects.assert_hits_async(1).await;
    issue_node.assert_async().await;
    add_item.assert_async().await;
}
