//! End-to-end refresh runs against mocked GitHub and analytics services.
//!
//! Configuration is written to a temp directory and loaded the same way the
//! binary loads it; secrets are resolved through an explicit lookup so the
//! tests never depend on the process environment.

use mockito::{Matcher, Server, ServerGuard};
use repo_reader::analytics::{run_or_empty, AnalyticsClient};
use repo_reader::config::{load_config, Config, Secrets};
use repo_reader::export::read_table;
use repo_reader::models::FlatRecord;
use repo_reader::pipeline::{Pipeline, RefreshStatus, RefreshTrigger};
use repo_reader::queries;
use serde_json::json;
use std::path::PathBuf;
use tempfile::TempDir;

struct Fixture {
    _dir: TempDir,
    config: Config,
    secrets: Secrets,
    export_path: PathBuf,
}

fn fixture(github_url: &str, analytics_url: &str) -> Fixture {
    let dir = TempDir::new().unwrap();
    let export_path = dir.path().join("out").join("github_data.csv");
    let config_path = dir.path().join("repo-reader.toml");
    std::fs::write(
        &config_path,
        format!(
            r#"
[source]
owner = "mindsdb"
repo = "mindsdb"
api_url = "{github}"

[analytics]
table = "github_issues_data"

[export]
path = "{export}"
"#,
            github = github_url,
            export = export_path.display()
        ),
    )
    .unwrap();

    let config = load_config(&config_path).unwrap();
    let analytics_url = format!("{}/api/sql/query", analytics_url);
    let secrets = Secrets::resolve(&config, |name| match name {
        "GITHUB_API_KEY" => Some("test-token".to_string()),
        "MINDSDB_SQL_API" => Some(analytics_url.clone()),
        _ => None,
    })
    .unwrap();

    Fixture {
        _dir: dir,
        config,
        secrets,
        export_path,
    }
}

fn issue(base: &str, id: u64, title: &str, comments: u64) -> serde_json::Value {
    json!({
        "id": id,
        "number": id,
        "title": title,
        "body": null,
        "comments": comments,
        "comments_url": format!("{}/repos/mindsdb/mindsdb/issues/{}/comments", base, id),
    })
}

async fn mock_issue_list(github: &mut ServerGuard, body: serde_json::Value) -> mockito::Mock {
    github
        .mock("GET", "/repos/mindsdb/mindsdb/issues")
        .match_query(Matcher::Any)
        .match_header("authorization", "token test-token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body.to_string())
        .create_async()
        .await
}

async fn mock_define_table(analytics: &mut ServerGuard, hits: usize) -> mockito::Mock {
    analytics
        .mock("POST", "/api/sql/query")
        .match_body(Matcher::Regex(
            "CREATE OR REPLACE TABLE github_issues_data FROM FILE".to_string(),
        ))
        .with_status(200)
        .with_body(r#"{"type":"ok"}"#)
        .expect(hits)
        .create_async()
        .await
}

#[tokio::test]
async fn test_refresh_exports_comment_rows_and_defines_table() {
    let mut github = Server::new_async().await;
    let mut analytics = Server::new_async().await;
    let base = github.url();

    mock_issue_list(
        &mut github,
        json!([issue(&base, 1, "A", 1), issue(&base, 2, "B", 0)]),
    )
    .await;
    github
        .mock("GET", "/repos/mindsdb/mindsdb/issues/1/comments")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(json!([{"user": {"login": "u1"}, "body": "hi"}]).to_string())
        .create_async()
        .await;
    let define = mock_define_table(&mut analytics, 1).await;

    let fx = fixture(&base, &analytics.url());
    let report = Pipeline::from_config(&fx.config, &fx.secrets)
        .unwrap()
        .run(RefreshTrigger::OnDemand)
        .await
        .unwrap();

    assert_eq!(report.status, RefreshStatus::Completed);
    assert_eq!(report.issues, 2);
    assert_eq!(report.records, 1);

    let rows = read_table(&fx.export_path).unwrap();
    assert_eq!(
        rows,
        vec![FlatRecord {
            issue_id: 1,
            issue_title: "A".to_string(),
            issue_body: String::new(),
            comment_user: "u1".to_string(),
            comment_text: "hi".to_string(),
        }]
    );
    let raw = std::fs::read_to_string(&fx.export_path).unwrap();
    assert!(raw.starts_with("issue_id,issue_title,issue_body,comment_user,comment_text\n"));

    define.assert_async().await;
}

#[tokio::test]
async fn test_issue_list_failure_keeps_previous_export_and_skips_bridge() {
    let mut github = Server::new_async().await;
    let mut analytics = Server::new_async().await;

    github
        .mock("GET", "/repos/mindsdb/mindsdb/issues")
        .match_query(Matcher::Any)
        .with_status(401)
        .with_body(r#"{"message":"Bad credentials"}"#)
        .create_async()
        .await;
    let define = mock_define_table(&mut analytics, 0).await;

    let fx = fixture(&github.url(), &analytics.url());
    std::fs::create_dir_all(fx.export_path.parent().unwrap()).unwrap();
    std::fs::write(&fx.export_path, "previous export\n").unwrap();

    let report = Pipeline::from_config(&fx.config, &fx.secrets)
        .unwrap()
        .run(RefreshTrigger::Scheduled)
        .await
        .unwrap();

    assert!(matches!(
        report.status,
        RefreshStatus::SourceUnavailable { .. }
    ));
    assert_eq!(report.records, 0);
    assert_eq!(
        std::fs::read_to_string(&fx.export_path).unwrap(),
        "previous export\n"
    );
    define.assert_async().await;
}

#[tokio::test]
async fn test_one_failing_comment_call_does_not_drop_other_issues() {
    let mut github = Server::new_async().await;
    let mut analytics = Server::new_async().await;
    let base = github.url();

    mock_issue_list(
        &mut github,
        json!([issue(&base, 1, "A", 1), issue(&base, 2, "B", 2)]),
    )
    .await;
    github
        .mock("GET", "/repos/mindsdb/mindsdb/issues/1/comments")
        .match_query(Matcher::Any)
        .with_status(502)
        .create_async()
        .await;
    github
        .mock("GET", "/repos/mindsdb/mindsdb/issues/2/comments")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(
            json!([
                {"user": {"login": "u2"}, "body": "one"},
                {"user": null, "body": "two"}
            ])
            .to_string(),
        )
        .create_async()
        .await;
    mock_define_table(&mut analytics, 1).await;

    let fx = fixture(&base, &analytics.url());
    let report = Pipeline::from_config(&fx.config, &fx.secrets)
        .unwrap()
        .run(RefreshTrigger::OnDemand)
        .await
        .unwrap();

    assert!(report.is_completed());
    assert_eq!(report.skipped_issues, vec![1]);
    let rows = read_table(&fx.export_path).unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.issue_id == 2));
    assert_eq!(rows[1].comment_user, "ghost");
}

#[tokio::test]
async fn test_rejected_definition_still_leaves_fresh_export() {
    let mut github = Server::new_async().await;
    let mut analytics = Server::new_async().await;
    let base = github.url();

    mock_issue_list(&mut github, json!([issue(&base, 7, "Crash", 0)])).await;
    analytics
        .mock("POST", "/api/sql/query")
        .with_status(200)
        .with_body(r#"{"type":"error","error_message":"syntax error"}"#)
        .create_async()
        .await;

    let fx = fixture(&base, &analytics.url());
    let report = Pipeline::from_config(&fx.config, &fx.secrets)
        .unwrap()
        .run(RefreshTrigger::OnDemand)
        .await
        .unwrap();

    match &report.status {
        RefreshStatus::TableNotDefined { reason } => assert!(reason.contains("syntax error")),
        other => panic!("expected TableNotDefined, got {:?}", other),
    }
    // Header-only export for a repository without comments.
    assert!(fx.export_path.exists());
    assert!(read_table(&fx.export_path).unwrap().is_empty());
}

#[tokio::test]
async fn test_error_message_response_degrades_to_empty_table() {
    let mut analytics = Server::new_async().await;
    analytics
        .mock("POST", "/api/sql/query")
        .match_body(Matcher::PartialJson(json!({
            "query": "SELECT issue_title, COUNT(*) AS total_comments FROM github_issues_data GROUP BY issue_title ORDER BY total_comments DESC;"
        })))
        .with_status(200)
        .with_body(r#"{"error_message":"syntax error"}"#)
        .create_async()
        .await;

    let client = AnalyticsClient::with_endpoint(
        &format!("{}/api/sql/query", analytics.url()),
        None,
        std::time::Duration::from_secs(5),
    )
    .unwrap();

    let table = run_or_empty(&client, &queries::most_commented("github_issues_data")).await;
    assert!(table.is_empty());
}
