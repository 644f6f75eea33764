//! Client for the external analytics SQL service.
//!
//! Statements are rendered (see [`crate::sql`]) and POSTed as
//! `{"query": "<sql>"}`. The service answers with either a `data` array or an
//! `error_message`. Every failure is reported as a [`QueryError`] variant so
//! callers can tell an unreachable service from a rejected query or an
//! unexpected payload; [`run_or_empty`] collapses all of them to an empty
//! table for callers that only want to degrade.
//!
//! # Response shapes
//!
//! | Body | Result |
//! |------|--------|
//! | `{"data": [{"col": 1}, …]}` | rows as given |
//! | `{"column_names": ["col"], "data": [[1], …]}` | rows zipped with column names |
//! | `{"type": "ok"}` | empty table (DDL acknowledged) |
//! | `{"error_message": "…"}` | [`QueryError::Rejected`] |
//! | anything else | [`QueryError::Malformed`] |

use anyhow::Context;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{AnalyticsConfig, Secrets};
use crate::models::QueryTable;
use crate::sql::{BindError, Statement};
use crate::traits::QueryBackend;

/// Why an analytics query produced no table.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum QueryError {
    /// Transport failure or non-success status. Worth retrying later.
    #[error("analytics service unavailable: {0}")]
    Unavailable(String),
    /// The service answered with an `error_message`.
    #[error("analytics service rejected the query: {0}")]
    Rejected(String),
    /// The response did not have the expected shape.
    #[error("malformed analytics response: {0}")]
    Malformed(String),
    #[error(transparent)]
    Bind(#[from] BindError),
}

impl QueryError {
    /// Short machine-readable failure class.
    pub fn kind(&self) -> &'static str {
        match self {
            QueryError::Unavailable(_) => "unavailable",
            QueryError::Rejected(_) => "rejected",
            QueryError::Malformed(_) => "malformed",
            QueryError::Bind(_) => "bind",
        }
    }
}

pub type QueryResult = Result<QueryTable, QueryError>;

/// HTTP client for the analytics SQL endpoint.
pub struct AnalyticsClient {
    url: String,
    key: Option<String>,
    client: reqwest::Client,
}

impl AnalyticsClient {
    pub fn new(config: &AnalyticsConfig, secrets: &Secrets) -> anyhow::Result<Self> {
        Self::with_endpoint(
            &secrets.analytics_url,
            secrets.analytics_key.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn with_endpoint(
        url: &str,
        key: Option<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("repo-reader/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("Failed to build analytics HTTP client")?;
        Ok(Self {
            url: url.to_string(),
            key,
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl QueryBackend for AnalyticsClient {
    async fn run(&self, statement: &Statement) -> QueryResult {
        let sql = statement.render()?;
        debug!(sql = %sql, "submitting analytics query");

        let mut request = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "query": sql }));
        if let Some(key) = &self.key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| QueryError::Unavailable(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| QueryError::Unavailable(e.to_string()))?;
        let body: Option<Value> = serde_json::from_str(&text).ok();

        if !status.is_success() {
            if let Some(message) = body.as_ref().and_then(error_message) {
                return Err(QueryError::Rejected(message));
            }
            return Err(QueryError::Unavailable(format!(
                "HTTP {}: {}",
                status,
                truncate(&text, 200)
            )));
        }

        match body {
            Some(value) => parse_response(&value),
            None => Err(QueryError::Malformed(format!(
                "response is not JSON: {}",
                truncate(&text, 200)
            ))),
        }
    }
}

/// Run a statement, logging any failure and returning an empty table instead.
pub async fn run_or_empty(backend: &dyn QueryBackend, statement: &Statement) -> QueryTable {
    match backend.run(statement).await {
        Ok(table) => table,
        Err(e) => {
            warn!(kind = e.kind(), error = %e, "analytics query failed");
            QueryTable::empty()
        }
    }
}

/// Interpret a decoded response body.
pub fn parse_response(body: &Value) -> QueryResult {
    let obj = body
        .as_object()
        .ok_or_else(|| QueryError::Malformed("response is not a JSON object".to_string()))?;

    let data = match obj.get("data") {
        Some(data) => data,
        None => {
            if let Some(message) = error_message(body) {
                return Err(QueryError::Rejected(message));
            }
            if obj.get("type").and_then(Value::as_str) == Some("ok") {
                return Ok(QueryTable::empty());
            }
            return Err(QueryError::Malformed("missing `data` field".to_string()));
        }
    };

    let rows = data
        .as_array()
        .ok_or_else(|| QueryError::Malformed("`data` is not an array".to_string()))?;

    let column_names: Option<Vec<String>> = match obj.get("column_names") {
        Some(Value::Array(names)) => Some(
            names
                .iter()
                .map(|n| match n {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect(),
        ),
        _ => None,
    };

    let mut out: Vec<Map<String, Value>> = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        match row {
            Value::Object(map) => out.push(map.clone()),
            Value::Array(values) => {
                let names = column_names.as_ref().ok_or_else(|| {
                    QueryError::Malformed("array rows without `column_names`".to_string())
                })?;
                if names.len() != values.len() {
                    return Err(QueryError::Malformed(format!(
                        "row {} has {} values for {} columns",
                        i,
                        values.len(),
                        names.len()
                    )));
                }
                out.push(names.iter().cloned().zip(values.iter().cloned()).collect());
            }
            _ => {
                return Err(QueryError::Malformed(format!(
                    "row {} is neither an object nor an array",
                    i
                )))
            }
        }
    }

    let mut table = QueryTable::from_rows(out);
    if let Some(names) = column_names {
        table.columns = names;
    }
    Ok(table)
}

fn error_message(body: &Value) -> Option<String> {
    body.get("error_message")
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn client(url: &str, key: Option<&str>) -> AnalyticsClient {
        AnalyticsClient::with_endpoint(
            &format!("{}/api/sql/query", url),
            key.map(String::from),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_parse_object_rows() {
        let table = parse_response(&json!({
            "data": [
                {"issue_title": "A", "total_comments": 3},
                {"issue_title": "B", "total_comments": 1}
            ]
        }))
        .unwrap();
        assert_eq!(table.len(), 2);
        assert!(table.has_columns(&["issue_title", "total_comments"]));
    }

    #[test]
    fn test_parse_array_rows_with_column_names() {
        let table = parse_response(&json!({
            "type": "table",
            "column_names": ["comment_user", "user_score"],
            "data": [["alice", 4], ["bob", 2]]
        }))
        .unwrap();
        assert_eq!(table.columns, vec!["comment_user", "user_score"]);
        assert_eq!(table.rows[1]["comment_user"], json!("bob"));
    }

    #[test]
    fn test_parse_error_message_is_rejected() {
        let err = parse_response(&json!({"error_message": "syntax error"})).unwrap_err();
        assert_eq!(err, QueryError::Rejected("syntax error".to_string()));
    }

    #[test]
    fn test_parse_ok_ack_is_empty_table() {
        assert_eq!(
            parse_response(&json!({"type": "ok"})).unwrap(),
            QueryTable::empty()
        );
    }

    #[test]
    fn test_parse_malformed_shapes() {
        for body in [
            json!([]),
            json!({"type": "table"}),
            json!({"data": "nope"}),
            json!({"data": [["a"]]}),
            json!({"column_names": ["a", "b"], "data": [["x"]]}),
            json!({"data": [1, 2]}),
        ] {
            let err = parse_response(&body).unwrap_err();
            assert_eq!(err.kind(), "malformed", "body: {}", body);
        }
    }

    #[tokio::test]
    async fn test_error_message_response_yields_empty_table() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/api/sql/query")
            .with_status(200)
            .with_body(r#"{"error_message":"syntax error"}"#)
            .create_async()
            .await;
        let client = client(&server.url(), None);
        let stmt = Statement::new("SELEC nonsense");

        assert_eq!(
            client.run(&stmt).await.unwrap_err(),
            QueryError::Rejected("syntax error".to_string())
        );
        assert!(run_or_empty(&client, &stmt).await.is_empty());
    }

    #[tokio::test]
    async fn test_posts_rendered_query_with_bearer_key() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/sql/query")
            .match_header("authorization", "Bearer k3y")
            .match_body(Matcher::Json(json!({"query": "SELECT 'it''s' AS q"})))
            .with_status(200)
            .with_body(r#"{"data":[{"q":"it's"}]}"#)
            .create_async()
            .await;
        let client = client(&server.url(), Some("k3y"));

        let table = client
            .run(&Statement::new("SELECT ? AS q").bind("it's"))
            .await
            .unwrap();

        assert_eq!(table.rows[0]["q"], json!("it's"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_error_is_unavailable() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/api/sql/query")
            .with_status(503)
            .with_body("upstream down")
            .create_async()
            .await;
        let client = client(&server.url(), None);

        let err = client.run(&Statement::new("SELECT 1")).await.unwrap_err();
        assert_eq!(err.kind(), "unavailable");
    }

    #[tokio::test]
    async fn test_non_json_success_is_malformed() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/api/sql/query")
            .with_status(200)
            .with_body("<html>proxy login</html>")
            .create_async()
            .await;
        let client = client(&server.url(), None);

        let err = client.run(&Statement::new("SELECT 1")).await.unwrap_err();
        assert_eq!(err.kind(), "malformed");
    }

    #[tokio::test]
    async fn test_unreachable_service_is_unavailable() {
        let client = client("http://127.0.0.1:9", None);
        let err = client.run(&Statement::new("SELECT 1")).await.unwrap_err();
        assert_eq!(err.kind(), "unavailable");
    }

    #[tokio::test]
    async fn test_bind_error_never_reaches_the_wire() {
        let client = client("http://127.0.0.1:9", None);
        let err = client.run(&Statement::new("SELECT ?")).await.unwrap_err();
        assert_eq!(err.kind(), "bind");
    }

    #[tokio::test]
    async fn test_stalled_service_is_unavailable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept connections and never answer.
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let client = AnalyticsClient::with_endpoint(
            &format!("http://{}/api/sql/query", addr),
            None,
            Duration::from_secs(1),
        )
        .unwrap();

        let result = tokio::time::timeout(
            Duration::from_secs(10),
            client.run(&Statement::new("SELECT 1;")),
        )
        .await
        .expect("query should be bounded by the client timeout");
        assert!(
            matches!(result, Err(QueryError::Unavailable(_))),
            "got {:?}",
            result
        );
    }
}
