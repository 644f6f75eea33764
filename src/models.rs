//! Core data models used throughout repo-reader.
//!
//! These types represent the issues, comments, flattened rows, and query
//! tables that flow through the refresh pipeline and the dashboard.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Column order of the exported table. Also the column list handed to the
/// analytics service when the table is (re)defined.
pub const EXPORT_COLUMNS: [&str; 5] = [
    "issue_id",
    "issue_title",
    "issue_body",
    "comment_user",
    "comment_text",
];

/// An issue as returned by the issue list call.
#[derive(Debug, Clone, PartialEq)]
pub struct Issue {
    pub id: u64,
    pub title: String,
    pub body: Option<String>,
    pub comments_url: String,
    /// Comment count reported in the list payload, when present.
    pub comment_count: Option<u64>,
    pub is_pull_request: bool,
}

/// A single comment on an issue.
#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub author: String,
    pub text: String,
}

/// One fetched issue together with its comments, in API order.
#[derive(Debug, Clone, PartialEq)]
pub struct IssueThread {
    pub issue: Issue,
    pub comments: Vec<Comment>,
}

/// One denormalized row: an issue's metadata paired with one comment.
///
/// Field order matches [`EXPORT_COLUMNS`]; the CSV exporter relies on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatRecord {
    pub issue_id: u64,
    pub issue_title: String,
    pub issue_body: String,
    pub comment_user: String,
    pub comment_text: String,
}

/// Tabular result of an analytics query.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryTable {
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
}

impl QueryTable {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when every named column is present in the table.
    pub fn has_columns(&self, names: &[&str]) -> bool {
        names.iter().all(|n| self.columns.iter().any(|c| c == n))
    }

    /// Builds a table from row objects. Columns are taken in first-seen order.
    pub fn from_rows(rows: Vec<Map<String, Value>>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for row in &rows {
            for key in row.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }
        Self { columns, rows }
    }

    /// Returns `(label, value)` pairs for charting. Rows whose value column is
    /// not numeric are skipped.
    pub fn series(&self, label_col: &str, value_col: &str) -> Vec<(String, f64)> {
        self.rows
            .iter()
            .filter_map(|row| {
                let value = match row.get(value_col)? {
                    Value::Number(n) => n.as_f64()?,
                    Value::String(s) => s.trim().parse::<f64>().ok()?,
                    _ => return None,
                };
                let label = match row.get(label_col) {
                    Some(Value::String(s)) => s.clone(),
                    Some(Value::Null) | None => String::new(),
                    Some(other) => other.to_string(),
                };
                Some((label, value))
            })
            .collect()
    }
}
