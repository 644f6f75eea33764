//! Refresh pipeline orchestration.
//!
//! Coordinates one refresh: source → normalization → CSV export → table
//! definition on the analytics service. A run never exports stale or empty
//! data when the source was unavailable; the previous export is left in place.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::analytics::AnalyticsClient;
use crate::config::{Config, Secrets};
use crate::connector_github::GitHubConnector;
use crate::export;
use crate::normalize::flatten_threads;
use crate::queries;
use crate::traits::{FetchOutcome, IssueSource, QueryBackend};

/// What started a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshTrigger {
    Startup,
    Scheduled,
    OnDemand,
}

/// How far a refresh got.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RefreshStatus {
    /// Exported and the analytics table was (re)defined.
    Completed,
    /// The issue list could not be fetched; nothing was exported.
    SourceUnavailable { reason: String },
    /// Exported, but the analytics service did not accept the table definition.
    TableNotDefined { reason: String },
}

/// Summary of one refresh run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefreshReport {
    pub trigger: RefreshTrigger,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub issues: usize,
    pub records: usize,
    pub skipped_issues: Vec<u64>,
    pub export_path: PathBuf,
    pub status: RefreshStatus,
}

impl RefreshReport {
    pub fn is_completed(&self) -> bool {
        self.status == RefreshStatus::Completed
    }
}

/// The fetch → normalize → export → define chain.
pub struct Pipeline {
    source: Arc<dyn IssueSource>,
    backend: Arc<dyn QueryBackend>,
    export_path: PathBuf,
    table: String,
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn IssueSource>,
        backend: Arc<dyn QueryBackend>,
        export_path: PathBuf,
        table: String,
    ) -> Self {
        Self {
            source,
            backend,
            export_path,
            table,
        }
    }

    /// Wire the GitHub connector and analytics client from configuration.
    pub fn from_config(config: &Config, secrets: &Secrets) -> Result<Self> {
        let source = GitHubConnector::new(config.source.clone(), &secrets.github_token)?;
        let backend = AnalyticsClient::new(&config.analytics, secrets)?;
        Ok(Self::new(
            Arc::new(source),
            Arc::new(backend),
            config.export.path.clone(),
            config.analytics.table.clone(),
        ))
    }

    /// The analytics backend, shared with read-side callers.
    pub fn backend(&self) -> Arc<dyn QueryBackend> {
        self.backend.clone()
    }

    pub fn export_path(&self) -> &std::path::Path {
        &self.export_path
    }

    /// Run one refresh.
    ///
    /// Upstream failures are reported in [`RefreshReport::status`]. Only a
    /// local export failure is returned as an error.
    pub async fn run(&self, trigger: RefreshTrigger) -> Result<RefreshReport> {
        let started_at = Utc::now();
        let label = self.source.label();

        let (threads, skipped_issues) = match self.source.fetch().await {
            FetchOutcome::Fetched {
                threads,
                skipped_issues,
            } => (threads, skipped_issues),
            FetchOutcome::Unavailable { reason } => {
                warn!(source = %label, %reason, "refresh skipped: source unavailable");
                return Ok(RefreshReport {
                    trigger,
                    started_at,
                    finished_at: Utc::now(),
                    issues: 0,
                    records: 0,
                    skipped_issues: Vec::new(),
                    export_path: self.export_path.clone(),
                    status: RefreshStatus::SourceUnavailable { reason },
                });
            }
        };

        let records = flatten_threads(&threads);
        let summary = export::write_table(&self.export_path, &records)?;

        let status = match self
            .backend
            .run(&queries::define_table(&self.table, &self.export_path))
            .await
        {
            Ok(_) => RefreshStatus::Completed,
            Err(e) => {
                warn!(table = %self.table, kind = e.kind(), error = %e, "table definition failed");
                RefreshStatus::TableNotDefined {
                    reason: e.to_string(),
                }
            }
        };

        let report = RefreshReport {
            trigger,
            started_at,
            finished_at: Utc::now(),
            issues: threads.len(),
            records: summary.rows,
            skipped_issues,
            export_path: summary.path,
            status,
        };

        info!(
            source = %label,
            trigger = ?report.trigger,
            issues = report.issues,
            records = report.records,
            skipped = report.skipped_issues.len(),
            completed = report.is_completed(),
            "refresh finished"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::{QueryError, QueryResult};
    use crate::export::read_table;
    use crate::models::{Comment, Issue, IssueThread, QueryTable};
    use crate::sql::Statement;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct FixedSource(FetchOutcome);

    #[async_trait]
    impl IssueSource for FixedSource {
        fn label(&self) -> String {
            "fixed".to_string()
        }
        async fn fetch(&self) -> FetchOutcome {
            self.0.clone()
        }
    }

    #[derive(Default)]
    struct RecordingBackend {
        fail_with: Option<QueryError>,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl QueryBackend for RecordingBackend {
        async fn run(&self, statement: &Statement) -> QueryResult {
            self.seen.lock().unwrap().push(statement.render()?);
            match &self.fail_with {
                Some(e) => Err(e.clone()),
                None => Ok(QueryTable::empty()),
            }
        }
    }

    fn thread(id: u64, title: &str, comments: &[(&str, &str)]) -> IssueThread {
        IssueThread {
            issue: Issue {
                id,
                title: title.to_string(),
                body: None,
                comments_url: String::new(),
                comment_count: None,
                is_pull_request: false,
            },
            comments: comments
                .iter()
                .map(|(a, t)| Comment {
                    author: a.to_string(),
                    text: t.to_string(),
                })
                .collect(),
        }
    }

    fn pipeline(
        outcome: FetchOutcome,
        backend: Arc<RecordingBackend>,
        dir: &TempDir,
    ) -> Pipeline {
        Pipeline::new(
            Arc::new(FixedSource(outcome)),
            backend,
            dir.path().join("github_data.csv"),
            "github_issues_data".to_string(),
        )
    }

    #[tokio::test]
    async fn test_successful_refresh_exports_and_defines_table() {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(RecordingBackend::default());
        let outcome = FetchOutcome::Fetched {
            threads: vec![thread(1, "A", &[("u1", "hi")]), thread(2, "B", &[])],
            skipped_issues: vec![],
        };

        let report = pipeline(outcome, backend.clone(), &dir)
            .run(RefreshTrigger::OnDemand)
            .await
            .unwrap();

        assert!(report.is_completed());
        assert_eq!(report.issues, 2);
        assert_eq!(report.records, 1);
        let rows = read_table(&report.export_path).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].comment_user, "u1");

        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].starts_with("CREATE OR REPLACE TABLE github_issues_data FROM FILE"));
    }

    #[tokio::test]
    async fn test_unavailable_source_touches_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("github_data.csv");
        std::fs::write(&path, "previous export").unwrap();
        let backend = Arc::new(RecordingBackend::default());

        let report = pipeline(
            FetchOutcome::Unavailable {
                reason: "HTTP 401".to_string(),
            },
            backend.clone(),
            &dir,
        )
        .run(RefreshTrigger::Scheduled)
        .await
        .unwrap();

        assert_eq!(
            report.status,
            RefreshStatus::SourceUnavailable {
                reason: "HTTP 401".to_string()
            }
        );
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "previous export");
        assert!(backend.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_table_definition_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(RecordingBackend {
            fail_with: Some(QueryError::Rejected("no such handler".to_string())),
            ..Default::default()
        });
        let outcome = FetchOutcome::Fetched {
            threads: vec![thread(1, "A", &[("u1", "hi"), ("u2", "yo")])],
            skipped_issues: vec![5],
        };

        let report = pipeline(outcome, backend, &dir)
            .run(RefreshTrigger::OnDemand)
            .await
            .unwrap();

        assert!(matches!(report.status, RefreshStatus::TableNotDefined { .. }));
        assert_eq!(report.records, 2);
        assert_eq!(report.skipped_issues, vec![5]);
        assert_eq!(read_table(&report.export_path).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_export_failure_is_an_error() {
        let dir = TempDir::new().unwrap();
        let blocked = dir.path().join("blocked");
        std::fs::create_dir(&blocked).unwrap();
        std::fs::write(blocked.join("keep"), "x").unwrap();
        let backend = Arc::new(RecordingBackend::default());

        let pipeline = Pipeline::new(
            Arc::new(FixedSource(FetchOutcome::Fetched {
                threads: vec![thread(1, "A", &[("u1", "hi")])],
                skipped_issues: vec![],
            })),
            backend.clone(),
            blocked,
            "t".to_string(),
        );

        assert!(pipeline.run(RefreshTrigger::OnDemand).await.is_err());
        assert!(backend.seen.lock().unwrap().is_empty());
    }
}
