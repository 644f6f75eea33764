//! Extension seams for the refresh pipeline.
//!
//! The pipeline talks to its two upstreams through traits so that the
//! built-in GitHub connector and analytics client can be swapped for
//! in-memory implementations in tests or for other hosts in custom binaries.
//!
//! ```text
//! ┌──────────────┐   ┌─────────────┐   ┌──────────┐   ┌──────────────┐
//! │ IssueSource  │──▶│  normalize  │──▶│  export  │──▶│ QueryBackend │
//! │ (GitHub)     │   │ FlatRecords │   │  CSV     │   │ (analytics)  │
//! └──────────────┘   └─────────────┘   └──────────┘   └──────────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use repo_reader::traits::{FetchOutcome, IssueSource};
//!
//! struct NothingOpen;
//!
//! #[async_trait]
//! impl IssueSource for NothingOpen {
//!     fn label(&self) -> String { "static:nothing".to_string() }
//!     async fn fetch(&self) -> FetchOutcome {
//!         FetchOutcome::Fetched { threads: vec![], skipped_issues: vec![] }
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::analytics::QueryResult;
use crate::models::IssueThread;
use crate::sql::Statement;

/// Result of one fetch from an issue source.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// The issue list was retrieved. Issues whose comments could not be
    /// fetched are listed in `skipped_issues` and absent from `threads`.
    Fetched {
        threads: Vec<IssueThread>,
        skipped_issues: Vec<u64>,
    },
    /// The issue list could not be retrieved; nothing was fetched.
    Unavailable { reason: String },
}

impl FetchOutcome {
    /// The fetched threads; empty when the source was unavailable.
    pub fn threads(&self) -> &[IssueThread] {
        match self {
            FetchOutcome::Fetched { threads, .. } => threads,
            FetchOutcome::Unavailable { .. } => &[],
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, FetchOutcome::Unavailable { .. })
    }
}

/// A source of issues and their comments.
#[async_trait]
pub trait IssueSource: Send + Sync {
    /// Label used in logs and reports (e.g. `"github:mindsdb/mindsdb"`).
    fn label(&self) -> String;

    /// Fetch all issues with their comments. Upstream failures are reported
    /// through [`FetchOutcome`], never as a panic or error.
    async fn fetch(&self) -> FetchOutcome;
}

/// An external SQL service that stores the exported table and answers
/// read queries against it.
#[async_trait]
pub trait QueryBackend: Send + Sync {
    /// Submit one statement and return its result table.
    async fn run(&self, statement: &Statement) -> QueryResult;
}
