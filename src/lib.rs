//! # Repo Reader
//!
//! Collects the issues and comments of one GitHub repository, exports them as
//! a flat CSV table, registers that table with a MindsDB-style SQL analytics
//! service, and serves a small dashboard over the results.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌────────────┐   ┌──────────┐   ┌─────────────┐
//! │ GitHub API  │──▶│ Normalize  │──▶│ CSV file │──▶│  Analytics  │
//! │ issues+cmts │   │ flat rows  │   │ (atomic) │   │  SQL table  │
//! └─────────────┘   └────────────┘   └──────────┘   └──────┬──────┘
//!        ▲                                                 │
//!        │ hourly / on demand                              ▼
//!  ┌─────┴──────┐                                   ┌────────────┐
//!  │ Refresher  │◀──────────── POST /api/refresh ───│ Dashboard  │
//!  └────────────┘                                   └────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment secrets |
//! | [`models`] | Issue, comment, export row and query table types |
//! | [`traits`] | `IssueSource` and `QueryBackend` seams |
//! | [`connector_github`] | Paginated GitHub REST client |
//! | [`normalize`] | Threads to flat export rows |
//! | [`export`] | Atomic CSV export |
//! | [`sql`] | Bound SQL statements |
//! | [`analytics`] | HTTP client for the SQL API |
//! | [`queries`] | The statements the dashboard runs |
//! | [`search`] | Similarity search over comments |
//! | [`pipeline`] | One refresh: fetch, export, define |
//! | [`refresher`] | Single-writer refresh queue |
//! | [`scheduler`] | Periodic refresh trigger |
//! | [`render`] | Dashboard HTML |
//! | [`server`] | Dashboard and JSON API |
//! | [`check`] | `check` command |

pub mod analytics;
pub mod check;
pub mod config;
pub mod connector_github;
pub mod export;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod queries;
pub mod refresher;
pub mod render;
pub mod scheduler;
pub mod search;
pub mod server;
pub mod sql;
pub mod traits;
