//! GitHub issues connector.
//!
//! Lists issues of one repository through the REST API, then fetches the
//! comments of each issue. Both calls follow `Link: <…>; rel="next"`
//! pagination up to `source.max_pages` pages.
//!
//! # Configuration
//!
//! ```toml
//! [source]
//! owner = "mindsdb"
//! repo = "mindsdb"
//! token_env = "GITHUB_API_KEY"
//! state = "open"
//! per_page = 100
//! max_pages = 10
//! ```
//!
//! # Failure handling
//!
//! | Failure | Result |
//! |---------|--------|
//! | Issue list: non-2xx, transport error, bad JSON | [`FetchOutcome::Unavailable`] |
//! | Comments of one issue: any failure | issue listed in `skipped_issues`, others kept |
//!
//! There are no retries. Every request is bounded by `source.timeout_secs`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, LINK};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::SourceConfig;
use crate::models::{Comment, Issue, IssueThread};
use crate::traits::{FetchOutcome, IssueSource};

/// An issue source backed by the GitHub REST API.
pub struct GitHubConnector {
    config: SourceConfig,
    client: reqwest::Client,
}

impl GitHubConnector {
    /// Build a connector for the configured repository.
    ///
    /// The token is sent as `Authorization: token <key>` on every request.
    pub fn new(config: SourceConfig, token: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("token {}", token))
            .context("GitHub token is not a valid header value")?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );

        let client = reqwest::Client::builder()
            .user_agent(concat!("repo-reader/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build GitHub HTTP client")?;

        Ok(Self { config, client })
    }

    /// URL of the issue list endpoint.
    pub fn issues_url(&self) -> String {
        format!(
            "{}/repos/{}/{}/issues",
            self.config.api_url.trim_end_matches('/'),
            self.config.owner,
            self.config.repo
        )
    }

    async fn list_issues(&self) -> Result<Vec<Issue>, String> {
        let query = [
            ("state", self.config.state.clone()),
            ("per_page", self.config.per_page.to_string()),
        ];
        let raw: Vec<GhIssue> = self.get_paginated(&self.issues_url(), &query).await?;
        Ok(raw.into_iter().map(Issue::from).collect())
    }

    async fn list_comments(&self, comments_url: &str) -> Result<Vec<Comment>, String> {
        let query = [("per_page", self.config.per_page.to_string())];
        let raw: Vec<GhComment> = self.get_paginated(comments_url, &query).await?;
        Ok(raw.into_iter().map(Comment::from).collect())
    }

    /// GET `url` and every following `rel="next"` page, concatenating the
    /// JSON arrays. `query` applies to the first request only; next links
    /// already carry their own query string.
    async fn get_paginated<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, String> {
        let mut items = Vec::new();
        let mut next = Some(url.to_string());
        let mut page = 0u32;

        while let Some(current) = next.take() {
            if page >= self.config.max_pages {
                warn!(
                    url = %url,
                    max_pages = self.config.max_pages,
                    "page limit reached, remaining pages ignored"
                );
                break;
            }

            let request = if page == 0 {
                self.client.get(&current).query(query)
            } else {
                self.client.get(&current)
            };
            debug!(url = %current, page, "GET");

            let response = request
                .send()
                .await
                .map_err(|e| format!("request to {} failed: {}", current, e))?;

            let status = response.status();
            if !status.is_success() {
                return Err(format!("HTTP {} from {}", status, current));
            }

            next = next_link(response.headers());
            let mut batch: Vec<T> = response
                .json()
                .await
                .map_err(|e| format!("invalid JSON from {}: {}", current, e))?;
            items.append(&mut batch);
            page += 1;
        }

        Ok(items)
    }
}

#[async_trait]
impl IssueSource for GitHubConnector {
    fn label(&self) -> String {
        format!("github:{}/{}", self.config.owner, self.config.repo)
    }

    async fn fetch(&self) -> FetchOutcome {
        let label = self.label();
        info!(source = %label, "fetching issues");

        let issues = match self.list_issues().await {
            Ok(issues) => issues,
            Err(reason) => {
                warn!(source = %label, %reason, "issue list unavailable");
                return FetchOutcome::Unavailable { reason };
            }
        };

        let mut threads = Vec::with_capacity(issues.len());
        let mut skipped_issues = Vec::new();

        for issue in issues {
            if issue.is_pull_request && !self.config.include_pull_requests {
                continue;
            }
            if issue.comment_count == Some(0) {
                threads.push(IssueThread {
                    issue,
                    comments: Vec::new(),
                });
                continue;
            }

            match self.list_comments(&issue.comments_url).await {
                Ok(comments) => threads.push(IssueThread { issue, comments }),
                Err(reason) => {
                    warn!(issue_id = issue.id, %reason, "skipping comments for issue");
                    skipped_issues.push(issue.id);
                }
            }
        }

        info!(
            source = %label,
            issues = threads.len(),
            skipped = skipped_issues.len(),
            "fetch complete"
        );

        FetchOutcome::Fetched {
            threads,
            skipped_issues,
        }
    }
}

/// Extract the `rel="next"` target from a `Link` header.
fn next_link(headers: &HeaderMap) -> Option<String> {
    let link = headers.get(LINK)?.to_str().ok()?;
    link.split(',').find_map(|part| {
        let mut segments = part.split(';');
        let target = segments.next()?.trim();
        let is_next = segments.any(|s| s.trim() == "rel=\"next\"");
        if is_next && target.starts_with('<') && target.ends_with('>') {
            Some(target[1..target.len() - 1].to_string())
        } else {
            None
        }
    })
}

// ============ Wire types ============

#[derive(Deserialize)]
struct GhIssue {
    id: u64,
    title: String,
    #[serde(default)]
    body: Option<String>,
    comments_url: String,
    #[serde(default)]
    comments: Option<u64>,
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
}

impl From<GhIssue> for Issue {
    fn from(raw: GhIssue) -> Self {
        Issue {
            id: raw.id,
            title: raw.title,
            body: raw.body,
            comments_url: raw.comments_url,
            comment_count: raw.comments,
            is_pull_request: raw.pull_request.is_some(),
        }
    }
}

#[derive(Deserialize)]
struct GhUser {
    login: String,
}

#[derive(Deserialize)]
struct GhComment {
    #[serde(default)]
    user: Option<GhUser>,
    #[serde(default)]
    body: Option<String>,
}

impl From<GhComment> for Comment {
    fn from(raw: GhComment) -> Self {
        Comment {
            // Deleted accounts come back as `"user": null`.
            author: raw
                .user
                .map(|u| u.login)
                .unwrap_or_else(|| "ghost".to_string()),
            text: raw.body.unwrap_or_default(),
        }
    }
}
