//! Free-text similarity search over exported comments.
//!
//! The analytics service owns the embedding model. A search is two round
//! trips: embed the query text, then rank comments by similarity to that
//! embedding. The user's text is always bound, never spliced into SQL.

use serde_json::Value;
use tracing::debug;

use crate::analytics::{QueryError, QueryResult};
use crate::config::AnalyticsConfig;
use crate::models::QueryTable;
use crate::queries;
use crate::traits::QueryBackend;

/// Column names of a search result row.
pub const RESULT_COLUMNS: [&str; 3] = ["issue_title", "comment_text", "similarity"];

/// Search comments similar to `text`.
///
/// Blank input returns an empty table without contacting the service.
pub async fn semantic_search(
    backend: &dyn QueryBackend,
    config: &AnalyticsConfig,
    text: &str,
) -> QueryResult {
    let text = text.trim();
    if text.is_empty() {
        return Ok(QueryTable::empty());
    }

    let embedded = backend
        .run(&queries::embed_text(&config.model, text))
        .await?;
    let embedding = first_embedding(&embedded).ok_or_else(|| {
        QueryError::Malformed("embedding query returned no `embedding` value".to_string())
    })?;
    debug!(chars = embedding.len(), "query embedded");

    backend
        .run(&queries::similar_comments(
            &config.table,
            &config.model,
            &embedding,
            config.similarity_threshold,
            config.search_limit,
        ))
        .await
}

fn first_embedding(table: &QueryTable) -> Option<String> {
    match table.rows.first()?.get("embedding")? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
