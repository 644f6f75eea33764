//! The statements the dashboard sends to the analytics service.
//!
//! Table and model names come from validated configuration and are spliced
//! in as identifiers; every other value is bound.

use std::path::Path;

use crate::models::EXPORT_COLUMNS;
use crate::sql::Statement;

/// (Re)define `table` over the exported CSV file, replacing any previous
/// definition with the same name.
pub fn define_table(table: &str, export_path: &Path) -> Statement {
    let columns = EXPORT_COLUMNS
        .iter()
        .map(|c| format!("'{}'", c))
        .collect::<Vec<_>>()
        .join(", ");
    Statement::new(format!(
        "CREATE OR REPLACE TABLE {} FROM FILE ? WITH COLUMNS ({});",
        table, columns
    ))
    .bind(export_path.to_string_lossy().into_owned())
}

/// Issues ordered by number of comments.
pub fn most_commented(table: &str) -> Statement {
    Statement::new(format!(
        "SELECT issue_title, COUNT(*) AS total_comments \
         FROM {} \
         GROUP BY issue_title \
         ORDER BY total_comments DESC;",
        table
    ))
}

/// Commenters ordered by activity.
pub fn user_ranking(table: &str) -> Statement {
    Statement::new(format!(
        "SELECT comment_user, COUNT(comment_text) AS user_score \
         FROM {} \
         GROUP BY comment_user \
         ORDER BY user_score DESC;",
        table
    ))
}

/// Rows currently visible in `table`.
pub fn row_count(table: &str) -> Statement {
    Statement::new(format!("SELECT COUNT(*) AS row_count FROM {};", table))
}

/// Ask the embedding model for the vector of a free-text query.
pub fn embed_text(model: &str, text: &str) -> Statement {
    Statement::new(format!(
        "SELECT PREDICT({}.comment_embedding) AS embedding FROM (SELECT ? AS query_text);",
        model
    ))
    .bind(text)
}

/// Comments whose embedding is similar to `embedding`, best first.
pub fn similar_comments(
    table: &str,
    model: &str,
    embedding: &str,
    threshold: f64,
    limit: i64,
) -> Statement {
    Statement::new(format!(
        "SELECT issue_title, comment_text, \
         SIMILARITY({model}.comment_embedding, ?) AS similarity \
         FROM {table} \
         WHERE SIMILARITY({model}.comment_embedding, ?) > ? \
         ORDER BY similarity DESC \
         LIMIT ?;",
        model = model,
        table = table
    ))
    .bind(embedding)
    .bind(embedding)
    .bind(threshold)
    .bind(limit)
}
