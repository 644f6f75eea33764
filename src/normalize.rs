//! Flattening of issue threads into exportable rows.

use crate::models::{FlatRecord, IssueThread};

/// Produce one [`FlatRecord`] per comment, carrying its parent issue's fields.
///
/// Output follows issue order, then comment order within each issue. Issues
/// without comments contribute no rows, so the row count equals the total
/// number of comments. A missing issue body becomes an empty string.
pub fn flatten_threads(threads: &[IssueThread]) -> Vec<FlatRecord> {
    threads
        .iter()
        .flat_map(|thread| {
            let issue = &thread.issue;
            thread.comments.iter().map(move |comment| FlatRecord {
                issue_id: issue.id,
                issue_title: issue.title.clone(),
                issue_body: issue.body.clone().unwrap_or_default(),
                comment_user: comment.author.clone(),
                comment_text: comment.text.clone(),
            })
        })
        .collect()
}
