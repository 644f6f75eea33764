//! CSV export of flattened issue rows.
//!
//! Produces the delimited file the analytics service loads as a table:
//! a header row in [`EXPORT_COLUMNS`] order followed by one row per
//! [`FlatRecord`]. The file is written to a temporary sibling and renamed
//! over the target, so readers see either the previous export or the new
//! one, never a partial file.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::models::{FlatRecord, EXPORT_COLUMNS};

/// What a successful export wrote.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub rows: usize,
    pub bytes: u64,
}

/// Write `records` to `path`, replacing any previous file.
///
/// The parent directory is created if missing. An empty slice still
/// produces a file containing the header row.
pub fn write_table(path: &Path, records: &[FlatRecord]) -> Result<ExportSummary> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent)
        .with_context(|| format!("Failed to create export directory: {}", parent.display()))?;

    let tmp = tempfile::NamedTempFile::new_in(&parent)
        .with_context(|| format!("Failed to create temporary file in {}", parent.display()))?;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(tmp);
    writer.write_record(EXPORT_COLUMNS)?;
    for record in records {
        writer.serialize(record)?;
    }
    let tmp = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush export: {}", e.error()))?;
    tmp.as_file().sync_all()?;

    // The analytics service may read the file as another user.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(tmp.path(), std::fs::Permissions::from_mode(0o644))?;
    }

    tmp.persist(path)
        .with_context(|| format!("Failed to write export file: {}", path.display()))?;

    let bytes = std::fs::metadata(path)?.len();
    debug!(path = %path.display(), rows = records.len(), bytes, "export written");

    Ok(ExportSummary {
        path: path.to_path_buf(),
        rows: records.len(),
        bytes,
    })
}

/// Read an export back into records.
///
/// Fails if the header does not match [`EXPORT_COLUMNS`].
pub fn read_table(path: &Path) -> Result<Vec<FlatRecord>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open export file: {}", path.display()))?;

    let headers = reader.headers()?.clone();
    if !headers.iter().eq(EXPORT_COLUMNS.iter().copied()) {
        bail!(
            "Unexpected export header in {}: {:?}",
            path.display(),
            headers.iter().collect::<Vec<_>>()
        );
    }

    let mut records = Vec::new();
    for row in reader.deserialize() {
        let record: FlatRecord = row?;
        records.push(record);
    }
    Ok(records)
}
