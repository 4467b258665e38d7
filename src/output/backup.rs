//! Plain-text backup of stored records

use crate::storage::StoredRecord;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

const SEPARATOR_WIDTH: usize = 80;

fn or_na<T: ToString>(value: &Option<T>) -> String {
    value
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "N/A".to_string())
}

/// Renders records as labelled blocks separated by a dashed line
pub fn format_backup(records: &[StoredRecord]) -> String {
    let separator = "-".repeat(SEPARATOR_WIDTH);
    let mut out = String::new();

    for stored in records {
        let r = &stored.record;
        // Writing to a String cannot fail
        let _ = writeln!(out, "Name: {}", r.name);
        let _ = writeln!(out, "Price: {}", or_na(&r.price));
        let _ = writeln!(out, "Rating: {}", or_na(&r.rating));
        let _ = writeln!(out, "Reviews: {}", or_na(&r.review_count));
        let _ = writeln!(out, "URL: {}", r.url);
        let _ = writeln!(out, "Category: {}", r.category);
        let _ = writeln!(out, "Observed At: {}", r.observed_at.to_rfc3339());
        let _ = writeln!(out, "{}", separator);
    }

    out
}

/// Writes the backup file, replacing any previous one
///
/// # Returns
///
/// The number of records written
pub fn write_backup(records: &[StoredRecord], path: &Path) -> std::io::Result<usize> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    fs::write(path, format_backup(records))?;
    Ok(records.len())
}
