//! Output persistence: one pretty-printed JSON document per feed.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::feed::FeedKind;
use crate::sync::RunSummary;

/// Writes `value` as indented UTF-8 JSON to `path`, replacing any previous
/// file. The document goes to a sibling temp file first and is renamed into
/// place, so a failed write leaves the old file intact.
pub fn write_json(path: &Path, value: &impl Serialize) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }

    let body = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, body).with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("replacing {}", path.display()))?;

    debug!(path = %path.display(), "JSON written");
    Ok(())
}

/// Re-reads a written feed file and compares its record count with
/// `expected`. A mismatch is only logged.
pub fn verify_written(path: &Path, kind: FeedKind, expected: usize) -> Result<usize> {
    let content = fs::read_to_string(path)?;
    let doc: serde_json::Value = serde_json::from_str(&content)?;

    let records = match kind.nested_key() {
        Some(key) => &doc[key],
        None => &doc,
    };
    let found = records.as_object().map(|m| m.len()).unwrap_or(0);

    if found != expected {
        warn!(
            path = %path.display(),
            expected,
            found,
            "Written file does not hold the expected number of records"
        );
    }
    Ok(found)
}

/// Logs the run summary as one structured event per feed.
pub fn log_summary(summary: &RunSummary) {
    for report in &summary.reports {
        info!(
            feed = %report.feed,
            outcome = %report.outcome,
            records = report.records,
            skipped = report.skipped,
            remote_error = report.remote_error.as_deref().unwrap_or(""),
            local_error = report.local_error.as_deref().unwrap_or(""),
            "Feed result"
        );
    }
    info!(
        updated = summary.updated(),
        failed = summary.failed(),
        "Sync finished"
    );
}
