//! Per-feed synchronization: try the remote sheet, fall back to the local
//! workbook, and record what happened.
//!
//! Feeds run one after another and never affect each other. A feed that
//! fails both ways keeps its previous output file; the run as a whole never
//! fails.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::Utc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::feed::{Feed, FeedKind};
use crate::normalize::{NormalizeError, normalize_table};
use crate::output::{verify_written, write_json};
use crate::source::{RowSource, SourceError};

/// Why a single attempt (remote or local) for a feed failed.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("normalization failed: {0}")]
    Normalize(#[from] NormalizeError),

    #[error(transparent)]
    Write(#[from] anyhow::Error),
}

/// Terminal state of one feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    RemoteSuccess,
    LocalFallback,
    LocalFailed,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Outcome::RemoteSuccess => "remote-success",
            Outcome::LocalFallback => "local-fallback",
            Outcome::LocalFailed => "local-failed",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedReport {
    pub feed: FeedKind,
    pub outcome: Outcome,
    pub records: usize,
    pub skipped: usize,
    pub remote_error: Option<String>,
    pub local_error: Option<String>,
}

impl FeedReport {
    pub fn succeeded(&self) -> bool {
        self.outcome != Outcome::LocalFailed
    }
}

/// Per-feed results of one run. Partial success is a normal result.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub reports: Vec<FeedReport>,
}

impl RunSummary {
    pub fn get(&self, kind: FeedKind) -> Option<&FeedReport> {
        self.reports.iter().find(|r| r.feed == kind)
    }

    pub fn updated(&self) -> usize {
        self.reports.iter().filter(|r| r.succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        self.reports.len() - self.updated()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<16} {:<16} {:>8} {:>8}  cause", "feed", "outcome", "records", "skipped")?;
        for r in &self.reports {
            let cause = match r.outcome {
                Outcome::RemoteSuccess => String::new(),
                Outcome::LocalFallback => r.remote_error.clone().unwrap_or_default(),
                Outcome::LocalFailed => [r.remote_error.as_deref(), r.local_error.as_deref()]
                    .into_iter()
                    .flatten()
                    .collect::<Vec<_>>()
                    .join("; "),
            };
            writeln!(
                f,
                "{:<16} {:<16} {:>8} {:>8}  {}",
                r.feed.name(),
                r.outcome.to_string(),
                r.records,
                r.skipped,
                cause
            )?;
        }
        write!(
            f,
            "{} of {} feeds updated",
            self.updated(),
            self.reports.len()
        )
    }
}

/// Drives the remote-then-local fallback for each feed.
pub struct Orchestrator<'a> {
    remote: &'a dyn RowSource,
    local: &'a dyn RowSource,
    json_dir: PathBuf,
}

impl<'a> Orchestrator<'a> {
    pub fn new(remote: &'a dyn RowSource, local: &'a dyn RowSource, json_dir: impl Into<PathBuf>) -> Self {
        Self {
            remote,
            local,
            json_dir: json_dir.into(),
        }
    }

    /// Syncs every feed in order and collects one report per feed.
    pub async fn run(&self, feeds: &[Feed]) -> RunSummary {
        let mut summary = RunSummary::default();
        for feed in feeds {
            summary.reports.push(self.sync_feed(feed).await);
        }
        summary
    }

    #[tracing::instrument(skip(self, feed), fields(feed = %feed.kind))]
    pub async fn sync_feed(&self, feed: &Feed) -> FeedReport {
        let mut report = FeedReport {
            feed: feed.kind,
            outcome: Outcome::LocalFailed,
            records: 0,
            skipped: 0,
            remote_error: None,
            local_error: None,
        };

        match self.attempt(self.remote, feed).await {
            Ok((records, skipped)) => {
                info!(records, skipped, "Feed synced from remote");
                report.outcome = Outcome::RemoteSuccess;
                report.records = records;
                report.skipped = skipped;
                return report;
            }
            Err(e) => {
                warn!(error = %e, "Remote attempt failed");
                report.remote_error = Some(e.to_string());
            }
        }

        if !feed.has_local_fallback() {
            let e = SourceError::NoLocalFallback(feed.name().to_string());
            error!(error = %e, "Feed not updated");
            report.local_error = Some(e.to_string());
            return report;
        }

        match self.attempt(self.local, feed).await {
            Ok((records, skipped)) => {
                info!(records, skipped, "Feed synced from local fallback");
                report.outcome = Outcome::LocalFallback;
                report.records = records;
                report.skipped = skipped;
            }
            Err(e) => {
                error!(error = %e, "Local fallback failed, feed not updated");
                report.local_error = Some(e.to_string());
            }
        }
        report
    }

    /// Reads, normalizes and writes one feed from `source`. Returns the
    /// record and skipped-row counts.
    async fn attempt(&self, source: &dyn RowSource, feed: &Feed) -> Result<(usize, usize), AttemptError> {
        let table = source.fetch_rows(feed).await?;
        let normalized = normalize_table(feed.kind, &table, Utc::now())?;
        let records = normalized.output.len();
        if normalized.output.is_empty() {
            warn!(source = source.label(), "Feed produced no records");
        }

        let path = self.output_path(feed.kind);
        write_json(&path, &normalized.output)?;
        if let Err(e) = verify_written(&path, feed.kind, records) {
            warn!(source = source.label(), error = %e, "Could not verify written output");
        }
        Ok((records, normalized.skipped))
    }

    pub fn output_path(&self, kind: FeedKind) -> PathBuf {
        output_path(&self.json_dir, kind)
    }
}

pub fn output_path(json_dir: &Path, kind: FeedKind) -> PathBuf {
    json_dir.join(kind.output_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{Cell, RawTable};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::fs;
    use std::sync::Mutex;

    /// In-memory source: feeds listed in `tables` succeed, others fail.
    struct MemorySource {
        label: &'static str,
        tables: HashMap<FeedKind, RawTable>,
        calls: Mutex<Vec<FeedKind>>,
    }

    impl MemorySource {
        fn new(label: &'static str, tables: Vec<(FeedKind, RawTable)>) -> Self {
            Self {
                label,
                tables: tables.into_iter().collect(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<FeedKind> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RowSource for MemorySource {
        fn label(&self) -> &'static str {
            self.label
        }

        async fn fetch_rows(&self, feed: &Feed) -> Result<RawTable, SourceError> {
            self.calls.lock().unwrap().push(feed.kind);
            self.tables
                .get(&feed.kind)
                .cloned()
                .ok_or_else(|| SourceError::RemoteUnavailable("connection refused".into()))
        }
    }

    fn clients_table(name: &str) -> RawTable {
        RawTable::new(
            FeedKind::Clients.columns().iter().map(|c| c.to_string()).collect(),
            vec![vec![Cell::Number(100.0), Cell::Text(name.into())]],
        )
    }

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(name);
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[tokio::test]
    async fn test_remote_success_skips_local() {
        let dir = temp_dir("catalog_sync_sync_remote");
        let remote = MemorySource::new("remote", vec![(FeedKind::Clients, clients_table("REMOTO"))]);
        let local = MemorySource::new("local", vec![]);
        let orch = Orchestrator::new(&remote, &local, &dir);

        let report = orch.sync_feed(&Feed::new(FeedKind::Clients, Some("id".into()))).await;

        assert_eq!(report.outcome, Outcome::RemoteSuccess);
        assert_eq!(report.records, 1);
        assert!(local.calls().is_empty());
        let written = fs::read_to_string(dir.join("clients.json")).unwrap();
        assert!(written.contains("REMOTO"));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_remote_failure_falls_back_to_local() {
        let dir = temp_dir("catalog_sync_sync_fallback");
        let remote = MemorySource::new("remote", vec![]);
        let local = MemorySource::new("local", vec![(FeedKind::Clients, clients_table("LOCAL"))]);
        let orch = Orchestrator::new(&remote, &local, &dir);

        let report = orch.sync_feed(&Feed::new(FeedKind::Clients, None)).await;

        assert_eq!(report.outcome, Outcome::LocalFallback);
        assert!(report.remote_error.unwrap().contains("connection refused"));
        assert_eq!(local.calls(), vec![FeedKind::Clients]);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_normalization_error_falls_back_to_local() {
        let dir = temp_dir("catalog_sync_sync_badremote");
        let broken = RawTable::new(vec!["OTRA".into()], vec![vec![Cell::Text("x".into())]]);
        let remote = MemorySource::new("remote", vec![(FeedKind::Clients, broken)]);
        let local = MemorySource::new("local", vec![(FeedKind::Clients, clients_table("LOCAL"))]);
        let orch = Orchestrator::new(&remote, &local, &dir);

        let report = orch.sync_feed(&Feed::new(FeedKind::Clients, Some("id".into()))).await;

        assert_eq!(report.outcome, Outcome::LocalFallback);
        assert!(report.remote_error.unwrap().contains("CUENTA"));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_image_catalog_never_tries_local() {
        let dir = temp_dir("catalog_sync_sync_images");
        let remote = MemorySource::new("remote", vec![]);
        let local = MemorySource::new("local", vec![]);
        let orch = Orchestrator::new(&remote, &local, &dir);

        let report = orch.sync_feed(&Feed::new(FeedKind::ImageCatalog, None)).await;

        assert_eq!(report.outcome, Outcome::LocalFailed);
        assert!(local.calls().is_empty());
        assert!(!dir.join("image_catalog.json").exists());
    }

    #[tokio::test]
    async fn test_double_failure_keeps_previous_output() {
        let dir = temp_dir("catalog_sync_sync_keep");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("clients.json");
        fs::write(&path, "{\"1\": {}}").unwrap();

        let remote = MemorySource::new("remote", vec![]);
        let local = MemorySource::new("local", vec![]);
        let orch = Orchestrator::new(&remote, &local, &dir);

        let summary = orch.run(&[Feed::new(FeedKind::Clients, None)]).await;

        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.updated(), 0);
        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"1\": {}}");

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_summary_display_lists_each_feed() {
        let summary = RunSummary {
            reports: vec![
                FeedReport {
                    feed: FeedKind::Products,
                    outcome: Outcome::RemoteSuccess,
                    records: 10,
                    skipped: 0,
                    remote_error: None,
                    local_error: None,
                },
                FeedReport {
                    feed: FeedKind::Clients,
                    outcome: Outcome::LocalFailed,
                    records: 0,
                    skipped: 0,
                    remote_error: Some("timeout".into()),
                    local_error: Some("local file missing".into()),
                },
            ],
        };
        let text = summary.to_string();
        assert!(text.contains("products"));
        assert!(text.contains("remote-success"));
        assert!(text.contains("timeout; local file missing"));
        assert!(text.ends_with("1 of 2 feeds updated"));
    }
}
