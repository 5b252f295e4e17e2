//! Row sources for catalog feeds.
//!
//! A feed can be read from the remote spreadsheet service ([`SheetsSource`])
//! or from a local workbook ([`WorkbookSource`]). Both hand back the same
//! [`RawTable`] shape so the normalizers never care where a row came from.

mod local;
mod remote;

pub use local::WorkbookSource;
pub use remote::{SheetsSource, parse_gviz};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::path::PathBuf;
use thiserror::Error;

use crate::feed::Feed;

/// Failures reading a feed from one of its sources.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("remote unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("local file missing: {}", .0.display())]
    LocalFileMissing(PathBuf),

    #[error("sheet '{sheet}' missing in {}", .path.display())]
    LocalSheetMissing { path: PathBuf, sheet: String },

    #[error("local file unreadable: {0}")]
    LocalUnreadable(String),

    #[error("feed '{0}' has no local fallback")]
    NoLocalFallback(String),
}

/// A single cell value, independent of the source format.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
    Error(String),
}

impl Cell {
    /// True for empty cells and text that is only whitespace.
    pub fn is_blank(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            Cell::Number(n) => n.is_nan(),
            _ => false,
        }
    }

    /// Renders the cell as trimmed text. Integral numbers lose their `.0`.
    pub fn text(&self) -> String {
        match self {
            Cell::Empty | Cell::Error(_) => String::new(),
            Cell::Text(s) => s.trim().to_string(),
            Cell::Number(n) if n.is_nan() => String::new(),
            Cell::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            Cell::Number(n) => n.to_string(),
            Cell::Bool(b) => b.to_string(),
            Cell::DateTime(dt) => dt.format("%d/%m/%Y").to_string(),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        if s.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(s.to_string())
        }
    }
}

/// Tabular data as read from a source: a header row plus data rows.
///
/// Headers may all be empty when the source does not label its columns; the
/// normalizers then fall back to positional lookup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        Self { headers, rows }
    }

    /// Returns `true` when at least one header carries a label.
    pub fn is_labelled(&self) -> bool {
        self.headers.iter().any(|h| !h.trim().is_empty())
    }

    /// Index of the column whose header matches `name`, ignoring case.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
    }
}

/// Anything that can produce the raw rows of a feed.
#[async_trait]
pub trait RowSource: Send + Sync {
    /// Short label used in logs and run summaries.
    fn label(&self) -> &'static str;

    async fn fetch_rows(&self, feed: &Feed) -> Result<RawTable, SourceError>;
}
