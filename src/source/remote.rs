//! Remote reader for the spreadsheet visualization (gviz) endpoint.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use tracing::debug;

use super::{Cell, RawTable, RowSource, SourceError};
use crate::feed::Feed;
use crate::fetch::{HttpClient, fetch_text};

const ENVELOPE_START: &str = "setResponse(";

#[derive(Deserialize)]
struct GvizResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    table: Option<GvizTable>,
}

#[derive(Deserialize)]
struct GvizTable {
    #[serde(default)]
    cols: Vec<GvizCol>,
    #[serde(default)]
    rows: Vec<GvizRow>,
}

#[derive(Deserialize)]
struct GvizCol {
    #[serde(default)]
    label: String,
    #[serde(default, rename = "type")]
    kind: String,
}

#[derive(Deserialize)]
struct GvizRow {
    #[serde(default)]
    c: Vec<Option<GvizCell>>,
}

#[derive(Deserialize)]
struct GvizCell {
    #[serde(default)]
    v: serde_json::Value,
}

/// Reads feeds from published spreadsheets by sheet id.
pub struct SheetsSource<C> {
    client: C,
    base_url: String,
}

impl<C: HttpClient> SheetsSource<C> {
    pub fn new(client: C, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn url_for(&self, sheet_id: &str) -> String {
        format!(
            "{}/{}/gviz/tq?tqx=out:json",
            self.base_url.trim_end_matches('/'),
            sheet_id
        )
    }
}

#[async_trait]
impl<C: HttpClient> RowSource for SheetsSource<C> {
    fn label(&self) -> &'static str {
        "remote"
    }

    #[tracing::instrument(skip(self, feed), fields(feed = %feed.kind))]
    async fn fetch_rows(&self, feed: &Feed) -> Result<RawTable, SourceError> {
        let sheet_id = feed.remote_id.as_deref().ok_or_else(|| {
            SourceError::RemoteUnavailable(format!(
                "no sheet id configured (key '{}')",
                feed.kind.config_key()
            ))
        })?;

        let body = fetch_text(&self.client, &self.url_for(sheet_id))
            .await
            .map_err(|e| SourceError::RemoteUnavailable(format!("{e:#}")))?;
        debug!(bytes = body.len(), "Sheet response received");

        parse_gviz(&body)
    }
}

/// Strips the `google.visualization.Query.setResponse(...)` wrapper and
/// converts the table into a [`RawTable`].
pub fn parse_gviz(body: &str) -> Result<RawTable, SourceError> {
    let json = strip_envelope(body)
        .ok_or_else(|| SourceError::RemoteUnavailable("unexpected response envelope".into()))?;

    let response: GvizResponse = serde_json::from_str(json)
        .map_err(|e| SourceError::RemoteUnavailable(format!("invalid sheet JSON: {e}")))?;

    if response.status.as_deref() == Some("error") {
        return Err(SourceError::RemoteUnavailable(
            "sheet query returned status 'error'".into(),
        ));
    }
    let table = response
        .table
        .ok_or_else(|| SourceError::RemoteUnavailable("response has no table".into()))?;

    let headers = table.cols.iter().map(|c| c.label.trim().to_string()).collect();
    let rows = table
        .rows
        .into_iter()
        .map(|row| {
            row.c
                .into_iter()
                .enumerate()
                .map(|(i, cell)| {
                    let kind = table.cols.get(i).map(|c| c.kind.as_str()).unwrap_or("");
                    cell.map(|c| convert_cell(c.v, kind)).unwrap_or(Cell::Empty)
                })
                .collect()
        })
        .collect();

    Ok(RawTable::new(headers, rows))
}

fn strip_envelope(body: &str) -> Option<&str> {
    let start = body.find(ENVELOPE_START)? + ENVELOPE_START.len();
    let end = body.rfind(')')?;
    (end > start).then(|| &body[start..end])
}

fn convert_cell(value: serde_json::Value, kind: &str) -> Cell {
    match value {
        serde_json::Value::Null => Cell::Empty,
        serde_json::Value::Bool(b) => Cell::Bool(b),
        serde_json::Value::Number(n) => n.as_f64().map(Cell::Number).unwrap_or(Cell::Empty),
        serde_json::Value::String(s) => {
            if matches!(kind, "date" | "datetime") {
                if let Some(dt) = parse_gviz_date(&s) {
                    return Cell::DateTime(dt);
                }
            }
            Cell::Text(s)
        }
        other => Cell::Text(other.to_string()),
    }
}

/// Parses `Date(2024,0,15)` or `Date(2024,0,15,10,30,0)`; the month is
/// zero-based.
fn parse_gviz_date(s: &str) -> Option<NaiveDateTime> {
    let inner = s.trim().strip_prefix("Date(")?.strip_suffix(')')?;
    let parts = inner
        .split(',')
        .map(|p| p.trim().parse::<u32>())
        .collect::<Result<Vec<_>, _>>()
        .ok()?;
    let (year, month, day) = match parts.as_slice() {
        [y, m, d, ..] => (*y as i32, *m + 1, *d),
        _ => return None,
    };
    let at = |i: usize| parts.get(i).copied().unwrap_or(0);
    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(at(3), at(4), at(5))
}
