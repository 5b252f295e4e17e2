//! Local workbook reader, used as the fallback when the remote sheet is out
//! of reach.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use calamine::{Data, Range, Reader, open_workbook_auto};
use chrono::NaiveDateTime;
use tracing::{debug, warn};

use super::{Cell, RawTable, RowSource, SourceError};
use crate::feed::{Feed, LocalSource};

/// Reads feeds from spreadsheet files under one directory.
pub struct WorkbookSource {
    dir: PathBuf,
}

impl WorkbookSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Reads one sheet (the first when `sheet` is `None`) of `file`.
    pub fn read_sheet(&self, file: &str, sheet: Option<&str>) -> Result<RawTable, SourceError> {
        let path = self.existing(file)?;
        if is_csv(&path) {
            return read_csv(&path);
        }

        let mut workbook = open_workbook_auto(&path)
            .map_err(|e| SourceError::LocalUnreadable(format!("{}: {e}", path.display())))?;
        let names = workbook.sheet_names().to_owned();

        let name = match sheet {
            Some(wanted) => names
                .iter()
                .find(|n| n.eq_ignore_ascii_case(wanted))
                .cloned()
                .ok_or_else(|| SourceError::LocalSheetMissing {
                    path: path.clone(),
                    sheet: wanted.to_string(),
                })?,
            None => names.first().cloned().ok_or_else(|| SourceError::LocalSheetMissing {
                path: path.clone(),
                sheet: "<first>".to_string(),
            })?,
        };

        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| SourceError::LocalUnreadable(format!("{}[{name}]: {e}", path.display())))?;
        Ok(range_to_table(&range))
    }

    /// Reads a workbook holding one tab per group and flattens it into
    /// `(GRUPO, <column>)` rows, in tab order. Tabs without `column` are
    /// skipped. A CSV export has no tabs, so only a workbook is accepted.
    pub fn read_tab_per_group(&self, file: &str, column: &str) -> Result<RawTable, SourceError> {
        let path = self.existing(file)?;
        if is_csv(&path) {
            return Err(SourceError::LocalUnreadable(format!(
                "{}: one tab per group needs a workbook, not a CSV export",
                path.display()
            )));
        }
        let mut workbook = open_workbook_auto(&path)
            .map_err(|e| SourceError::LocalUnreadable(format!("{}: {e}", path.display())))?;
        let names = workbook.sheet_names().to_owned();
        if names.is_empty() {
            return Err(SourceError::LocalSheetMissing {
                path,
                sheet: "<any>".to_string(),
            });
        }

        let mut rows = Vec::new();
        for name in names {
            let range = match workbook.worksheet_range(&name) {
                Ok(range) => range,
                Err(e) => {
                    warn!(sheet = %name, error = %e, "Skipping unreadable tab");
                    continue;
                }
            };
            let tab = range_to_table(&range);
            let Some(idx) = tab.column(column) else {
                warn!(sheet = %name, column, "Tab has no product column, skipping");
                continue;
            };

            let group = Cell::Text(name.trim().to_string());
            // The group is listed even when its tab holds no codes.
            rows.push(vec![group.clone(), Cell::Empty]);
            for row in tab.rows {
                let code = row.get(idx).cloned().unwrap_or(Cell::Empty);
                rows.push(vec![group.clone(), code]);
            }
            debug!(sheet = %name, "Group tab read");
        }

        Ok(RawTable::new(
            vec!["GRUPO".to_string(), column.to_string()],
            rows,
        ))
    }

    fn existing(&self, file: &str) -> Result<PathBuf, SourceError> {
        let path = self.dir.join(file);
        if path.is_file() {
            return Ok(path);
        }
        // A CSV export with the same stem is accepted in place of the workbook.
        let csv = path.with_extension("csv");
        if csv.is_file() {
            return Ok(csv);
        }
        Err(SourceError::LocalFileMissing(path))
    }
}

#[async_trait]
impl RowSource for WorkbookSource {
    fn label(&self) -> &'static str {
        "local"
    }

    #[tracing::instrument(skip(self, feed), fields(feed = %feed.kind))]
    async fn fetch_rows(&self, feed: &Feed) -> Result<RawTable, SourceError> {
        match &feed.local {
            LocalSource::None => Err(SourceError::NoLocalFallback(feed.name().to_string())),
            LocalSource::Sheet { file, sheet } => self.read_sheet(file, *sheet),
            LocalSource::TabPerGroup { file, column } => self.read_tab_per_group(file, column),
        }
    }
}

fn is_csv(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"))
}

fn read_csv(path: &Path) -> Result<RawTable, SourceError> {
    let unreadable = |e: csv::Error| SourceError::LocalUnreadable(format!("{}: {e}", path.display()));

    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(unreadable)?;

    let headers = rdr
        .headers()
        .map_err(unreadable)?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record.map_err(unreadable)?;
        rows.push(record.iter().map(csv_cell).collect());
    }
    Ok(RawTable::new(headers, rows))
}

/// CSV carries no types: plain decimal numbers (`1500.5`, `-3`) become
/// numbers, everything else stays text. Codes with a leading zero and
/// currency text (`$1.234,56`) are left for the normalizer.
fn csv_cell(raw: &str) -> Cell {
    let s = raw.trim();
    let digits = s.strip_prefix('-').unwrap_or(s);
    let plain = !digits.is_empty()
        && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
        && digits.chars().filter(|&c| c == '.').count() <= 1
        && !(digits.len() > 1 && digits.starts_with('0') && !digits.starts_with("0."));
    match s.parse::<f64>() {
        Ok(n) if plain && n.is_finite() => Cell::Number(n),
        _ => Cell::from(raw),
    }
}

/// First row is the header row.
fn range_to_table(range: &Range<Data>) -> RawTable {
    let mut rows = range.rows();
    let headers = rows
        .next()
        .map(|r| r.iter().map(|c| convert_cell(c).text()).collect())
        .unwrap_or_default();
    let rows = rows.map(|r| r.iter().map(convert_cell).collect()).collect();
    RawTable::new(headers, rows)
}

fn convert_cell(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Float(f) => Cell::Number(*f),
        Data::String(s) => Cell::from(s.as_str()),
        Data::Bool(b) => Cell::Bool(*b),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(Cell::DateTime)
            .unwrap_or(Cell::Number(dt.as_f64())),
        Data::DateTimeIso(s) => NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
            .map(Cell::DateTime)
            .unwrap_or_else(|_| Cell::from(s.as_str())),
        Data::DurationIso(s) => Cell::from(s.as_str()),
        Data::Error(e) => Cell::Error(e.to_string()),
    }
}
