//! Row normalizers: raw rows in, canonical feed records out.
//!
//! Every feed shares the same rules for keys, lists, money and dates; the
//! per-feed functions only decide which column goes where.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

use crate::feed::FeedKind;
use crate::source::{Cell, RawTable};

pub const CATALOG_VERSION: &str = "1.0";

#[derive(Debug, Error, PartialEq)]
pub enum NormalizeError {
    #[error("column '{0}' not found in source")]
    MissingColumn(String),

    #[error("invalid value in column '{column}' at row {row}: {value}")]
    InvalidCell {
        column: String,
        row: usize,
        value: String,
    },
}

/// A number written without a fractional part when it is integral, so
/// `1500.0` serializes as `1500`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Amount(pub f64);

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        if self.0.fract() == 0.0 && self.0.abs() < 9.0e15 {
            s.serialize_i64(self.0 as i64)
        } else {
            s.serialize_f64(self.0)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prices {
    #[serde(rename = "D")]
    pub d: Amount,
    #[serde(rename = "E")]
    pub e: Amount,
    #[serde(rename = "F")]
    pub f: Amount,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Product {
    pub name: String,
    pub category: String,
    pub bulk: Amount,
    pub prices: Prices,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub name: String,
    pub categories: String,
    pub price_list: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Promotion {
    #[serde(rename = "tipoLista")]
    pub list_type: String,
    #[serde(rename = "precio")]
    pub special_price: Amount,
    #[serde(rename = "vigencia")]
    pub valid_until: String,
    #[serde(rename = "grupos")]
    pub group_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientFinance {
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "numero_cuenta")]
    pub account: String,
    #[serde(rename = "vendedor")]
    pub seller: String,
    #[serde(rename = "pgProm3M")]
    pub avg_paid_3m: Amount,
    #[serde(rename = "comproMes")]
    pub bought_this_month: Amount,
    #[serde(rename = "saldoTotal")]
    pub balance: Amount,
    #[serde(rename = "pagoMes")]
    pub paid_this_month: Amount,
    #[serde(rename = "cupoMes")]
    pub monthly_quota: Amount,
    #[serde(rename = "ultOperacion")]
    pub last_operation: String,
}

/// Image catalog document: product code to Drive file id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageCatalog {
    pub version: String,
    pub last_update: String,
    pub total_images: usize,
    pub images: BTreeMap<String, String>,
}

impl ImageCatalog {
    pub fn new(images: BTreeMap<String, String>, now: DateTime<Utc>) -> Self {
        Self {
            version: CATALOG_VERSION.to_string(),
            last_update: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            total_images: images.len(),
            images,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Groups {
    pub groups: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Promotions {
    pub promotions: BTreeMap<String, Promotion>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientFinances {
    pub clientes: BTreeMap<String, ClientFinance>,
}

/// The document written for one feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FeedOutput {
    Products(BTreeMap<String, Product>),
    Clients(BTreeMap<String, Client>),
    Groups(Groups),
    Promotions(Promotions),
    GroupCatalog(BTreeMap<String, Vec<String>>),
    ImageCatalog(ImageCatalog),
    ClientFinance(ClientFinances),
}

impl FeedOutput {
    /// Number of records, not counting wrapper keys or metadata.
    pub fn len(&self) -> usize {
        match self {
            FeedOutput::Products(m) => m.len(),
            FeedOutput::Clients(m) => m.len(),
            FeedOutput::Groups(g) => g.groups.len(),
            FeedOutput::Promotions(p) => p.promotions.len(),
            FeedOutput::GroupCatalog(m) => m.len(),
            FeedOutput::ImageCatalog(c) => c.images.len(),
            FeedOutput::ClientFinance(c) => c.clientes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of normalizing one table.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub output: FeedOutput,
    /// Rows dropped because their key cell was blank.
    pub skipped: usize,
}

/// Normalizes every row of `table` as a `kind` feed.
///
/// Rows with a blank key are skipped. Later rows win on duplicate keys.
pub fn normalize_table(
    kind: FeedKind,
    table: &RawTable,
    now: DateTime<Utc>,
) -> Result<Normalized, NormalizeError> {
    let rows = project(table, kind.columns())?;
    let mut skipped = 0;

    macro_rules! collect {
        ($row_fn:expr) => {{
            let mut map = BTreeMap::new();
            for (i, row) in rows.iter().enumerate() {
                match $row_fn(i, row.as_slice())? {
                    Some((key, record)) => {
                        map.insert(key, record);
                    }
                    None => skipped += 1,
                }
            }
            map
        }};
    }

    let output = match kind {
        FeedKind::Products => FeedOutput::Products(collect!(product_row)),
        FeedKind::Clients => FeedOutput::Clients(collect!(client_row)),
        FeedKind::Groups => FeedOutput::Groups(Groups {
            groups: collect!(group_row),
        }),
        FeedKind::Promotions => FeedOutput::Promotions(Promotions {
            promotions: collect!(promotion_row),
        }),
        FeedKind::ClientFinance => FeedOutput::ClientFinance(ClientFinances {
            clientes: collect!(finance_row),
        }),
        FeedKind::ImageCatalog => {
            FeedOutput::ImageCatalog(ImageCatalog::new(collect!(image_row), now))
        }
        FeedKind::GroupCatalog => {
            let mut catalog: BTreeMap<String, Vec<String>> = BTreeMap::new();
            for (i, row) in rows.iter().enumerate() {
                let Some(group) = key_text(i, &row[0], kind.columns()[0])? else {
                    skipped += 1;
                    continue;
                };
                let codes = catalog.entry(group).or_default();
                // Only the group is a key; an unreadable code is dropped like a blank.
                let code = match &row[1] {
                    Cell::Error(_) => continue,
                    cell if cell.is_blank() => continue,
                    cell => cell.text(),
                };
                if !codes.contains(&code) {
                    codes.push(code);
                }
            }
            FeedOutput::GroupCatalog(catalog)
        }
    };

    Ok(Normalized { output, skipped })
}

/// Reorders the table's rows into `columns` order.
///
/// Labelled tables are matched by header name; the key column must be
/// present, other missing columns read as empty. Unlabelled tables are taken
/// positionally.
fn project(table: &RawTable, columns: &[&str]) -> Result<Vec<Vec<Cell>>, NormalizeError> {
    let indices: Vec<Option<usize>> = if table.is_labelled() {
        let found: Vec<_> = columns.iter().map(|c| table.column(c)).collect();
        if found[0].is_none() {
            return Err(NormalizeError::MissingColumn(columns[0].to_string()));
        }
        found
    } else {
        (0..columns.len()).map(Some).collect()
    };

    Ok(table
        .rows
        .iter()
        .map(|row| {
            indices
                .iter()
                .map(|idx| idx.and_then(|i| row.get(i)).cloned().unwrap_or(Cell::Empty))
                .collect()
        })
        .collect())
}

type RowResult<T> = Result<Option<(String, T)>, NormalizeError>;

fn product_row(i: usize, row: &[Cell]) -> RowResult<Product> {
    let Some(code) = key_text(i, &row[0], "CODIGO")? else {
        return Ok(None);
    };
    Ok(Some((
        code,
        Product {
            name: row[1].text(),
            category: row[2].text(),
            bulk: number(&row[3]),
            prices: Prices {
                d: number(&row[4]),
                e: number(&row[5]),
                f: number(&row[6]),
            },
        },
    )))
}

fn client_row(i: usize, row: &[Cell]) -> RowResult<Client> {
    let Some(account) = account_key(i, &row[0], "CUENTA")? else {
        return Ok(None);
    };
    Ok(Some((
        account,
        Client {
            name: row[1].text(),
            categories: row[2].text(),
            price_list: row[3].text(),
        },
    )))
}

fn group_row(i: usize, row: &[Cell]) -> RowResult<Vec<String>> {
    let Some(name) = key_text(i, &row[0], "NOMBRE_GRUPO")? else {
        return Ok(None);
    };
    // Sheets turns a locale list such as `100,2` into the number 100.2.
    let raw = match &row[1] {
        Cell::Number(n) if n.is_finite() => format!("{n}").replace('.', ","),
        cell => cell.text(),
    };
    let members = split_list(&raw).iter().map(|m| coerce_account(m)).collect();
    Ok(Some((name, members)))
}

fn promotion_row(i: usize, row: &[Cell]) -> RowResult<Promotion> {
    let Some(code) = key_text(i, &row[0], "CODIGO_PRODUCTO")? else {
        return Ok(None);
    };
    Ok(Some((
        code,
        Promotion {
            list_type: row[1].text(),
            special_price: number(&row[2]),
            valid_until: format_date(&row[3]),
            group_names: split_list(&row[4].text()),
        },
    )))
}

fn finance_row(i: usize, row: &[Cell]) -> RowResult<ClientFinance> {
    let Some(account) = account_key(i, &row[0], "Cliente_ID")? else {
        return Ok(None);
    };
    Ok(Some((
        account.clone(),
        ClientFinance {
            name: row[1].text(),
            account,
            seller: row[2].text(),
            avg_paid_3m: number(&row[3]),
            bought_this_month: number(&row[4]),
            balance: number(&row[5]),
            paid_this_month: number(&row[6]),
            monthly_quota: number(&row[7]),
            last_operation: format_date(&row[8]),
        },
    )))
}

fn image_row(i: usize, row: &[Cell]) -> RowResult<String> {
    let Some(file_name) = key_text(i, &row[0], "nombre")? else {
        return Ok(None);
    };
    let file_id = row[1].text();
    if file_id.is_empty() {
        return Ok(None);
    }
    Ok(Some((article_name(&file_name).to_string(), file_id)))
}

/// Key cell as text, `None` when blank. Error cells abort the feed.
fn key_text(row: usize, cell: &Cell, column: &str) -> Result<Option<String>, NormalizeError> {
    if let Cell::Error(value) = cell {
        return Err(NormalizeError::InvalidCell {
            column: column.to_string(),
            row,
            value: value.clone(),
        });
    }
    if cell.is_blank() {
        return Ok(None);
    }
    Ok(Some(cell.text()))
}

fn account_key(row: usize, cell: &Cell, column: &str) -> Result<Option<String>, NormalizeError> {
    Ok(key_text(row, cell, column)?.map(|k| coerce_account(&k)))
}

/// Numeric-looking account ids are truncated to an integer: `"100.0"`,
/// `"100"` and `100` all become `"100"`. Anything else is returned trimmed.
pub fn coerce_account(raw: &str) -> String {
    let raw = raw.trim();
    match raw.parse::<f64>() {
        Ok(n) if n.is_finite() => format!("{}", n.trunc() as i64),
        _ => raw.to_string(),
    }
}

/// Splits a comma-separated cell, trimming each element. Blank input yields
/// an empty list and empty elements are dropped.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Drops the final extension only: `TF.414.png` becomes `TF.414`.
pub fn article_name(file_name: &str) -> &str {
    match file_name.rfind('.') {
        Some(dot) if dot > 0 => &file_name[..dot],
        _ => file_name,
    }
}

/// Parses money text such as `$1.234,56` or `-$10,00` (`.` thousands,
/// `,` decimals). Blank, `NaN` or unparseable text is `0`.
pub fn parse_currency(raw: &str) -> f64 {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '$' | '.') && !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect();

    let (negative, digits) = match cleaned.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, cleaned.as_str()),
    };
    match digits.parse::<f64>() {
        Ok(v) if v.is_finite() => {
            if negative {
                -v
            } else {
                v
            }
        }
        _ => 0.0,
    }
}

/// Numeric cell value; text goes through [`parse_currency`], blanks are `0`.
pub fn number(cell: &Cell) -> Amount {
    match cell {
        Cell::Number(n) if n.is_finite() => Amount(*n),
        Cell::Text(s) => Amount(parse_currency(s)),
        _ => Amount(0.0),
    }
}

/// Dates render as `dd/mm/yyyy`. Text already containing `/` is kept as is;
/// anything unparseable becomes an empty string.
pub fn format_date(cell: &Cell) -> String {
    const DATE_FMT: &str = "%d/%m/%Y";
    match cell {
        Cell::DateTime(dt) => dt.format(DATE_FMT).to_string(),
        Cell::Text(s) => {
            let s = s.trim();
            if s.contains('/') {
                return s.to_string();
            }
            ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"]
                .iter()
                .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
                .map(|dt| dt.date())
                .or_else(|| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
                .map(|d| d.format(DATE_FMT).to_string())
                .unwrap_or_default()
        }
        _ => String::new(),
    }
}
