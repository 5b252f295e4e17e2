//! Run configuration: remote sheet ids and pipeline settings.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::feed::FeedKind;

pub const DEFAULT_SHEETS_URL: &str = "https://docs.google.com/spreadsheets/d";
pub const DEFAULT_IMAGE_URL: &str = "https://drive.google.com/uc?export=view";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no sheet ids found in {}", .0.display())]
    Empty(PathBuf),
}

/// Remote sheet ids keyed by config key name (e.g. `productosId`).
///
/// The file is the front-end's own config script, so ids are discovered by
/// matching known key names rather than parsing it:
/// ```text
/// productosId: '1abc...',
/// gruposId = "1def..."
/// ```
#[derive(Debug, Clone, Default)]
pub struct RemoteIds {
    entries: HashMap<String, String>,
}

impl RemoteIds {
    /// Loads ids from the file at `path`. A file with none of the known keys
    /// is an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let ids = Self::parse(&content);
        if ids.entries.is_empty() {
            return Err(ConfigError::Empty(path.to_path_buf()));
        }
        Ok(ids)
    }

    /// Extracts every known feed key present in `content`.
    pub fn parse(content: &str) -> Self {
        let entries = FeedKind::ALL
            .iter()
            .filter_map(|kind| {
                let key = kind.config_key();
                find_assignment(content, key).map(|value| (key.to_string(), value))
            })
            .collect();
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Finds `key <:|=> 'value'` where `key` stands on its own (not as the
/// suffix of a longer identifier) and the value is a quoted, non-empty string.
fn find_assignment(content: &str, key: &str) -> Option<String> {
    let is_ident = |c: char| c.is_ascii_alphanumeric() || c == '_' || c == '$';

    for (start, _) in content.match_indices(key) {
        if content[..start].chars().next_back().is_some_and(is_ident) {
            continue;
        }
        let rest = &content[start + key.len()..];
        if rest.chars().next().is_some_and(is_ident) {
            continue;
        }
        let rest = rest.trim_start_matches(['"', '\'']).trim_start();
        let Some(rest) = rest.strip_prefix([':', '=']) else {
            continue;
        };
        let rest = rest.trim_start();
        let Some(quote) = rest.chars().next().filter(|c| matches!(*c, '\'' | '"' | '`')) else {
            continue;
        };
        let body = &rest[1..];
        if let Some(end) = body.find(quote) {
            let value = body[..end].trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

/// Settings shared by every command.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub excel_dir: PathBuf,
    pub json_dir: PathBuf,
    pub sheets_url: String,
    pub image_url: String,
    pub http_timeout: Duration,
    pub image_timeout: Duration,
    pub workers: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            excel_dir: PathBuf::from("excel"),
            json_dir: PathBuf::from("json"),
            sheets_url: DEFAULT_SHEETS_URL.to_string(),
            image_url: DEFAULT_IMAGE_URL.to_string(),
            http_timeout: Duration::from_secs(20),
            image_timeout: Duration::from_secs(5),
            workers: 8,
        }
    }
}
