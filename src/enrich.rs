//! Image metadata enrichment: an approximate display ratio per product
//! image, used only for layout.
//!
//! No image bytes are downloaded. Each image gets one HEAD request; the ratio
//! is guessed from the declared size, from a hash of the product code when
//! the response says nothing useful, or set to a fixed default when the
//! request fails. A failing image never aborts the batch.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{Instrument, debug, info, warn};

use crate::fetch::{HttpClient, head};
use crate::normalize::{CATALOG_VERSION, ImageCatalog};

pub const BASE_WIDTH: u32 = 800;
pub const DEFAULT_RATIO: f64 = 4.0 / 3.0;

const SMALL_IMAGE_BYTES: u64 = 50 * 1024;
const LARGE_IMAGE_BYTES: u64 = 500 * 1024;

/// 1:1, 4:3, 3:2, 16:9, 5:4
const COMMON_RATIOS: [f64; 5] = [1.0, 4.0 / 3.0, 3.0 / 2.0, 16.0 / 9.0, 5.0 / 4.0];

#[derive(Debug, Error)]
#[error("image metadata fetch failed: {0}")]
pub struct ImageFetchFailed(pub String);

/// Headers of interest from a metadata-only request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageMeta {
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
}

#[async_trait]
pub trait MetadataProbe: Send + Sync {
    async fn probe(&self, file_id: &str) -> Result<ImageMeta, ImageFetchFailed>;
}

/// Probes Drive-hosted images with HEAD requests.
pub struct HttpProbe<C> {
    client: C,
    base_url: String,
}

impl<C: HttpClient> HttpProbe<C> {
    pub fn new(client: C, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl<C: HttpClient> MetadataProbe for HttpProbe<C> {
    async fn probe(&self, file_id: &str) -> Result<ImageMeta, ImageFetchFailed> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| ImageFetchFailed(format!("bad base url: {e}")))?;
        url.query_pairs_mut().append_pair("id", file_id);

        let resp = head(&self.client, url.as_str())
            .await
            .map_err(|e| ImageFetchFailed(format!("{e:#}")))?;

        let headers = resp.headers();
        Ok(ImageMeta {
            content_type: headers
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            content_length: headers
                .get(CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok()),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DimensionEntry {
    pub width: u32,
    pub height: u32,
    pub ratio: f64,
}

impl DimensionEntry {
    pub fn from_ratio(ratio: f64) -> Self {
        Self {
            width: BASE_WIDTH,
            height: (BASE_WIDTH as f64 / ratio).round() as u32,
            ratio: (ratio * 1000.0).round() / 1000.0,
        }
    }

    pub fn fallback() -> Self {
        Self::from_ratio(DEFAULT_RATIO)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageDimensions {
    pub version: String,
    #[serde(rename = "lastUpdate")]
    pub last_update: String,
    pub images_dimensions: BTreeMap<String, DimensionEntry>,
}

impl ImageDimensions {
    pub fn new(images_dimensions: BTreeMap<String, DimensionEntry>, now: DateTime<Utc>) -> Self {
        Self {
            version: CATALOG_VERSION.to_string(),
            last_update: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            images_dimensions,
        }
    }
}

/// Picks a ratio for `code` from the probe result.
pub fn dimensions_for(code: &str, probed: &Result<ImageMeta, ImageFetchFailed>) -> DimensionEntry {
    let Ok(meta) = probed else {
        return DimensionEntry::fallback();
    };

    let is_image = meta
        .content_type
        .as_deref()
        .is_some_and(|t| t.starts_with("image/"));
    match meta.content_length {
        Some(len) if is_image && len > 0 => DimensionEntry::from_ratio(size_bucket(len)),
        _ => DimensionEntry::from_ratio(hashed_ratio(code)),
    }
}

fn size_bucket(len: u64) -> f64 {
    if len < SMALL_IMAGE_BYTES {
        1.0
    } else if len > LARGE_IMAGE_BYTES {
        16.0 / 9.0
    } else {
        4.0 / 3.0
    }
}

/// Stable pseudo-random choice among [`COMMON_RATIOS`].
fn hashed_ratio(code: &str) -> f64 {
    let digest = Sha256::digest(code.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    let idx = u64::from_be_bytes(bytes) % COMMON_RATIOS.len() as u64;
    COMMON_RATIOS[idx as usize]
}

/// Probes every image with at most `workers` requests in flight, each bounded
/// by `timeout`, and returns one entry per product code.
pub async fn enrich<P: MetadataProbe + 'static>(
    probe: Arc<P>,
    images: &BTreeMap<String, String>,
    workers: usize,
    timeout: Duration,
) -> BTreeMap<String, DimensionEntry> {
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let mut tasks = Vec::with_capacity(images.len());

    for (code, file_id) in images {
        let sem = semaphore.clone();
        let probe = probe.clone();
        let task_code = code.clone();
        let file_id = file_id.clone();

        let span = tracing::debug_span!("probe_image", code = %code, file_id = %file_id);
        let task = tokio::spawn(
            async move {
                let Ok(_permit) = sem.acquire_owned().await else {
                    return DimensionEntry::fallback();
                };
                let probed = match tokio::time::timeout(timeout, probe.probe(&file_id)).await {
                    Ok(result) => result,
                    Err(_) => Err(ImageFetchFailed(format!("timed out after {timeout:?}"))),
                };
                if let Err(e) = &probed {
                    debug!(error = %e, "Using default ratio");
                }
                dimensions_for(&task_code, &probed)
            }
            .instrument(span),
        );
        tasks.push((code.clone(), task));
    }

    let mut out = BTreeMap::new();
    for (code, task) in tasks {
        let entry = task.await.unwrap_or_else(|e| {
            warn!(code = %code, error = %e, "Image task did not finish");
            DimensionEntry::fallback()
        });
        out.insert(code, entry);
    }
    out
}

/// Reads a previously written image catalog.
pub fn read_catalog(path: &Path) -> Result<ImageCatalog> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let catalog: ImageCatalog = serde_json::from_str(&content)
        .with_context(|| format!("parsing image catalog {}", path.display()))?;
    info!(images = catalog.images.len(), "Image catalog loaded");
    Ok(catalog)
}
