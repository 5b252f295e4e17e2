//! CLI entry point for the catalog feed synchronizer.
//!
//! `sync` refreshes the feed JSON files (remote first, local workbook on
//! failure), `dimensions` estimates image ratios for the image catalog and
//! `scan-drive` rebuilds the image catalog from a Drive folder listing.

use anyhow::{Context, Result, bail};
use catalog_sync::{
    config::{RemoteIds, SyncSettings},
    drive::{self, DriveLister},
    enrich::{HttpProbe, ImageDimensions, enrich, read_catalog},
    feed::{FeedKind, FeedRegistry, LocalSource},
    fetch::{
        BasicClient, HttpClient,
        auth::{ApiKey, UrlParam},
    },
    normalize::normalize_table,
    output::{log_summary, write_json},
    source::{SheetsSource, WorkbookSource},
    sync::{Orchestrator, output_path},
};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

const DIMENSIONS_FILE: &str = "image_dimensions.json";

#[derive(Parser)]
#[command(name = "catalog_sync")]
#[command(about = "Sync catalog feeds from spreadsheets into JSON", long_about = None)]
struct Cli {
    /// Directory holding the local fallback workbooks
    #[arg(long, global = true, default_value = "excel")]
    excel_dir: PathBuf,

    /// Directory the feed JSON files are written to
    #[arg(long, global = true, default_value = "json")]
    json_dir: PathBuf,

    /// File holding the remote sheet ids
    #[arg(long, global = true, default_value = "js/config.js")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync feeds, remote first with local fallback
    Sync {
        /// Feed to sync (repeatable); all feeds when omitted
        #[arg(short, long = "feed", value_parser = parse_feed)]
        feeds: Vec<FeedKind>,

        /// Timeout for each sheet request, in seconds
        #[arg(long, default_value_t = 20)]
        timeout_secs: u64,
    },
    /// Estimate display ratios for every image in the image catalog
    Dimensions {
        /// Maximum number of concurrent image requests
        #[arg(short, long, default_value_t = 8)]
        workers: usize,

        /// Timeout for each image request, in milliseconds
        #[arg(long, default_value_t = 5000)]
        timeout_ms: u64,
    },
    /// Rebuild the image catalog from a Drive folder listing
    ScanDrive {
        /// Drive folder id holding the product images
        #[arg(long)]
        folder: String,
    },
    /// List configured feeds
    Feeds,
}

fn parse_feed(s: &str) -> Result<FeedKind, String> {
    s.parse()
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/catalog_sync.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("catalog_sync.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    let mut settings = SyncSettings {
        excel_dir: cli.excel_dir,
        json_dir: cli.json_dir,
        ..SyncSettings::default()
    };
    if let Ok(url) = std::env::var("SHEETS_BASE_URL") {
        settings.sheets_url = url;
    }
    if let Ok(url) = std::env::var("IMAGE_BASE_URL") {
        settings.image_url = url;
    }

    match cli.command {
        Commands::Sync {
            feeds,
            timeout_secs,
        } => {
            settings.http_timeout = Duration::from_secs(timeout_secs);
            let registry = load_registry(&cli.config);
            sync(&settings, &registry, &feeds).await?;
        }
        Commands::Dimensions {
            workers,
            timeout_ms,
        } => {
            settings.workers = workers;
            settings.image_timeout = Duration::from_millis(timeout_ms);
            dimensions(&settings).await?;
        }
        Commands::ScanDrive { folder } => {
            let client = BasicClient::with_timeout(settings.http_timeout)?;
            if let Ok(token) = std::env::var("DRIVE_ACCESS_TOKEN") {
                let lister = DriveLister::new(ApiKey::bearer(client, &token)?);
                scan_drive(&lister, &folder, &settings.json_dir).await?;
            } else if let Ok(key) = std::env::var("DRIVE_API_KEY") {
                let lister = DriveLister::new(UrlParam::api_key(client, key));
                scan_drive(&lister, &folder, &settings.json_dir).await?;
            } else {
                bail!("set DRIVE_ACCESS_TOKEN or DRIVE_API_KEY to list Drive folders");
            }
        }
        Commands::Feeds => {
            let registry = load_registry(&cli.config);
            for feed in registry.feeds() {
                let local = match &feed.local {
                    LocalSource::None => "-".to_string(),
                    LocalSource::Sheet { file, .. } => settings.excel_dir.join(file).display().to_string(),
                    LocalSource::TabPerGroup { file, .. } => {
                        format!("{} (one tab per group)", settings.excel_dir.join(file).display())
                    }
                };
                println!(
                    "{:<16} remote={:<46} local={}",
                    feed.name(),
                    feed.remote_id.as_deref().unwrap_or("-"),
                    local
                );
            }
        }
    }

    Ok(())
}

/// Builds the registry. An unreadable config only disables the remote path.
fn load_registry(config: &Path) -> FeedRegistry {
    let ids = match RemoteIds::load(config) {
        Ok(ids) => {
            info!(path = %config.display(), sheets = ids.len(), "Remote sheet ids loaded");
            ids
        }
        Err(e) => {
            warn!(error = %e, "Remote sheets disabled, using local workbooks only");
            RemoteIds::default()
        }
    };
    FeedRegistry::from_remote_ids(&ids)
}

#[tracing::instrument(skip_all)]
async fn sync(settings: &SyncSettings, registry: &FeedRegistry, feeds: &[FeedKind]) -> Result<()> {
    let remote = SheetsSource::new(
        BasicClient::with_timeout(settings.http_timeout)?,
        &settings.sheets_url,
    );
    let local = WorkbookSource::new(&settings.excel_dir);
    let orchestrator = Orchestrator::new(&remote, &local, &settings.json_dir);

    let summary = orchestrator.run(&registry.select(feeds)).await;

    log_summary(&summary);
    println!("{summary}");
    Ok(())
}

#[tracing::instrument(skip_all, fields(workers = settings.workers))]
async fn dimensions(settings: &SyncSettings) -> Result<()> {
    let catalog = read_catalog(&output_path(&settings.json_dir, FeedKind::ImageCatalog))?;

    let probe = Arc::new(HttpProbe::new(
        BasicClient::with_timeout(settings.image_timeout)?,
        &settings.image_url,
    ));
    let entries = enrich(
        probe,
        &catalog.images,
        settings.workers,
        settings.image_timeout,
    )
    .await;

    let path = settings.json_dir.join(DIMENSIONS_FILE);
    let count = entries.len();
    write_json(&path, &ImageDimensions::new(entries, Utc::now()))?;
    info!(path = %path.display(), images = count, "Image dimensions written");
    Ok(())
}

#[tracing::instrument(skip(lister, json_dir))]
async fn scan_drive<C: HttpClient>(
    lister: &DriveLister<C>,
    folder: &str,
    json_dir: &Path,
) -> Result<()> {
    let files = lister.list_images(folder).await?;
    let normalized = normalize_table(FeedKind::ImageCatalog, &drive::to_table(&files), Utc::now())
        .context("building image catalog from listing")?;

    let path = output_path(json_dir, FeedKind::ImageCatalog);
    write_json(&path, &normalized.output)?;
    info!(
        path = %path.display(),
        images = normalized.output.len(),
        skipped = normalized.skipped,
        "Image catalog written from Drive listing"
    );
    Ok(())
}
