//! CLI entry point for gbfs_watch.
//!
//! Provides subcommands for inspecting a system's auto-discovery document,
//! checking every feed once, and watching a system continuously.

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use gbfs_watch::config::Config;
use gbfs_watch::discovery::FeedSets;
use gbfs_watch::engine::{self, Engine};
use gbfs_watch::fetch::{BasicClient, FeedFetcher};
use gbfs_watch::output::{HealthRecord, append_records, print_json, print_pretty};
use gbfs_watch::store::FeedState;
use std::ffi::OsStr;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Rolling JSON log used when `LOG_FILE_PATH` is unset.
const DEFAULT_LOG_FILE: &str = "logs/gbfs_watch.log";
/// Floor for the stderr layer, raised further by `RUST_LOG`.
const STDERR_LEVEL: &str = "info";
/// Floor for the JSON file layer, raised further by `RUST_LOG_JSON`.
const FILE_LEVEL: &str = "debug";

#[derive(Parser)]
#[command(name = "gbfs_watch")]
#[command(about = "A tool to ingest and validate GBFS bikeshare feeds", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the languages and feeds of an auto-discovery document
    Discover {
        /// URL of gbfs.json
        #[arg(value_name = "URL")]
        url: String,
    },
    /// Fetch and validate every feed once, printing a JSON report
    Check {
        /// URL of gbfs.json
        #[arg(value_name = "URL")]
        url: String,

        /// Preferred feed language
        #[arg(short, long)]
        language: Option<String>,
    },
    /// Keep every feed fresh until Ctrl+C, reporting health periodically
    Watch {
        /// JSON config file
        #[arg(short, long)]
        config: Option<String>,

        /// URL of gbfs.json (overrides config)
        #[arg(short, long)]
        url: Option<String>,

        /// Preferred feed language (overrides config)
        #[arg(short, long)]
        language: Option<String>,

        /// Maximum number of concurrent feed fetches (overrides config)
        #[arg(long)]
        concurrency: Option<usize>,

        /// Seconds between health reports
        #[arg(short = 'r', long, default_value_t = 60)]
        report_every: u64,

        /// CSV file to append health rows to
        #[arg(long)]
        health_csv: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    let _log_guard = init_logging()?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Discover { url } => discover(&url).await?,
        Commands::Check { url, language } => {
            let mut config = Config::default().with_env()?;
            config.discovery_url = url;
            if language.is_some() {
                config.preferred_language = language;
            }

            let report = engine::check(&config).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);

            if !report.passed() {
                let failed = report
                    .feeds
                    .iter()
                    .filter(|f| f.health.health.state != FeedState::Ready)
                    .count();
                bail!("{failed} of {} feed(s) failed validation or fetch", report.feeds.len());
            }
        }
        Commands::Watch {
            config,
            url,
            language,
            concurrency,
            report_every,
            health_csv,
        } => {
            let mut config = match config {
                Some(path) => Config::load(&path).with_context(|| format!("loading {path}"))?,
                None => Config::default(),
            }
            .with_env()?;
            if let Some(url) = url {
                config.discovery_url = url;
            }
            if language.is_some() {
                config.preferred_language = language;
            }
            if let Some(n) = concurrency {
                config.max_concurrent_fetches = n;
            }

            watch(config, report_every, health_csv).await?;
        }
    }

    Ok(())
}

/// Installs a human-readable stderr layer and a daily-rolled JSON file layer.
///
/// The returned guard flushes the file writer on drop and must outlive the run.
fn init_logging() -> Result<WorkerGuard> {
    let log_file = std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| DEFAULT_LOG_FILE.to_string());
    let log_file = Path::new(&log_file);
    let dir = log_file
        .parent()
        .filter(|d| !d.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let name = log_file
        .file_name()
        .unwrap_or(OsStr::new("gbfs_watch.log"));

    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, name));

    let stderr = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive(STDERR_LEVEL.parse()?));

    let json = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(file_writer)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive(FILE_LEVEL.parse()?));

    tracing_subscriber::registry().with(stderr).with(json).init();
    Ok(guard)
}

/// Fetches an auto-discovery document and logs what it publishes.
#[tracing::instrument]
async fn discover(url: &str) -> Result<()> {
    let config = Config::default().with_env()?;
    let fetcher = FeedFetcher::from_config(BasicClient::new(), &config);
    let bytes = fetcher.fetch_bytes(url).await?;
    let sets = FeedSets::parse(&bytes, reqwest::Url::parse(url).ok().as_ref())?;

    for language in sets.languages() {
        let feeds = sets.get(language).unwrap_or_default();
        info!(language, feeds = feeds.len(), "Language");
        for feed in feeds {
            info!(language, feed = %feed.name, url = %feed.url, "Feed");
        }
    }
    Ok(())
}

/// Runs the engine until Ctrl+C, logging a summary every `report_every` seconds.
#[tracing::instrument(skip(config, health_csv), fields(url = %config.discovery_url))]
async fn watch(config: Config, report_every: u64, health_csv: Option<String>) -> Result<()> {
    let engine = Engine::start(config).await?;
    info!(
        language = engine.language(),
        feeds = engine.feeds().len(),
        report_every,
        "Watching. Press Ctrl+C to stop."
    );

    let mut ticker = tokio::time::interval(Duration::from_secs(report_every.max(1)));
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
            _ = ticker.tick() => report(&engine, health_csv.as_deref())?,
        }
    }

    engine.shutdown().await;
    Ok(())
}

fn report(engine: &Engine, health_csv: Option<&str>) -> Result<()> {
    let stats = engine.stats();
    info!(
        stations = stats.stations,
        renting_pct = stats.renting_pct(),
        bikes_available = stats.bikes_available,
        docks_available = stats.docks_available,
        free_bikes = stats.free_bikes,
        active_alerts = stats.active_alerts,
        dangling_references = stats.dangling_references,
        "System summary"
    );
    print_pretty(&stats);

    let now = Utc::now();
    let health = engine.health();
    let subscribed: Vec<_> = engine.feeds().iter().map(|f| f.name).collect();
    let mut records = Vec::new();
    for report in health.iter().filter(|h| subscribed.contains(&h.feed)) {
        if report.health.degraded {
            warn!(
                feed = %report.feed,
                consecutive_failures = report.health.consecutive_failures,
                last_error = report.health.last_error.as_deref().unwrap_or(""),
                "Feed degraded"
            );
            print_json(report)?;
        }
        records.push(HealthRecord::from_report(report, now));
    }

    if let Some(path) = health_csv {
        append_records(path, &records)?;
    }
    Ok(())
}
