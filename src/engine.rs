//! The consumer-facing entry point: discover, schedule, serve snapshots.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::discovery;
use crate::error::StartError;
use crate::fetch::{FeedFetcher, HttpClient, auth};
use crate::linker::DanglingRef;
use crate::model::{FeedDescriptor, FeedKind};
use crate::scheduler::{FeedScheduler, SchedulerSettings};
use crate::stats::SystemStats;
use crate::store::{FeedState, HealthReport, Snapshot, SnapshotStore, Subscription};
use crate::validate::Violation;

type Fetcher = FeedFetcher<Box<dyn HttpClient>>;

/// A running ingestion of one GBFS system.
///
/// Discovery failures are fatal and surface from [`Engine::start`]; after
/// that, feed failures only show up in [`Engine::health`] and the last
/// accepted snapshot keeps being served.
pub struct Engine {
    language: String,
    feeds: Vec<FeedDescriptor>,
    store: Arc<SnapshotStore>,
    scheduler: FeedScheduler,
}

impl Engine {
    pub async fn start(config: Config) -> Result<Self, StartError> {
        let (fetcher, language, feeds) = bootstrap(&config).await?;
        let store = Arc::new(SnapshotStore::new());
        let scheduler = FeedScheduler::start(
            fetcher,
            &feeds,
            Arc::clone(&store),
            SchedulerSettings::from(&config),
        );

        Ok(Self {
            language,
            feeds,
            store,
            scheduler,
        })
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn feeds(&self) -> &[FeedDescriptor] {
        &self.feeds
    }

    pub fn snapshot(&self, kind: FeedKind) -> Option<Arc<Snapshot>> {
        self.store.get(kind)
    }

    pub fn subscribe(&self, kind: FeedKind) -> Subscription {
        self.store.subscribe(kind)
    }

    pub fn health(&self) -> Vec<HealthReport> {
        self.store.health()
    }

    pub fn stats(&self) -> SystemStats {
        SystemStats::from_store(&self.store, Utc::now())
    }

    /// Stops every feed task and ends open subscriptions.
    pub async fn shutdown(self) {
        self.scheduler.shutdown().await;
        self.store.close();
        info!("Engine stopped");
    }
}

/// Result of fetching every feed once.
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub discovery_url: String,
    pub language: String,
    pub feeds: Vec<FeedCheck>,
    pub stats: SystemStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedCheck {
    #[serde(flatten)]
    pub health: HealthReport,
    pub warnings: Vec<Violation>,
    pub dangling: Vec<DanglingRef>,
}

impl CheckReport {
    /// Whether every discovered feed was accepted.
    pub fn passed(&self) -> bool {
        self.feeds
            .iter()
            .all(|f| f.health.health.state == FeedState::Ready)
    }
}

/// Resolves discovery, fetches and validates every feed once, and reports.
pub async fn check(config: &Config) -> Result<CheckReport, StartError> {
    let (fetcher, language, feeds) = bootstrap(config).await?;
    let store = Arc::new(SnapshotStore::new());
    FeedScheduler::run_once(fetcher, &feeds, Arc::clone(&store), SchedulerSettings::from(config))
        .await;

    let checks = feeds
        .iter()
        .map(|feed| {
            let snapshot = store.get(feed.name);
            FeedCheck {
                health: store.feed_health(feed.name),
                warnings: snapshot.as_ref().map(|s| s.warnings.clone()).unwrap_or_default(),
                dangling: snapshot
                    .map(|s| s.dangling.references.clone())
                    .unwrap_or_default(),
            }
        })
        .collect();

    Ok(CheckReport {
        discovery_url: config.discovery_url.clone(),
        language,
        feeds: checks,
        stats: SystemStats::from_store(&store, Utc::now()),
    })
}

async fn bootstrap(
    config: &Config,
) -> Result<(Arc<Fetcher>, String, Vec<FeedDescriptor>), StartError> {
    config.validate()?;
    let client =
        auth::client_for(config.auth.as_ref()).map_err(|e| StartError::Client(format!("{e:#}")))?;
    let fetcher = FeedFetcher::from_config(client, config);

    let sets = discovery::resolve(&fetcher, &config.discovery_url).await?;
    let (language, feeds) =
        sets.select(config.preferred_language.as_deref(), config.language_fallback)?;
    info!(language, feeds = feeds.len(), "Selected feed set");

    Ok((Arc::new(fetcher), language.to_string(), feeds.to_vec()))
}
