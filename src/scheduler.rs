//! TTL-driven refresh of every discovered feed.
//!
//! One task per feed runs `fetch → validate → publish → wait` in a loop, so a
//! feed's fetches never overlap. A shared semaphore bounds in-flight fetches
//! across feeds. Shutdown flips a watch signal that every wait and fetch
//! selects on.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::config::Config;
use crate::fetch::FeedSource;
use crate::model::{FeedDescriptor, FeedKind};
use crate::store::{FeedState, SnapshotStore};
use crate::validate::{self, Violation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub max_concurrent_fetches: usize,
    pub degraded_threshold: u32,
    /// Minimum wait after a failed cycle.
    pub failure_wait: Duration,
}

impl From<&Config> for SchedulerSettings {
    fn from(config: &Config) -> Self {
        Self {
            max_concurrent_fetches: config.max_concurrent_fetches,
            degraded_threshold: config.degraded_threshold,
            failure_wait: config.failure_wait(),
        }
    }
}

/// Handle to the running feed tasks.
pub struct FeedScheduler {
    shutdown: watch::Sender<bool>,
    tasks: JoinSet<()>,
}

impl FeedScheduler {
    /// Spawns one refresh task per descriptor. Must be called inside a tokio runtime.
    pub fn start<S>(
        source: Arc<S>,
        feeds: &[FeedDescriptor],
        store: Arc<SnapshotStore>,
        settings: SchedulerSettings,
    ) -> Self
    where
        S: FeedSource + ?Sized + 'static,
    {
        let (shutdown, _) = watch::channel(false);
        let slots = Arc::new(Semaphore::new(settings.max_concurrent_fetches));
        let mut tasks = JoinSet::new();

        for feed in feeds {
            let task = FeedTask::new(feed, &source, &store, &slots, settings);
            let span = info_span!("feed", feed = %feed.name);
            tasks.spawn(task.run(shutdown.subscribe()).instrument(span));
        }

        info!(
            feeds = feeds.len(),
            max_concurrent_fetches = settings.max_concurrent_fetches,
            "Feed scheduler started"
        );
        Self { shutdown, tasks }
    }

    /// Runs a single cycle for every feed and returns once all have finished.
    pub async fn run_once<S>(
        source: Arc<S>,
        feeds: &[FeedDescriptor],
        store: Arc<SnapshotStore>,
        settings: SchedulerSettings,
    ) where
        S: FeedSource + ?Sized,
    {
        let slots = Arc::new(Semaphore::new(settings.max_concurrent_fetches));
        let cycles = feeds.iter().map(|feed| {
            let task = FeedTask::new(feed, &source, &store, &slots, settings);
            async move {
                let mut ttl = None;
                if let Some(Err(failure)) = task.cycle(&mut ttl).await {
                    task.record_failure(failure);
                }
            }
            .instrument(info_span!("feed", feed = %feed.name))
        });
        futures::future::join_all(cycles).await;
    }

    /// Cancels waits and in-flight fetches, then waits for every task to stop.
    pub async fn shutdown(mut self) {
        self.shutdown.send_replace(true);
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Feed task ended abnormally");
            }
        }
        info!("Feed scheduler stopped");
    }
}

/// Outcome of one cycle that did not publish.
struct Failure {
    error: String,
    violations: Vec<Violation>,
}

struct FeedTask<S: ?Sized> {
    kind: FeedKind,
    url: String,
    source: Arc<S>,
    store: Arc<SnapshotStore>,
    slots: Arc<Semaphore>,
    settings: SchedulerSettings,
}

impl<S: FeedSource + ?Sized> FeedTask<S> {
    fn new(
        feed: &FeedDescriptor,
        source: &Arc<S>,
        store: &Arc<SnapshotStore>,
        slots: &Arc<Semaphore>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            kind: feed.name,
            url: feed.url.clone(),
            source: Arc::clone(source),
            store: Arc::clone(store),
            slots: Arc::clone(slots),
            settings,
        }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut last_ttl: Option<Duration> = None;

        loop {
            let outcome = tokio::select! {
                biased;
                _ = shutdown.wait_for(|stop| *stop) => break,
                outcome = self.cycle(&mut last_ttl) => outcome,
            };
            let Some(outcome) = outcome else {
                break;
            };

            let wait = match outcome {
                Ok(ttl) => ttl,
                Err(failure) => {
                    let wait = last_ttl.unwrap_or_default().max(self.settings.failure_wait);
                    self.record_failure(failure);
                    wait
                }
            };
            if wait.is_zero() {
                continue;
            }

            self.set_state(FeedState::Waiting);
            debug!(wait_ms = wait.as_millis() as u64, "Waiting for next fetch");
            // A ttl past the timer's range means "not before shutdown".
            let wake = async {
                match Instant::now().checked_add(wait) {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending().await,
                }
            };
            tokio::select! {
                biased;
                _ = shutdown.wait_for(|stop| *stop) => break,
                _ = wake => {}
            }
        }

        self.set_state(FeedState::Stopped);
        debug!("Feed task stopped");
    }

    /// Runs one fetch/validate/publish pass.
    ///
    /// Returns the ttl to wait on success, or `None` if no fetch slot can
    /// ever be acquired.
    async fn cycle(&self, last_ttl: &mut Option<Duration>) -> Option<Result<Duration, Failure>> {
        let permit = self.slots.acquire().await.ok()?;
        self.set_state(FeedState::Fetching);
        let fetched = self.source.fetch(&self.url).await;
        drop(permit);

        let raw = match fetched {
            Ok(raw) => raw,
            Err(e) => {
                return Some(Err(Failure {
                    error: e.to_string(),
                    violations: Vec::new(),
                }));
            }
        };

        let ttl = Duration::from_secs(raw.ttl);
        *last_ttl = Some(ttl);

        self.set_state(FeedState::Validating);
        let validated = match validate::validate(self.kind, &raw.data) {
            Ok(validated) => validated,
            Err(violations) => {
                let hard = violations.iter().filter(|v| v.is_hard()).count();
                let error = match violations.iter().find(|v| v.is_hard()) {
                    Some(first) => format!("{hard} validation violation(s), first: {first}"),
                    None => "payload rejected".to_string(),
                };
                return Some(Err(Failure { error, violations }));
            }
        };
        for warning in &validated.warnings {
            debug!(warning = %warning, "Validation warning");
        }

        let envelope = raw.map(|_| validated.data);
        let records = envelope.data.len();
        let last_updated = envelope.last_updated;
        if let Err(stale) = self.store.accept(self.kind, envelope, validated.warnings) {
            return Some(Err(Failure {
                error: stale.to_string(),
                violations: Vec::new(),
            }));
        }

        self.store.update_health(self.kind, |h| {
            h.state = FeedState::Ready;
            if h.degraded {
                info!("Feed recovered");
            }
            h.degraded = false;
            h.consecutive_failures = 0;
            h.last_success = Some(Utc::now());
            h.last_error = None;
            h.last_violations.clear();
        });
        info!(records, last_updated = %last_updated, ttl = ttl.as_secs(), "Snapshot published");
        Some(Ok(ttl))
    }

    fn record_failure(&self, failure: Failure) {
        let threshold = self.settings.degraded_threshold;
        self.store.update_health(self.kind, |h| {
            h.state = FeedState::Failed;
            h.consecutive_failures += 1;
            if !h.degraded && h.consecutive_failures >= threshold {
                h.degraded = true;
                warn!(
                    consecutive_failures = h.consecutive_failures,
                    "Feed degraded, serving last accepted snapshot"
                );
            }
            warn!(
                consecutive_failures = h.consecutive_failures,
                error = %failure.error,
                "Feed cycle failed"
            );
            h.last_error = Some(failure.error);
            h.last_violations = failure.violations;
        });
    }

    fn set_state(&self, state: FeedState) {
        self.store.update_health(self.kind, |h| h.state = state);
    }
}
