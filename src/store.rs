//! Latest accepted snapshot and health per feed.
//!
//! Each feed's snapshot lives in a `watch` channel holding an `Arc`, so a
//! publish is a single pointer swap: readers clone the `Arc` and never see a
//! half-built value. Accepting writers are serialized so dangling-reference
//! metadata is always computed against the latest payloads.

use chrono::{DateTime, Utc};
use futures::Stream;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::linker::{self, DanglingReport};
use crate::model::{FeedData, FeedEnvelope, FeedKind};
use crate::validate::Violation;

/// Phase of a feed's refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedState {
    #[default]
    Idle,
    Fetching,
    Validating,
    Ready,
    Failed,
    Waiting,
    Stopped,
}

/// The accepted state of one feed.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub kind: FeedKind,
    pub envelope: Arc<FeedEnvelope<FeedData>>,
    /// Soft violations found when the payload was accepted.
    pub warnings: Vec<Violation>,
    pub dangling: DanglingReport,
}

impl Snapshot {
    pub fn data(&self) -> &FeedData {
        &self.envelope.data
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.envelope.last_updated
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeedHealth {
    pub state: FeedState,
    /// Set after `degradedThreshold` consecutive failed cycles; cleared by a success.
    pub degraded: bool,
    pub last_success: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    /// Violations from the most recent rejected payload.
    pub last_violations: Vec<Violation>,
}

/// Health of one feed as reported to consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub feed: FeedKind,
    #[serde(flatten)]
    pub health: FeedHealth,
    pub dangling_reference_count: usize,
    pub last_updated: Option<DateTime<Utc>>,
}

/// A payload whose `last_updated` is older than the published one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} last_updated went backwards: published {published}, offered {offered}")]
pub struct StaleSnapshot {
    pub kind: FeedKind,
    pub published: DateTime<Utc>,
    pub offered: DateTime<Utc>,
}

struct Entry {
    snapshot: watch::Sender<Option<Arc<Snapshot>>>,
    health: watch::Sender<FeedHealth>,
}

impl Entry {
    fn new() -> Self {
        Self {
            snapshot: watch::Sender::new(None),
            health: watch::Sender::new(FeedHealth::default()),
        }
    }
}

pub struct SnapshotStore {
    entries: [Entry; 9],
    accept_lock: Mutex<()>,
    closed: watch::Sender<bool>,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self {
            entries: FeedKind::ALL.map(|_| Entry::new()),
            accept_lock: Mutex::new(()),
            closed: watch::Sender::new(false),
        }
    }

    fn entry(&self, kind: FeedKind) -> &Entry {
        &self.entries[kind as usize]
    }

    /// Latest accepted snapshot, or `None` before the first accepted fetch.
    pub fn get(&self, kind: FeedKind) -> Option<Arc<Snapshot>> {
        self.entry(kind).snapshot.borrow().clone()
    }

    /// Subscribes to snapshots published after this call.
    ///
    /// The subscription ends when the store is closed; subscribe again to
    /// restart from the current point.
    pub fn subscribe(&self, kind: FeedKind) -> Subscription {
        Subscription {
            rx: self.entry(kind).snapshot.subscribe(),
            closed: self.closed.subscribe(),
        }
    }

    /// Publishes a validated payload, replacing the previous snapshot.
    ///
    /// Dangling references are computed for the new snapshot and refreshed
    /// on every feed that references `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`StaleSnapshot`] and keeps the current snapshot when
    /// `last_updated` is older than the published one.
    pub fn accept(
        &self,
        kind: FeedKind,
        envelope: FeedEnvelope<FeedData>,
        warnings: Vec<Violation>,
    ) -> Result<Arc<Snapshot>, StaleSnapshot> {
        let _guard = self.accept_lock.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(current) = self.get(kind) {
            if envelope.last_updated < current.last_updated() {
                let stale = StaleSnapshot {
                    kind,
                    published: current.last_updated(),
                    offered: envelope.last_updated,
                };
                warn!(feed = %kind, error = %stale, "Anomaly: feed went back in time, keeping current snapshot");
                return Err(stale);
            }
        }

        let dangling = if linker::is_linked(kind) {
            let current = self.published();
            linker::dangling(&envelope.data, |k| current.get(&k).map(|s| s.data()))
        } else {
            DanglingReport::default()
        };
        if !dangling.is_empty() {
            debug!(feed = %kind, dangling = dangling.count(), "Dangling references");
        }

        let snapshot = Arc::new(Snapshot {
            kind,
            envelope: Arc::new(envelope),
            warnings,
            dangling,
        });
        self.entry(kind).snapshot.send_replace(Some(Arc::clone(&snapshot)));

        for dependent in linker::dependents(kind) {
            self.relink(dependent);
        }
        Ok(snapshot)
    }

    /// Recomputes `kind`'s dangling report against the current payloads.
    fn relink(&self, kind: FeedKind) {
        let Some(snapshot) = self.get(kind) else {
            return;
        };
        let current = self.published();
        let dangling = linker::dangling(snapshot.data(), |k| current.get(&k).map(|s| s.data()));
        if dangling == snapshot.dangling {
            return;
        }

        debug!(feed = %kind, dangling = dangling.count(), "Dangling references updated");
        let updated = Snapshot {
            dangling,
            ..Snapshot::clone(&snapshot)
        };
        self.entry(kind).snapshot.send_replace(Some(Arc::new(updated)));
    }

    fn published(&self) -> HashMap<FeedKind, Arc<Snapshot>> {
        FeedKind::ALL
            .into_iter()
            .filter_map(|k| self.get(k).map(|s| (k, s)))
            .collect()
    }

    pub fn update_health(&self, kind: FeedKind, f: impl FnOnce(&mut FeedHealth)) {
        self.entry(kind).health.send_modify(f);
    }

    pub fn feed_health(&self, kind: FeedKind) -> HealthReport {
        let health = self.entry(kind).health.borrow().clone();
        let snapshot = self.get(kind);
        HealthReport {
            feed: kind,
            health,
            dangling_reference_count: snapshot.as_ref().map_or(0, |s| s.dangling.count()),
            last_updated: snapshot.map(|s| s.last_updated()),
        }
    }

    /// Health of every feed kind, in [`FeedKind::ALL`] order.
    pub fn health(&self) -> Vec<HealthReport> {
        FeedKind::ALL.into_iter().map(|k| self.feed_health(k)).collect()
    }

    /// Ends every open subscription. Snapshots stay readable.
    pub fn close(&self) {
        self.closed.send_replace(true);
    }
}

/// Snapshots of one feed, emitted as they are published.
///
/// Updates published faster than the subscriber polls are coalesced: the
/// subscriber always observes the latest snapshot.
pub struct Subscription {
    rx: watch::Receiver<Option<Arc<Snapshot>>>,
    closed: watch::Receiver<bool>,
}

impl Subscription {
    /// Next published snapshot, or `None` once the store is closed.
    ///
    /// A snapshot published before the close is still delivered.
    pub async fn next(&mut self) -> Option<Arc<Snapshot>> {
        loop {
            if self.rx.has_changed().unwrap_or(false) {
                if let Some(snapshot) = self.rx.borrow_and_update().clone() {
                    return Some(snapshot);
                }
            }
            if *self.closed.borrow_and_update() {
                return None;
            }
            tokio::select! {
                changed = self.rx.changed() => {
                    changed.ok()?;
                    if let Some(snapshot) = self.rx.borrow_and_update().clone() {
                        return Some(snapshot);
                    }
                }
                closed = self.closed.changed() => closed.ok()?,
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = Arc<Snapshot>> {
        futures::stream::unfold(self, |mut sub| async move {
            let snapshot = sub.next().await?;
            Some((snapshot, sub))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Region, StationStatus};
    use chrono::TimeZone;
    use futures::StreamExt;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn envelope(last_updated: i64, data: FeedData) -> FeedEnvelope<FeedData> {
        FeedEnvelope {
            last_updated: at(last_updated),
            ttl: 60,
            version: None,
            data,
            fetched_at: at(last_updated),
        }
    }

    fn regions(ids: &[&str]) -> FeedData {
        FeedData::SystemRegions(
            ids.iter()
                .map(|id| Region {
                    region_id: id.to_string(),
                    name: id.to_string(),
                })
                .collect(),
        )
    }

    fn statuses(ids: &[&str]) -> FeedData {
        FeedData::StationStatus(
            ids.iter()
                .map(|id| StationStatus {
                    station_id: id.to_string(),
                    num_bikes_available: 0,
                    num_bikes_disabled: None,
                    num_docks_available: 0,
                    num_docks_disabled: None,
                    is_installed: true,
                    is_renting: true,
                    is_returning: true,
                    last_reported: at(0),
                })
                .collect(),
        )
    }

    fn stations(ids: &[&str]) -> FeedData {
        FeedData::StationInformation(
            ids.iter()
                .map(|id| crate::model::Station {
                    station_id: id.to_string(),
                    name: id.to_string(),
                    short_name: None,
                    lat: 0.0,
                    lon: 0.0,
                    address: None,
                    cross_street: None,
                    region_id: None,
                    post_code: None,
                    rental_methods: vec![],
                    capacity: None,
                })
                .collect(),
        )
    }

    #[test]
    fn test_get_before_first_accept() {
        let store = SnapshotStore::new();
        assert!(store.get(FeedKind::StationStatus).is_none());
        let report = store.feed_health(FeedKind::StationStatus);
        assert_eq!(report.health.state, FeedState::Idle);
        assert_eq!(report.last_updated, None);
    }

    #[test]
    fn test_last_updated_never_regresses() {
        let store = SnapshotStore::new();
        store
            .accept(FeedKind::SystemRegions, envelope(200, regions(&["a"])), vec![])
            .unwrap();

        let err = store
            .accept(FeedKind::SystemRegions, envelope(100, regions(&["b"])), vec![])
            .unwrap_err();
        assert_eq!(err.published, at(200));

        let current = store.get(FeedKind::SystemRegions).unwrap();
        assert_eq!(current.last_updated(), at(200));
        assert_eq!(current.data().ids(), vec!["a"]);

        // Equal timestamps are accepted.
        store
            .accept(FeedKind::SystemRegions, envelope(200, regions(&["c"])), vec![])
            .unwrap();
        assert_eq!(store.get(FeedKind::SystemRegions).unwrap().data().ids(), vec!["c"]);
    }

    #[test]
    fn test_dangling_tracked_once_both_feeds_exist() {
        let store = SnapshotStore::new();
        store
            .accept(FeedKind::StationStatus, envelope(10, statuses(&["S1", "S2"])), vec![])
            .unwrap();
        assert_eq!(store.feed_health(FeedKind::StationStatus).dangling_reference_count, 0);

        store
            .accept(FeedKind::StationInformation, envelope(10, stations(&["S2"])), vec![])
            .unwrap();

        let status = store.get(FeedKind::StationStatus).unwrap();
        assert_eq!(status.dangling.count(), 1);
        assert_eq!(status.dangling.references[0].id, "S1");
        assert!(store.get(FeedKind::StationInformation).is_some());

        store
            .accept(FeedKind::StationInformation, envelope(20, stations(&["S1", "S2"])), vec![])
            .unwrap();
        assert_eq!(store.feed_health(FeedKind::StationStatus).dangling_reference_count, 0);
    }

    #[test]
    fn test_unlinked_feed_leaves_other_snapshots_alone() {
        let store = SnapshotStore::new();
        store
            .accept(FeedKind::StationStatus, envelope(10, statuses(&["S1"])), vec![])
            .unwrap();
        let before = store.get(FeedKind::StationStatus).unwrap();

        let hours = store
            .accept(FeedKind::SystemHours, envelope(10, FeedData::SystemHours(vec![])), vec![])
            .unwrap();
        assert!(hours.dangling.is_empty());
        assert!(Arc::ptr_eq(&before, &store.get(FeedKind::StationStatus).unwrap()));
    }

    #[test]
    fn test_health_updates() {
        let store = SnapshotStore::new();
        store.update_health(FeedKind::SystemAlerts, |h| {
            h.state = FeedState::Failed;
            h.consecutive_failures = 2;
        });
        let health = store.health();
        assert_eq!(health.len(), 9);
        let alerts = health.iter().find(|h| h.feed == FeedKind::SystemAlerts).unwrap();
        assert_eq!(alerts.health.consecutive_failures, 2);
    }

    #[tokio::test]
    async fn test_subscription_sees_updates_and_ends_on_close() {
        let store = Arc::new(SnapshotStore::new());
        let mut sub = store.subscribe(FeedKind::SystemRegions);

        let publisher = Arc::clone(&store);
        tokio::spawn(async move {
            publisher
                .accept(FeedKind::SystemRegions, envelope(1, regions(&["a"])), vec![])
                .unwrap();
        });

        let first = sub.next().await.unwrap();
        assert_eq!(first.data().ids(), vec!["a"]);

        store.close();
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn test_waiting_subscriber_is_woken_by_publish() {
        let store = Arc::new(SnapshotStore::new());
        let mut sub = store.subscribe(FeedKind::SystemRegions);

        let publisher = Arc::clone(&store);
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            publisher
                .accept(FeedKind::SystemRegions, envelope(1, regions(&["a"])), vec![])
                .unwrap();
            publisher
                .accept(FeedKind::SystemRegions, envelope(2, regions(&["b"])), vec![])
                .unwrap();
        });

        let next = tokio::time::timeout(std::time::Duration::from_secs(2), sub.next())
            .await
            .expect("subscriber woken by publish")
            .unwrap();
        assert!(next.last_updated() >= at(1));
        store.close();
    }

    #[tokio::test]
    async fn test_subscription_as_stream_is_restartable() {
        let store = SnapshotStore::new();
        store
            .accept(FeedKind::SystemRegions, envelope(1, regions(&["a"])), vec![])
            .unwrap();

        let stream = store.subscribe(FeedKind::SystemRegions).into_stream();
        store
            .accept(FeedKind::SystemRegions, envelope(2, regions(&["b"])), vec![])
            .unwrap();
        store.close();

        let seen: Vec<_> = stream.collect().await;
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].last_updated(), at(2));

        // A fresh subscription after close ends immediately.
        assert!(store.subscribe(FeedKind::SystemRegions).next().await.is_none());
    }
}
