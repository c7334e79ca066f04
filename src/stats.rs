use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{FeedData, FeedKind};
use crate::store::SnapshotStore;

/// A point-in-time summary of a bikeshare system, computed from the
/// currently published snapshots.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct SystemStats {
    pub timestamp: DateTime<Utc>,
    pub system_id: Option<String>,
    pub system_name: Option<String>,

    // stations
    pub stations: usize,
    pub stations_reporting: usize,
    pub stations_installed: usize,
    pub stations_renting: usize,
    pub stations_returning: usize,

    // vehicles and docks
    pub bikes_available: u64,
    pub bikes_disabled: u64,
    pub docks_available: u64,
    pub docks_disabled: u64,

    // free-floating bikes
    pub free_bikes: usize,
    pub free_bikes_reserved: usize,
    pub free_bikes_disabled: usize,
    pub free_bikes_docked: usize,

    pub regions: usize,
    pub plans: usize,
    pub alerts: usize,
    pub active_alerts: usize,

    pub dangling_references: usize,
}

impl SystemStats {
    /// Summarizes the store's current snapshots; alerts are evaluated at `at`.
    pub fn from_store(store: &SnapshotStore, at: DateTime<Utc>) -> Self {
        let mut s = SystemStats {
            timestamp: at,
            ..Default::default()
        };

        for kind in FeedKind::ALL {
            let Some(snapshot) = store.get(kind) else {
                continue;
            };
            s.dangling_references += snapshot.dangling.count();

            match snapshot.data() {
                FeedData::SystemInformation(info) => {
                    s.system_id = Some(info.system_id.clone());
                    s.system_name = Some(info.name.clone());
                }
                FeedData::StationInformation(stations) => s.stations = stations.len(),
                FeedData::StationStatus(statuses) => {
                    s.stations_reporting = statuses.len();
                    for st in statuses {
                        if st.is_installed {
                            s.stations_installed += 1;
                        }
                        if st.is_renting {
                            s.stations_renting += 1;
                        }
                        if st.is_returning {
                            s.stations_returning += 1;
                        }
                        s.bikes_available += u64::from(st.num_bikes_available);
                        s.docks_available += u64::from(st.num_docks_available);
                        s.bikes_disabled += u64::from(st.num_bikes_disabled.unwrap_or(0));
                        s.docks_disabled += u64::from(st.num_docks_disabled.unwrap_or(0));
                    }
                }
                FeedData::FreeBikeStatus(bikes) => {
                    s.free_bikes = bikes.len();
                    for b in bikes {
                        if b.is_reserved {
                            s.free_bikes_reserved += 1;
                        }
                        if b.is_disabled {
                            s.free_bikes_disabled += 1;
                        }
                        if b.station_id.is_some() {
                            s.free_bikes_docked += 1;
                        }
                    }
                }
                FeedData::SystemRegions(regions) => s.regions = regions.len(),
                FeedData::SystemPricingPlans(plans) => s.plans = plans.len(),
                FeedData::SystemAlerts(alerts) => {
                    s.alerts = alerts.len();
                    s.active_alerts = alerts.iter().filter(|a| a.is_active(at)).count();
                }
                FeedData::SystemHours(_) | FeedData::SystemCalendar(_) => {}
            }
        }

        s
    }

    pub fn pct(part: usize, total: usize) -> f64 {
        if total == 0 {
            0.0
        } else {
            (part as f64 / total as f64) * 100.0
        }
    }

    pub fn renting_pct(&self) -> f64 {
        Self::pct(self.stations_renting, self.stations_reporting)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Alert, AlertTime, AlertType, BikeStatus, FeedEnvelope, StationStatus};
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn publish(store: &SnapshotStore, data: FeedData) {
        let envelope = FeedEnvelope {
            last_updated: at(1000),
            ttl: 60,
            version: None,
            data,
            fetched_at: at(1000),
        };
        store.accept(envelope.data.kind(), envelope, vec![]).unwrap();
    }

    fn status(id: &str, bikes: u32, renting: bool, disabled: Option<u32>) -> StationStatus {
        StationStatus {
            station_id: id.into(),
            num_bikes_available: bikes,
            num_bikes_disabled: disabled,
            num_docks_available: 10 - bikes,
            num_docks_disabled: None,
            is_installed: true,
            is_renting: renting,
            is_returning: true,
            last_reported: at(900),
        }
    }

    fn bike(id: &str, reserved: bool, station: Option<&str>) -> BikeStatus {
        BikeStatus {
            bike_id: id.into(),
            lat: 45.5,
            lon: -73.5,
            is_reserved: reserved,
            is_disabled: false,
            station_id: station.map(Into::into),
            pricing_plan_id: None,
        }
    }

    fn alert(id: &str, start: i64, end: Option<i64>) -> Alert {
        Alert {
            alert_id: id.into(),
            alert_type: AlertType::Other,
            times: vec![AlertTime {
                start: at(start),
                end: end.map(at),
            }],
            station_ids: vec![],
            region_ids: vec![],
            url: None,
            summary: id.into(),
            description: None,
            last_updated: None,
        }
    }

    #[test]
    fn test_pct_with_zero_total() {
        assert_eq!(SystemStats::pct(10, 0), 0.0);
    }

    #[test]
    fn test_pct_normal_values() {
        assert_eq!(SystemStats::pct(50, 100), 50.0);
        assert_eq!(SystemStats::pct(1, 4), 25.0);
    }

    #[test]
    fn test_from_empty_store() {
        let stats = SystemStats::from_store(&SnapshotStore::new(), at(0));
        assert_eq!(stats.stations, 0);
        assert_eq!(stats.system_id, None);
        assert_eq!(stats.renting_pct(), 0.0);
    }

    #[test]
    fn test_station_totals() {
        let store = SnapshotStore::new();
        publish(
            &store,
            FeedData::StationStatus(vec![
                status("S1", 3, true, Some(1)),
                status("S2", 0, false, None),
            ]),
        );

        let stats = SystemStats::from_store(&store, at(1000));
        assert_eq!(stats.stations_reporting, 2);
        assert_eq!(stats.stations_renting, 1);
        assert_eq!(stats.bikes_available, 3);
        assert_eq!(stats.docks_available, 17);
        assert_eq!(stats.bikes_disabled, 1);
        assert_eq!(stats.renting_pct(), 50.0);
    }

    #[test]
    fn test_free_bikes_and_active_alerts() {
        let store = SnapshotStore::new();
        publish(
            &store,
            FeedData::FreeBikeStatus(vec![
                bike("b1", true, None),
                bike("b2", false, Some("S1")),
            ]),
        );
        publish(
            &store,
            FeedData::SystemAlerts(vec![
                alert("past", 0, Some(500)),
                alert("now", 900, Some(1100)),
                alert("open", 100, None),
                alert("future", 2000, None),
            ]),
        );

        let stats = SystemStats::from_store(&store, at(1000));
        assert_eq!(stats.free_bikes, 2);
        assert_eq!(stats.free_bikes_reserved, 1);
        assert_eq!(stats.free_bikes_docked, 1);
        assert_eq!(stats.alerts, 4);
        assert_eq!(stats.active_alerts, 2);
    }
}
