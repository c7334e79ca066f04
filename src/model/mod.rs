//! Typed GBFS data: feed kinds, descriptors, envelopes and normalized records.

mod records;

pub use records::{
    Alert, AlertTime, AlertType, BikeStatus, CalendarEntry, Day, HoursEntry, PricingPlan, Region,
    RentalMethod, Station, StationStatus, SystemInformation, UserType,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The nine document kinds a GBFS publisher exposes besides the discovery root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedKind {
    SystemInformation,
    StationInformation,
    StationStatus,
    FreeBikeStatus,
    SystemHours,
    SystemCalendar,
    SystemRegions,
    SystemPricingPlans,
    SystemAlerts,
}

impl FeedKind {
    pub const ALL: [FeedKind; 9] = [
        FeedKind::SystemInformation,
        FeedKind::StationInformation,
        FeedKind::StationStatus,
        FeedKind::FreeBikeStatus,
        FeedKind::SystemHours,
        FeedKind::SystemCalendar,
        FeedKind::SystemRegions,
        FeedKind::SystemPricingPlans,
        FeedKind::SystemAlerts,
    ];

    /// The feed name as it appears in auto-discovery documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedKind::SystemInformation => "system_information",
            FeedKind::StationInformation => "station_information",
            FeedKind::StationStatus => "station_status",
            FeedKind::FreeBikeStatus => "free_bike_status",
            FeedKind::SystemHours => "system_hours",
            FeedKind::SystemCalendar => "system_calendar",
            FeedKind::SystemRegions => "system_regions",
            FeedKind::SystemPricingPlans => "system_pricing_plans",
            FeedKind::SystemAlerts => "system_alerts",
        }
    }

    /// Key of the record array inside `data`, or `None` for object-shaped feeds.
    pub fn array_key(&self) -> Option<&'static str> {
        match self {
            FeedKind::SystemInformation => None,
            FeedKind::StationInformation | FeedKind::StationStatus => Some("stations"),
            FeedKind::FreeBikeStatus => Some("bikes"),
            FeedKind::SystemHours => Some("rental_hours"),
            FeedKind::SystemCalendar => Some("calendars"),
            FeedKind::SystemRegions => Some("regions"),
            FeedKind::SystemPricingPlans => Some("plans"),
            FeedKind::SystemAlerts => Some("alerts"),
        }
    }
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownFeedKind(pub String);

impl fmt::Display for UnknownFeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown feed kind: {}", self.0)
    }
}

impl std::error::Error for UnknownFeedKind {}

impl FromStr for FeedKind {
    type Err = UnknownFeedKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FeedKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| UnknownFeedKind(s.to_string()))
    }
}

/// One feed entry from auto-discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedDescriptor {
    pub name: FeedKind,
    pub url: String,
    pub language: String,
}

/// A fetched feed document with its publisher metadata.
///
/// Replaced wholesale on each accepted fetch, never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedEnvelope<T> {
    pub last_updated: DateTime<Utc>,
    pub ttl: u64,
    pub version: Option<String>,
    pub data: T,
    pub fetched_at: DateTime<Utc>,
}

impl<T> FeedEnvelope<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> FeedEnvelope<U> {
        FeedEnvelope {
            last_updated: self.last_updated,
            ttl: self.ttl,
            version: self.version,
            data: f(self.data),
            fetched_at: self.fetched_at,
        }
    }
}

/// Validated payload of one feed, one variant per [`FeedKind`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "feed", content = "records", rename_all = "snake_case")]
pub enum FeedData {
    SystemInformation(SystemInformation),
    StationInformation(Vec<Station>),
    StationStatus(Vec<StationStatus>),
    FreeBikeStatus(Vec<BikeStatus>),
    SystemHours(Vec<HoursEntry>),
    SystemCalendar(Vec<CalendarEntry>),
    SystemRegions(Vec<Region>),
    SystemPricingPlans(Vec<PricingPlan>),
    SystemAlerts(Vec<Alert>),
}

impl FeedData {
    pub fn kind(&self) -> FeedKind {
        match self {
            FeedData::SystemInformation(_) => FeedKind::SystemInformation,
            FeedData::StationInformation(_) => FeedKind::StationInformation,
            FeedData::StationStatus(_) => FeedKind::StationStatus,
            FeedData::FreeBikeStatus(_) => FeedKind::FreeBikeStatus,
            FeedData::SystemHours(_) => FeedKind::SystemHours,
            FeedData::SystemCalendar(_) => FeedKind::SystemCalendar,
            FeedData::SystemRegions(_) => FeedKind::SystemRegions,
            FeedData::SystemPricingPlans(_) => FeedKind::SystemPricingPlans,
            FeedData::SystemAlerts(_) => FeedKind::SystemAlerts,
        }
    }

    /// Record identifiers in document order. Empty for feeds without ids.
    pub fn ids(&self) -> Vec<&str> {
        match self {
            FeedData::StationInformation(v) => v.iter().map(|r| r.station_id.as_str()).collect(),
            FeedData::StationStatus(v) => v.iter().map(|r| r.station_id.as_str()).collect(),
            FeedData::FreeBikeStatus(v) => v.iter().map(|r| r.bike_id.as_str()).collect(),
            FeedData::SystemRegions(v) => v.iter().map(|r| r.region_id.as_str()).collect(),
            FeedData::SystemPricingPlans(v) => v.iter().map(|r| r.plan_id.as_str()).collect(),
            FeedData::SystemAlerts(v) => v.iter().map(|r| r.alert_id.as_str()).collect(),
            FeedData::SystemInformation(_)
            | FeedData::SystemHours(_)
            | FeedData::SystemCalendar(_) => Vec::new(),
        }
    }

    /// Number of records carried by the feed (1 for system_information).
    pub fn len(&self) -> usize {
        match self {
            FeedData::SystemInformation(_) => 1,
            FeedData::StationInformation(v) => v.len(),
            FeedData::StationStatus(v) => v.len(),
            FeedData::FreeBikeStatus(v) => v.len(),
            FeedData::SystemHours(v) => v.len(),
            FeedData::SystemCalendar(v) => v.len(),
            FeedData::SystemRegions(v) => v.len(),
            FeedData::SystemPricingPlans(v) => v.len(),
            FeedData::SystemAlerts(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
