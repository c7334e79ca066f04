//! Structural and domain validation of feed payloads.
//!
//! Every violation in a document is collected, in document order, so a
//! publisher sees the complete picture from one run. Hard violations reject
//! the document; soft ones (missing recommended fields) are carried along as
//! warnings on the accepted snapshot.

mod feeds;
mod fields;

use serde::Serialize;
use serde_json::Value;
use std::fmt;

use crate::model::{Day, FeedData, FeedKind, UserType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Hard,
    Soft,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViolationKind {
    MissingField,
    MissingRecommended,
    WrongType {
        expected: &'static str,
    },
    InvalidEnum {
        value: String,
        allowed: &'static [&'static str],
    },
    OutOfRange {
        value: String,
        expected: &'static str,
    },
    InvalidFormat {
        value: String,
        expected: &'static str,
    },
    DuplicateId {
        id: String,
    },
    DuplicateHours {
        day: Day,
        user_type: UserType,
    },
    InvertedTimeRange,
}

impl ViolationKind {
    pub fn severity(&self) -> Severity {
        match self {
            ViolationKind::MissingRecommended => Severity::Soft,
            _ => Severity::Hard,
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolationKind::MissingField => f.write_str("missing required field"),
            ViolationKind::MissingRecommended => f.write_str("missing optional field"),
            ViolationKind::WrongType { expected } => write!(f, "expected {expected}"),
            ViolationKind::InvalidEnum { value, allowed } => {
                write!(f, "invalid value {value:?}, expected one of {}", allowed.join(", "))
            }
            ViolationKind::OutOfRange { value, expected } => {
                write!(f, "{value} out of range, expected {expected}")
            }
            ViolationKind::InvalidFormat { value, expected } => {
                write!(f, "invalid format {value:?}, expected {expected}")
            }
            ViolationKind::DuplicateId { id } => write!(f, "duplicate id: {id}"),
            ViolationKind::DuplicateHours { day, user_type } => write!(
                f,
                "duplicate hours for day {} and user type {}",
                day.as_str(),
                user_type.as_str()
            ),
            ViolationKind::InvertedTimeRange => f.write_str("end precedes start"),
        }
    }
}

/// A single problem found in a feed document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    /// JSON path of the offending value, e.g. `data.stations[3].lat`.
    pub path: String,
    #[serde(flatten)]
    pub kind: ViolationKind,
}

impl Violation {
    pub fn new(path: impl Into<String>, kind: ViolationKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    pub fn severity(&self) -> Severity {
        self.kind.severity()
    }

    pub fn is_hard(&self) -> bool {
        self.severity() == Severity::Hard
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.kind)
    }
}

/// An accepted payload plus the soft violations found in it.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedData {
    pub data: FeedData,
    pub warnings: Vec<Violation>,
}

/// Validates the `data` object of a `kind` feed.
///
/// # Errors
///
/// Returns every violation (hard and soft) when at least one is hard.
pub fn validate(kind: FeedKind, data: &Value) -> Result<ValidatedData, Vec<Violation>> {
    let mut violations = Vec::new();
    let parsed = feeds::read(kind, data, &mut violations);

    match parsed {
        Some(data) if !violations.iter().any(Violation::is_hard) => Ok(ValidatedData {
            data,
            warnings: violations,
        }),
        _ => {
            if violations.is_empty() {
                violations.push(Violation::new("data", ViolationKind::WrongType { expected: "object" }));
            }
            Err(violations)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn hard(violations: &[Violation]) -> Vec<String> {
        violations
            .iter()
            .filter(|v| v.is_hard())
            .map(|v| v.to_string())
            .collect()
    }

    fn status(id: &str) -> Value {
        json!({
            "station_id": id,
            "num_bikes_available": 3,
            "num_docks_available": 7,
            "is_installed": 1,
            "is_renting": 1,
            "is_returning": 1,
            "last_reported": 1700000000
        })
    }

    #[test]
    fn test_duplicate_station_status_id_rejected() {
        let data = json!({ "stations": [status("A"), status("A")] });
        let violations = validate(FeedKind::StationStatus, &data).unwrap_err();

        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind.to_string(), "duplicate id: A");
        assert_eq!(violations[0].path, "data.stations[1].station_id");
        assert!(violations[0].is_hard());
    }

    #[test]
    fn test_valid_station_status_accepted() {
        let data = json!({ "stations": [status("A"), status("B")] });
        let validated = validate(FeedKind::StationStatus, &data).unwrap();

        assert_eq!(validated.data.ids(), vec!["A", "B"]);
        assert!(validated.warnings.is_empty());
        let FeedData::StationStatus(records) = validated.data else {
            panic!("wrong variant");
        };
        assert!(records[0].is_renting);
        assert_eq!(records[0].num_docks_available, 7);
    }

    #[test]
    fn test_collects_every_violation() {
        let data = json!({ "stations": [
            {
                "station_id": "S1",
                "num_bikes_available": -1,
                "num_docks_available": "many",
                "is_installed": 2,
                "is_renting": 1,
                "is_returning": 1
            },
            status("S2")
        ]});
        let violations = validate(FeedKind::StationStatus, &data).unwrap_err();

        assert_eq!(
            hard(&violations),
            vec![
                "data.stations[0].num_bikes_available: -1 out of range, expected non-negative integer",
                "data.stations[0].num_docks_available: expected integer",
                "data.stations[0].is_installed: 2 out of range, expected 0 or 1",
                "data.stations[0].last_reported: missing required field",
            ]
        );
    }

    #[test]
    fn test_coordinates_and_rental_methods() {
        let data = json!({ "stations": [{
            "station_id": "S1",
            "name": "Main St",
            "lat": 91.0,
            "lon": -181.5,
            "rental_methods": ["KEY", "BITCOIN"],
            "capacity": 10
        }]});
        let violations = validate(FeedKind::StationInformation, &data).unwrap_err();

        assert_eq!(
            hard(&violations),
            vec![
                "data.stations[0].lat: 91 out of range, expected latitude in [-90, 90]",
                "data.stations[0].lon: -181.5 out of range, expected longitude in [-180, 180]",
                "data.stations[0].rental_methods[1]: invalid value \"BITCOIN\", expected one of KEY, CREDITCARD, PAYPASS, APPLEPAY, ANDROIDPAY, TRANSITCARD, ACCOUNTNUMBER, PHONE",
            ]
        );
    }

    #[test]
    fn test_missing_optional_field_is_soft() {
        let data = json!({ "stations": [{
            "station_id": "S1",
            "name": "Main St",
            "lat": 45.5,
            "lon": -73.6
        }]});
        let validated = validate(FeedKind::StationInformation, &data).unwrap();

        assert_eq!(validated.warnings.len(), 1);
        assert_eq!(validated.warnings[0].path, "data.stations[0].capacity");
        assert_eq!(validated.warnings[0].severity(), Severity::Soft);
    }

    #[test]
    fn test_hours_pairs_checked_across_entries() {
        let data = json!({ "rental_hours": [
            {"user_types": ["member"], "days": ["mon", "tue"], "start_time": "06:00:00", "end_time": "23:00:00"},
            {"user_types": ["nonmember"], "days": ["mon"], "start_time": "07:00:00", "end_time": "22:00:00"},
            {"user_types": ["member", "nonmember"], "days": ["tue"], "start_time": "00:00:00", "end_time": "25:00:00"}
        ]});
        let violations = validate(FeedKind::SystemHours, &data).unwrap_err();

        assert_eq!(
            hard(&violations),
            vec!["data.rental_hours[2]: duplicate hours for day tue and user type member"]
        );
    }

    #[test]
    fn test_hours_enum_and_time_format() {
        let data = json!({ "rental_hours": [
            {"user_types": ["guest"], "days": ["monday"], "start_time": "6am", "end_time": "23:00:00"}
        ]});
        let violations = validate(FeedKind::SystemHours, &data).unwrap_err();

        assert_eq!(violations.len(), 3);
        assert!(violations.iter().all(Violation::is_hard));
    }

    #[test]
    fn test_alert_time_range() {
        let data = json!({ "alerts": [
            {
                "alert_id": "a1",
                "type": "STATION_CLOSURE",
                "times": [{"start": 200, "end": 100}, {"start": 300}],
                "station_ids": ["S1"],
                "summary": "Closed",
                "description": "Station closed for repairs"
            },
            {
                "alert_id": "a2",
                "type": "PARADE",
                "summary": "Parade",
                "description": "Detours"
            }
        ]});
        let violations = validate(FeedKind::SystemAlerts, &data).unwrap_err();

        assert_eq!(
            hard(&violations),
            vec![
                "data.alerts[0].times[0]: end precedes start",
                "data.alerts[1].type: invalid value \"PARADE\", expected one of SYSTEM_CLOSURE, STATION_CLOSURE, STATION_MOVE, OTHER",
            ]
        );
    }

    #[test]
    fn test_system_information_object() {
        let data = json!({
            "system_id": "bixi",
            "language": "en",
            "name": "BIXI",
            "timezone": "America/Montreal",
            "operator": "BIXI Montreal",
            "url": "https://bixi.com"
        });
        let validated = validate(FeedKind::SystemInformation, &data).unwrap();
        let FeedData::SystemInformation(info) = validated.data else {
            panic!("wrong variant");
        };
        assert_eq!(info.system_id, "bixi");
        assert_eq!(info.timezone, "America/Montreal");
    }

    #[test]
    fn test_missing_array_rejected() {
        let violations = validate(FeedKind::FreeBikeStatus, &json!({})).unwrap_err();
        assert_eq!(hard(&violations), vec!["data.bikes: missing required field"]);
    }

    #[test]
    fn test_calendar_and_pricing_ranges() {
        let calendar = json!({ "calendars": [
            {"start_month": 13, "start_day": 1, "end_month": 11, "end_day": 32}
        ]});
        assert_eq!(
            validate(FeedKind::SystemCalendar, &calendar).unwrap_err().len(),
            2
        );

        let plans = json!({ "plans": [
            {"plan_id": "p1", "name": "Single", "currency": "USD", "price": "2.50", "is_taxable": 0, "description": "One ride", "url": "https://x"},
            {"plan_id": "p2", "name": "Bad", "currency": "dollars", "price": -1, "is_taxable": 0, "description": "?", "url": "https://x"}
        ]});
        let violations = validate(FeedKind::SystemPricingPlans, &plans).unwrap_err();
        assert_eq!(violations.len(), 2);
        assert!(violations.iter().all(|v| v.path.starts_with("data.plans[1]")));
    }

    #[test]
    fn test_validation_is_deterministic() {
        let data = json!({ "stations": [status("A"), status("A"), {"station_id": 5}] });
        assert_eq!(
            validate(FeedKind::StationStatus, &data),
            validate(FeedKind::StationStatus, &data)
        );
    }
}
