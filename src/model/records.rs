use chrono::{DateTime, Utc};
use serde::Serialize;

/// Declares a closed set of GBFS string literals with lookup in both directions.
macro_rules! literal_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $lit:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        pub enum $name {
            $(#[serde(rename = $lit)] $variant),+
        }

        impl $name {
            pub const LITERALS: &'static [&'static str] = &[$($lit),+];

            pub fn parse(s: &str) -> Option<Self> {
                match s {
                    $($lit => Some($name::$variant),)+
                    _ => None,
                }
            }

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $lit,)+
                }
            }
        }
    };
}

literal_enum!(
    /// Payment methods accepted at a station.
    RentalMethod {
        Key => "KEY",
        CreditCard => "CREDITCARD",
        PayPass => "PAYPASS",
        ApplePay => "APPLEPAY",
        AndroidPay => "ANDROIDPAY",
        TransitCard => "TRANSITCARD",
        AccountNumber => "ACCOUNTNUMBER",
        Phone => "PHONE",
    }
);

literal_enum!(
    UserType {
        Member => "member",
        Nonmember => "nonmember",
    }
);

literal_enum!(
    Day {
        Sun => "sun",
        Mon => "mon",
        Tue => "tue",
        Wed => "wed",
        Thu => "thu",
        Fri => "fri",
        Sat => "sat",
    }
);

literal_enum!(
    AlertType {
        SystemClosure => "SYSTEM_CLOSURE",
        StationClosure => "STATION_CLOSURE",
        StationMove => "STATION_MOVE",
        Other => "OTHER",
    }
);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemInformation {
    pub system_id: String,
    pub language: String,
    pub name: String,
    pub short_name: Option<String>,
    pub operator: Option<String>,
    pub url: Option<String>,
    pub purchase_url: Option<String>,
    pub start_date: Option<String>,
    pub phone_number: Option<String>,
    pub email: Option<String>,
    pub feed_contact_email: Option<String>,
    pub timezone: String,
    pub license_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Station {
    pub station_id: String,
    pub name: String,
    pub short_name: Option<String>,
    pub lat: f64,
    pub lon: f64,
    pub address: Option<String>,
    pub cross_street: Option<String>,
    pub region_id: Option<String>,
    pub post_code: Option<String>,
    pub rental_methods: Vec<RentalMethod>,
    pub capacity: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationStatus {
    pub station_id: String,
    pub num_bikes_available: u32,
    pub num_bikes_disabled: Option<u32>,
    pub num_docks_available: u32,
    pub num_docks_disabled: Option<u32>,
    pub is_installed: bool,
    pub is_renting: bool,
    pub is_returning: bool,
    pub last_reported: DateTime<Utc>,
}

/// A free-floating (or station-parked) vehicle from free_bike_status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BikeStatus {
    pub bike_id: String,
    pub lat: f64,
    pub lon: f64,
    pub is_reserved: bool,
    pub is_disabled: bool,
    pub station_id: Option<String>,
    pub pricing_plan_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Region {
    pub region_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricingPlan {
    pub plan_id: String,
    pub url: Option<String>,
    pub name: String,
    pub currency: String,
    pub price: f64,
    pub is_taxable: bool,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertTime {
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
}

impl AlertTime {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && self.end.is_none_or(|end| at <= end)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub alert_id: String,
    pub alert_type: AlertType,
    pub times: Vec<AlertTime>,
    pub station_ids: Vec<String>,
    pub region_ids: Vec<String>,
    pub url: Option<String>,
    pub summary: String,
    pub description: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl Alert {
    /// An alert without time ranges is in effect for as long as it is published.
    pub fn is_active(&self, at: DateTime<Utc>) -> bool {
        self.times.is_empty() || self.times.iter().any(|t| t.contains(at))
    }
}

/// One rental_hours entry. Times are kept as published (`HH:MM:SS`, hours may exceed 23).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HoursEntry {
    pub user_types: Vec<UserType>,
    pub days: Vec<Day>,
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalendarEntry {
    pub start_month: u8,
    pub start_day: u8,
    pub start_year: Option<i32>,
    pub end_month: u8,
    pub end_day: u8,
    pub end_year: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_literal_lookup() {
        assert_eq!(RentalMethod::parse("CREDITCARD"), Some(RentalMethod::CreditCard));
        assert_eq!(RentalMethod::parse("creditcard"), None);
        assert_eq!(Day::Wed.as_str(), "wed");
        assert_eq!(UserType::LITERALS, &["member", "nonmember"]);
    }

    #[test]
    fn test_alert_activity_window() {
        let t = |s| Utc.timestamp_opt(s, 0).unwrap();
        let alert = Alert {
            alert_id: "a1".into(),
            alert_type: AlertType::StationClosure,
            times: vec![AlertTime {
                start: t(100),
                end: Some(t(200)),
            }],
            station_ids: vec![],
            region_ids: vec![],
            url: None,
            summary: "closed".into(),
            description: None,
            last_updated: None,
        };

        assert!(!alert.is_active(t(99)));
        assert!(alert.is_active(t(150)));
        assert!(!alert.is_active(t(201)));
    }
}
