//! Per-feed record readers.

use serde_json::Value;
use std::collections::HashSet;

use super::fields::Record;
use super::{Violation, ViolationKind};
use crate::model::{
    Alert, AlertTime, AlertType, BikeStatus, CalendarEntry, Day, FeedData, FeedKind, HoursEntry,
    PricingPlan, Region, RentalMethod, Station, StationStatus, SystemInformation, UserType,
};

const LAT: &str = "latitude in [-90, 90]";
const LON: &str = "longitude in [-180, 180]";

/// Reads `data` as a `kind` payload, recording violations into `out`.
pub(super) fn read(kind: FeedKind, data: &Value, out: &mut Vec<Violation>) -> Option<FeedData> {
    let mut root = Record::new(data, "data".to_string(), out)?;

    let data = match kind {
        FeedKind::SystemInformation => FeedData::SystemInformation(system_information(&mut root)?),
        FeedKind::StationInformation => {
            FeedData::StationInformation(list(&mut root, kind, "station_id", station)?)
        }
        FeedKind::StationStatus => {
            FeedData::StationStatus(list(&mut root, kind, "station_id", station_status)?)
        }
        FeedKind::FreeBikeStatus => FeedData::FreeBikeStatus(list(&mut root, kind, "bike_id", bike)?),
        FeedKind::SystemRegions => FeedData::SystemRegions(list(&mut root, kind, "region_id", region)?),
        FeedKind::SystemPricingPlans => {
            FeedData::SystemPricingPlans(list(&mut root, kind, "plan_id", plan)?)
        }
        FeedKind::SystemAlerts => FeedData::SystemAlerts(list(&mut root, kind, "alert_id", alert)?),
        FeedKind::SystemHours => {
            let mut seen = HashSet::new();
            FeedData::SystemHours(root.each("rental_hours", true, |r| hours(r, &mut seen))?)
        }
        FeedKind::SystemCalendar => FeedData::SystemCalendar(root.each("calendars", true, calendar)?),
    };
    Some(data)
}

/// Reads an id-keyed record array, then checks id uniqueness across it.
fn list<'v, T>(
    root: &mut Record<'_, 'v>,
    kind: FeedKind,
    id_key: &str,
    read: impl FnMut(&mut Record<'_, 'v>) -> Option<T>,
) -> Option<Vec<T>> {
    let key = kind.array_key()?;
    let records = root.each(key, true, read);
    root.unique_ids(key, id_key);
    records
}

fn system_information(r: &mut Record<'_, '_>) -> Option<SystemInformation> {
    let system_id = r.req_id("system_id");
    let language = r.req_str("language");
    let name = r.req_str("name");
    let short_name = r.opt_str("short_name");
    let operator = r.opt_str("operator");
    r.recommend("operator");
    let url = r.opt_str("url");
    r.recommend("url");
    let purchase_url = r.opt_str("purchase_url");
    let start_date = r.opt_str("start_date");
    let phone_number = r.opt_str("phone_number");
    let email = r.opt_str("email");
    let feed_contact_email = r.opt_str("feed_contact_email");
    let timezone = r.req_str("timezone");
    let license_url = r.opt_str("license_url");

    Some(SystemInformation {
        system_id: system_id?,
        language: language?,
        name: name?,
        short_name,
        operator,
        url,
        purchase_url,
        start_date,
        phone_number,
        email,
        feed_contact_email,
        timezone: timezone?,
        license_url,
    })
}

fn station(r: &mut Record<'_, '_>) -> Option<Station> {
    let station_id = r.req_id("station_id");
    let name = r.req_str("name");
    let short_name = r.opt_str("short_name");
    let lat = r.req_ranged("lat", -90.0, 90.0, LAT);
    let lon = r.req_ranged("lon", -180.0, 180.0, LON);
    let address = r.opt_str("address");
    let cross_street = r.opt_str("cross_street");
    let region_id = r.opt_str("region_id");
    let post_code = r.opt_str("post_code");
    let rental_methods = r.enum_array(
        "rental_methods",
        false,
        RentalMethod::parse,
        RentalMethod::LITERALS,
    );
    let capacity = r.opt_count("capacity");
    r.recommend("capacity");

    Some(Station {
        station_id: station_id?,
        name: name?,
        short_name,
        lat: lat?,
        lon: lon?,
        address,
        cross_street,
        region_id,
        post_code,
        rental_methods: rental_methods?,
        capacity,
    })
}

fn station_status(r: &mut Record<'_, '_>) -> Option<StationStatus> {
    let station_id = r.req_id("station_id");
    let num_bikes_available = r.req_count("num_bikes_available");
    let num_bikes_disabled = r.opt_count("num_bikes_disabled");
    let num_docks_available = r.req_count("num_docks_available");
    let num_docks_disabled = r.opt_count("num_docks_disabled");
    let is_installed = r.req_bit("is_installed");
    let is_renting = r.req_bit("is_renting");
    let is_returning = r.req_bit("is_returning");
    let last_reported = r.req_timestamp("last_reported");

    Some(StationStatus {
        station_id: station_id?,
        num_bikes_available: num_bikes_available?,
        num_bikes_disabled,
        num_docks_available: num_docks_available?,
        num_docks_disabled,
        is_installed: is_installed?,
        is_renting: is_renting?,
        is_returning: is_returning?,
        last_reported: last_reported?,
    })
}

fn bike(r: &mut Record<'_, '_>) -> Option<BikeStatus> {
    let bike_id = r.req_id("bike_id");
    let lat = r.req_ranged("lat", -90.0, 90.0, LAT);
    let lon = r.req_ranged("lon", -180.0, 180.0, LON);
    let is_reserved = r.req_bit("is_reserved");
    let is_disabled = r.req_bit("is_disabled");
    let station_id = r.opt_str("station_id");
    let pricing_plan_id = r.opt_str("pricing_plan_id");

    Some(BikeStatus {
        bike_id: bike_id?,
        lat: lat?,
        lon: lon?,
        is_reserved: is_reserved?,
        is_disabled: is_disabled?,
        station_id,
        pricing_plan_id,
    })
}

fn region(r: &mut Record<'_, '_>) -> Option<Region> {
    let region_id = r.req_id("region_id");
    let name = r.req_str("name");
    Some(Region {
        region_id: region_id?,
        name: name?,
    })
}

fn plan(r: &mut Record<'_, '_>) -> Option<PricingPlan> {
    let plan_id = r.req_id("plan_id");
    let url = r.opt_str("url");
    r.recommend("url");
    let name = r.req_str("name");
    let currency = r.req_str("currency").and_then(|c| {
        if c.len() == 3 && c.bytes().all(|b| b.is_ascii_uppercase()) {
            Some(c)
        } else {
            r.report(
                "currency",
                ViolationKind::InvalidFormat {
                    value: c,
                    expected: "ISO 4217 currency code",
                },
            );
            None
        }
    });
    let price = r.req_amount("price");
    let is_taxable = r.req_bit("is_taxable");
    let description = r.req_str("description");

    Some(PricingPlan {
        plan_id: plan_id?,
        url,
        name: name?,
        currency: currency?,
        price: price?,
        is_taxable: is_taxable?,
        description: description?,
    })
}

fn alert(r: &mut Record<'_, '_>) -> Option<Alert> {
    let alert_id = r.req_id("alert_id");
    let alert_type = r.req_enum("type", AlertType::parse, AlertType::LITERALS);
    let times = r.each("times", false, alert_time);
    let station_ids = r.str_array("station_ids", false);
    let region_ids = r.str_array("region_ids", false);
    let url = r.opt_str("url");
    let summary = r.req_str("summary");
    let description = r.opt_str("description");
    r.recommend("description");
    let last_updated = r.opt_timestamp("last_updated");

    Some(Alert {
        alert_id: alert_id?,
        alert_type: alert_type?,
        times: times?,
        station_ids: station_ids?,
        region_ids: region_ids?,
        url,
        summary: summary?,
        description,
        last_updated,
    })
}

fn alert_time(r: &mut Record<'_, '_>) -> Option<AlertTime> {
    let start = r.req_timestamp("start");
    let end = r.opt_timestamp("end");
    let start = start?;
    if end.is_some_and(|end| end < start) {
        r.flag(ViolationKind::InvertedTimeRange);
        return None;
    }
    Some(AlertTime { start, end })
}

/// Reads one rental_hours entry; `seen` carries (day, user_type) pairs across entries.
fn hours(r: &mut Record<'_, '_>, seen: &mut HashSet<(Day, UserType)>) -> Option<HoursEntry> {
    let user_types = r.enum_array("user_types", true, UserType::parse, UserType::LITERALS);
    let days = r.enum_array("days", true, Day::parse, Day::LITERALS);
    let start_time = r.req_service_time("start_time");
    let end_time = r.req_service_time("end_time");

    let (user_types, days) = (user_types?, days?);
    let mut clash = false;
    for &user_type in &user_types {
        for &day in &days {
            if !seen.insert((day, user_type)) {
                clash = true;
                r.flag(ViolationKind::DuplicateHours { day, user_type });
            }
        }
    }
    if clash {
        return None;
    }

    Some(HoursEntry {
        user_types,
        days,
        start_time: start_time?,
        end_time: end_time?,
    })
}

fn calendar(r: &mut Record<'_, '_>) -> Option<CalendarEntry> {
    const MONTH: &str = "month in 1..=12";
    const DAY: &str = "day in 1..=31";
    const YEAR: &str = "year in 0..=9999";

    let start_month = r.int_in("start_month", 1, 12, true, MONTH);
    let start_day = r.int_in("start_day", 1, 31, true, DAY);
    let start_year = r.int_in("start_year", 0, 9999, false, YEAR);
    let end_month = r.int_in("end_month", 1, 12, true, MONTH);
    let end_day = r.int_in("end_day", 1, 31, true, DAY);
    let end_year = r.int_in("end_year", 0, 9999, false, YEAR);

    Some(CalendarEntry {
        start_month: start_month? as u8,
        start_day: start_day? as u8,
        start_year: start_year.map(|y| y as i32),
        end_month: end_month? as u8,
        end_day: end_day? as u8,
        end_year: end_year.map(|y| y as i32),
    })
}
