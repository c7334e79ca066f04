//! Referential integrity between feeds.
//!
//! Dangling references are advisory: they are reported on the referencing
//! feed's snapshot and never block publication, since publishers update each
//! feed on its own cadence and feeds are routinely minutes apart.

use serde::Serialize;
use std::collections::HashSet;

use crate::model::{FeedData, FeedKind};

/// A field in one feed that names ids defined by another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relation {
    pub from: FeedKind,
    pub field: &'static str,
    pub to: FeedKind,
}

pub const RELATIONS: &[Relation] = &[
    Relation {
        from: FeedKind::StationStatus,
        field: "station_id",
        to: FeedKind::StationInformation,
    },
    Relation {
        from: FeedKind::FreeBikeStatus,
        field: "station_id",
        to: FeedKind::StationInformation,
    },
    Relation {
        from: FeedKind::FreeBikeStatus,
        field: "pricing_plan_id",
        to: FeedKind::SystemPricingPlans,
    },
    Relation {
        from: FeedKind::StationInformation,
        field: "region_id",
        to: FeedKind::SystemRegions,
    },
    Relation {
        from: FeedKind::SystemAlerts,
        field: "station_ids",
        to: FeedKind::StationInformation,
    },
    Relation {
        from: FeedKind::SystemAlerts,
        field: "region_ids",
        to: FeedKind::SystemRegions,
    },
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DanglingRef {
    pub field: &'static str,
    pub id: String,
    pub target: FeedKind,
}

/// Ids a feed mentions that its defining feed does not currently contain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DanglingReport {
    pub references: Vec<DanglingRef>,
}

impl DanglingReport {
    pub fn count(&self) -> usize {
        self.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }
}

/// Whether an update to `kind` can change any dangling report.
pub fn is_linked(kind: FeedKind) -> bool {
    RELATIONS.iter().any(|r| r.from == kind || r.to == kind)
}

/// Feeds whose reports depend on `kind`'s ids.
pub fn dependents(kind: FeedKind) -> Vec<FeedKind> {
    let mut kinds: Vec<FeedKind> = RELATIONS
        .iter()
        .filter(|r| r.to == kind)
        .map(|r| r.from)
        .collect();
    kinds.dedup();
    kinds
}

/// Computes the dangling report for `data`.
///
/// `lookup` returns the current payload of a feed, or `None` if it has not
/// been accepted yet; relations to absent feeds are skipped.
pub fn dangling<'a>(
    data: &FeedData,
    lookup: impl Fn(FeedKind) -> Option<&'a FeedData>,
) -> DanglingReport {
    let mut references = Vec::new();

    for relation in RELATIONS.iter().filter(|r| r.from == data.kind()) {
        let Some(target) = lookup(relation.to) else {
            continue;
        };
        let defined: HashSet<&str> = target.ids().into_iter().collect();
        let mut reported = HashSet::new();

        for id in referenced_ids(data, relation.field) {
            if !defined.contains(id) && reported.insert(id) {
                references.push(DanglingRef {
                    field: relation.field,
                    id: id.to_string(),
                    target: relation.to,
                });
            }
        }
    }

    DanglingReport { references }
}

fn referenced_ids<'d>(data: &'d FeedData, field: &str) -> Vec<&'d str> {
    match (data, field) {
        (FeedData::StationStatus(v), "station_id") => {
            v.iter().map(|s| s.station_id.as_str()).collect()
        }
        (FeedData::FreeBikeStatus(v), "station_id") => {
            v.iter().filter_map(|b| b.station_id.as_deref()).collect()
        }
        (FeedData::FreeBikeStatus(v), "pricing_plan_id") => {
            v.iter().filter_map(|b| b.pricing_plan_id.as_deref()).collect()
        }
        (FeedData::StationInformation(v), "region_id") => {
            v.iter().filter_map(|s| s.region_id.as_deref()).collect()
        }
        (FeedData::SystemAlerts(v), "station_ids") => v
            .iter()
            .flat_map(|a| a.station_ids.iter().map(String::as_str))
            .collect(),
        (FeedData::SystemAlerts(v), "region_ids") => v
            .iter()
            .flat_map(|a| a.region_ids.iter().map(String::as_str))
            .collect(),
        _ => Vec::new(),
    }
}
