//! Pairwise geometry between timeline items: time gaps, edge distances,
//! and the mergeable-distance test.

use locus_domain::constants::{
    ITEM_MINIMUM_MERGEABLE_DISTANCE_METRES, MERGEABLE_DISTANCE_SPEED_FACTOR,
};
use locus_domain::{ItemKind, Result, TimelineItem};

/// Signed seconds between two items' date ranges.
///
/// Positive = gap, negative = overlap duration, zero = touching.
pub fn time_interval_secs(a: &TimelineItem, b: &TimelineItem) -> f64 {
    a.date_range().time_interval_secs(&b.date_range())
}

/// Distance in metres between the closest usable points of two items.
///
/// Visit-to-visit measures between geofence centers; mixed pairs measure
/// from the visit center to the trip's facing edge; trip-to-trip measures
/// between the facing edges. `None` when either side has no usable
/// coordinate to measure with.
pub fn distance_between(a: &TimelineItem, b: &TimelineItem) -> Result<Option<f64>> {
    match (&a.kind, &b.kind) {
        (ItemKind::Visit(va), ItemKind::Visit(vb)) => {
            Ok(Some(va.center().distance_from(&vb.center())))
        }
        (ItemKind::Visit(visit), ItemKind::Trip(_)) => {
            let edge = b.edge_coordinate(&a.date_range())?;
            Ok(edge.map(|coordinate| visit.center().distance_from(&coordinate)))
        }
        (ItemKind::Trip(_), ItemKind::Visit(visit)) => {
            let edge = a.edge_coordinate(&b.date_range())?;
            Ok(edge.map(|coordinate| visit.center().distance_from(&coordinate)))
        }
        (ItemKind::Trip(_), ItemKind::Trip(_)) => {
            let edge_a = a.edge_coordinate(&b.date_range())?;
            let edge_b = b.edge_coordinate(&a.date_range())?;
            match (edge_a, edge_b) {
                (Some(ca), Some(cb)) => Ok(Some(ca.distance_from(&cb))),
                _ => Ok(None),
            }
        }
    }
}

/// The furthest apart two items can be and still merge.
///
/// Visit pairs are unbounded (the overlap test decides); mixed pairs get
/// a floor of 150 m widened by the trip's speed over the time gap; trip
/// pairs scale with the mean of the two speeds.
pub fn maximum_mergeable_distance(a: &TimelineItem, b: &TimelineItem) -> f64 {
    let gap = time_interval_secs(a, b).abs();
    match (&a.kind, &b.kind) {
        (ItemKind::Visit(_), ItemKind::Visit(_)) => f64::INFINITY,
        (ItemKind::Visit(_), ItemKind::Trip(trip)) | (ItemKind::Trip(trip), ItemKind::Visit(_)) => {
            let speed = trip.speed.unwrap_or(0.0);
            f64::max(
                ITEM_MINIMUM_MERGEABLE_DISTANCE_METRES,
                MERGEABLE_DISTANCE_SPEED_FACTOR * speed * gap,
            )
        }
        (ItemKind::Trip(ta), ItemKind::Trip(tb)) => {
            let speeds: Vec<f64> = [ta.speed, tb.speed]
                .into_iter()
                .flatten()
                .filter(|speed| *speed > 0.0)
                .collect();
            if speeds.is_empty() {
                return 0.0;
            }
            let mean = speeds.iter().sum::<f64>() / speeds.len() as f64;
            MERGEABLE_DISTANCE_SPEED_FACTOR * mean * gap
        }
    }
}

/// Whether two items are close enough (in space, given their time gap)
/// to be merge candidates.
pub fn is_within_mergeable_distance(a: &TimelineItem, b: &TimelineItem) -> Result<bool> {
    // without location there is nothing to measure against
    if a.is_nolo()? || b.is_nolo()? {
        return Ok(true);
    }
    // overlapping items are already entangled
    if time_interval_secs(a, b) < 0.0 {
        return Ok(true);
    }
    match distance_between(a, b)? {
        Some(distance) => Ok(distance <= maximum_mergeable_distance(a, b)),
        None => Ok(false),
    }
}
