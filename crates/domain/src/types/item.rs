//! Timeline items: the doubly-linked visit/trip nodes of the recorded
//! history, and the validity predicates that decide which of them are
//! worth keeping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{
    TRIP_MINIMUM_KEEPER_DISTANCE_METRES, TRIP_MINIMUM_KEEPER_DURATION_SECS,
    TRIP_MINIMUM_VALID_DISTANCE_METRES, TRIP_MINIMUM_VALID_DURATION_SECS,
    TRIP_MINIMUM_VALID_SAMPLES, VISIT_MINIMUM_KEEPER_DURATION_SECS,
    VISIT_MINIMUM_VALID_DURATION_SECS,
};
use crate::errors::{LocusError, Result};
use crate::geo::Coordinate;
use crate::types::interval::DateInterval;
use crate::types::sample::{ActivityType, LocomotionSample, RecordingState};

/// Keepness classification: how durable an item is.
///
/// The ordering matters; merge-candidate enumeration compares neighbours
/// by keepness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Keepness {
    Neither = 0,
    Valid = 1,
    Keeper = 2,
}

/// The persisted topology node shared by visits and trips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineItemBase {
    pub id: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    /// Opaque tag of the producer. Merges never cross sources.
    pub source: String,
    pub previous_item_id: Option<String>,
    pub next_item_id: Option<String>,
    pub disabled: bool,
    pub deleted: bool,
    /// Dirty flag: derived fields need recomputing from samples.
    pub samples_changed: bool,
}

impl TimelineItemBase {
    pub fn date_range(&self) -> DateInterval {
        DateInterval::new(self.start_date, self.end_date)
    }

    pub fn duration_secs(&self) -> f64 {
        self.date_range().duration_secs()
    }
}

/// Geofence payload carried by visits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitFields {
    pub latitude: f64,
    pub longitude: f64,
    /// Metres.
    pub radius: f64,
}

impl VisitFields {
    pub fn center(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }

    /// Circle test against the geofence.
    pub fn contains(&self, coordinate: &Coordinate) -> bool {
        self.center().distance_from(coordinate) <= self.radius
    }

    /// Whether the two geofence circles intersect.
    pub fn intersects(&self, other: &VisitFields) -> bool {
        self.center().distance_from(&other.center()) <= self.radius + other.radius
    }
}

/// Movement payload carried by trips.
///
/// `distance` and `speed` are `None` until first derived from samples;
/// both are re-derived whenever the owning item's `samples_changed` flag
/// is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripFields {
    /// Metres.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    /// Metres per second.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classified_activity_type: Option<ActivityType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed_activity_type: Option<ActivityType>,
}

impl TripFields {
    /// Confirmed type wins over the classifier's guess.
    pub fn activity_type(&self) -> Option<ActivityType> {
        self.confirmed_activity_type.or(self.classified_activity_type)
    }
}

/// The visit/trip variant carried inside every item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemKind {
    Visit(VisitFields),
    Trip(TripFields),
}

impl ItemKind {
    pub fn is_visit(&self) -> bool {
        matches!(self, Self::Visit(_))
    }
}

/// A hydrated timeline item: topology node + variant payload + samples.
///
/// Samples are loaded lazily; predicates that need them fail with
/// [`LocusError::SamplesNotLoaded`] when called on an unhydrated item.
/// In-memory items are short-lived projections of persisted state and
/// never outlive the processing pass that loaded them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineItem {
    pub base: TimelineItemBase,
    pub kind: ItemKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub samples: Option<Vec<LocomotionSample>>,
}

impl TimelineItem {
    pub fn id(&self) -> &str {
        &self.base.id
    }

    pub fn is_visit(&self) -> bool {
        self.kind.is_visit()
    }

    pub fn is_trip(&self) -> bool {
        !self.kind.is_visit()
    }

    pub fn visit(&self) -> Option<&VisitFields> {
        match &self.kind {
            ItemKind::Visit(fields) => Some(fields),
            ItemKind::Trip(_) => None,
        }
    }

    pub fn trip(&self) -> Option<&TripFields> {
        match &self.kind {
            ItemKind::Trip(fields) => Some(fields),
            ItemKind::Visit(_) => None,
        }
    }

    pub fn date_range(&self) -> DateInterval {
        self.base.date_range()
    }

    pub fn duration_secs(&self) -> f64 {
        self.base.duration_secs()
    }

    /// Hydrated samples, ordered by date.
    pub fn samples(&self) -> Result<&[LocomotionSample]> {
        self.samples
            .as_deref()
            .ok_or_else(|| LocusError::SamplesNotLoaded(self.base.id.clone()))
    }

    /// A data gap is a trip whose samples all have the recorder switched
    /// off. Visits are never data gaps.
    pub fn is_data_gap(&self) -> Result<bool> {
        if self.is_visit() {
            return Ok(false);
        }
        let samples = self.samples()?;
        if samples.is_empty() {
            return Ok(false);
        }
        Ok(samples.iter().all(|s| s.recording_state == RecordingState::Off))
    }

    /// "No location": samples exist but none carry a usable coordinate.
    pub fn is_nolo(&self) -> Result<bool> {
        if self.is_data_gap()? {
            return Ok(false);
        }
        Ok(!self.samples()?.iter().any(LocomotionSample::has_usable_coordinate))
    }

    pub fn is_valid(&self) -> Result<bool> {
        let samples = self.samples()?;
        match &self.kind {
            ItemKind::Visit(_) => {
                if samples.is_empty() {
                    return Ok(false);
                }
                if self.is_nolo()? {
                    return Ok(false);
                }
                if self.duration_secs() < VISIT_MINIMUM_VALID_DURATION_SECS {
                    return Ok(false);
                }
                Ok(true)
            }
            ItemKind::Trip(trip) => {
                if samples.len() < TRIP_MINIMUM_VALID_SAMPLES {
                    return Ok(false);
                }
                if self.duration_secs() < TRIP_MINIMUM_VALID_DURATION_SECS {
                    return Ok(false);
                }
                if let Some(distance) = trip.distance {
                    if distance < TRIP_MINIMUM_VALID_DISTANCE_METRES {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }

    /// Durable enough to present to the user.
    pub fn is_worth_keeping(&self) -> Result<bool> {
        if !self.is_valid()? {
            return Ok(false);
        }
        match &self.kind {
            ItemKind::Visit(_) => Ok(self.duration_secs() >= VISIT_MINIMUM_KEEPER_DURATION_SECS),
            ItemKind::Trip(trip) => {
                if self.duration_secs() < TRIP_MINIMUM_KEEPER_DURATION_SECS {
                    return Ok(false);
                }
                match trip.distance {
                    Some(distance) => Ok(distance >= TRIP_MINIMUM_KEEPER_DISTANCE_METRES),
                    None => Ok(false),
                }
            }
        }
    }

    pub fn keepness(&self) -> Result<Keepness> {
        if self.is_worth_keeping()? {
            Ok(Keepness::Keeper)
        } else if self.is_valid()? {
            Ok(Keepness::Valid)
        } else {
            Ok(Keepness::Neither)
        }
    }

    /// The sample on the edge facing the given date range: the last
    /// sample when the range lies after this item, else the first.
    pub fn edge_sample(&self, toward: &DateInterval) -> Result<Option<&LocomotionSample>> {
        let samples = self.samples()?;
        Ok(if self.faces_forward(toward) { samples.last() } else { samples.first() })
    }

    /// The sample one inward from the facing edge.
    pub fn second_to_edge_sample(&self, toward: &DateInterval) -> Result<Option<&LocomotionSample>> {
        let samples = self.samples()?;
        if samples.len() < 2 {
            return Ok(None);
        }
        Ok(if self.faces_forward(toward) {
            samples.get(samples.len() - 2)
        } else {
            samples.get(1)
        })
    }

    /// First usable coordinate scanning inward from the facing edge.
    pub fn edge_coordinate(&self, toward: &DateInterval) -> Result<Option<Coordinate>> {
        let samples = self.samples()?;
        let coordinate = if self.faces_forward(toward) {
            samples.iter().rev().find_map(LocomotionSample::usable_coordinate)
        } else {
            samples.iter().find_map(LocomotionSample::usable_coordinate)
        };
        Ok(coordinate)
    }

    fn faces_forward(&self, toward: &DateInterval) -> bool {
        let own = self.date_range();
        let own_mid = own.start.timestamp_millis() + own.end.timestamp_millis();
        let toward_mid = toward.start.timestamp_millis() + toward.end.timestamp_millis();
        toward_mid >= own_mid
    }

    /// Refresh derived state from the hydrated samples: the date range,
    /// visit center/radius, and trip distance/speed.
    ///
    /// Called on the hydration path when `samples_changed` is set. Does
    /// not clear the flag; the store does that once the refreshed row is
    /// persisted.
    pub fn update_from_samples(&mut self) -> Result<()> {
        let samples = self
            .samples
            .as_deref()
            .ok_or_else(|| LocusError::SamplesNotLoaded(self.base.id.clone()))?;
        if samples.is_empty() {
            return Ok(());
        }

        if let (Some(first), Some(last)) = (samples.first(), samples.last()) {
            self.base.start_date = first.date;
            self.base.end_date = last.date;
        }

        let coordinates: Vec<Coordinate> = samples
            .iter()
            .filter(|s| !s.disabled)
            .filter_map(LocomotionSample::usable_coordinate)
            .collect();
        let duration = self.duration_secs();

        match &mut self.kind {
            ItemKind::Visit(visit) => {
                if let Some((center, radius)) = visit_geofence(&coordinates) {
                    visit.latitude = center.latitude;
                    visit.longitude = center.longitude;
                    visit.radius = radius;
                }
            }
            ItemKind::Trip(trip) => {
                if coordinates.len() >= 2 {
                    let distance: f64 = coordinates
                        .windows(2)
                        .map(|pair| pair[0].distance_from(&pair[1]))
                        .sum();
                    trip.distance = Some(distance);
                    trip.speed = if duration > 0.0 { Some(distance / duration) } else { None };
                } else {
                    trip.distance = None;
                    trip.speed = None;
                }
            }
        }

        Ok(())
    }
}

/// Mean center plus a one-standard-deviation radius, clamped to sane
/// bounds. Returns `None` when no usable coordinates exist.
fn visit_geofence(coordinates: &[Coordinate]) -> Option<(Coordinate, f64)> {
    if coordinates.is_empty() {
        return None;
    }

    let count = coordinates.len() as f64;
    let latitude = coordinates.iter().map(|c| c.latitude).sum::<f64>() / count;
    let longitude = coordinates.iter().map(|c| c.longitude).sum::<f64>() / count;
    let center = Coordinate::new(latitude, longitude);

    let distances: Vec<f64> = coordinates.iter().map(|c| center.distance_from(c)).collect();
    let mean = distances.iter().sum::<f64>() / count;
    let variance = distances.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / count;
    let radius = (mean + variance.sqrt()).clamp(10.0, 2_000.0);

    Some((center, radius))
}
