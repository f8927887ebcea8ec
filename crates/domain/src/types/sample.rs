//! Locomotion samples: single timestamped location/recording observations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::Coordinate;

/// State of the recording engine when a sample was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingState {
    Off,
    Recording,
    Sleeping,
    DeepSleeping,
    Wakeup,
    Standby,
}

impl RecordingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Recording => "recording",
            Self::Sleeping => "sleeping",
            Self::DeepSleeping => "deep_sleeping",
            Self::Wakeup => "wakeup",
            Self::Standby => "standby",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "off" => Some(Self::Off),
            "recording" => Some(Self::Recording),
            "sleeping" => Some(Self::Sleeping),
            "deep_sleeping" => Some(Self::DeepSleeping),
            "wakeup" => Some(Self::Wakeup),
            "standby" => Some(Self::Standby),
            _ => None,
        }
    }
}

/// Movement mode assigned by the activity classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    Stationary,
    Walking,
    Running,
    Cycling,
    Car,
    Bus,
    Motorcycle,
    Train,
    Tram,
    Boat,
    Airplane,
    Scooter,
}

impl ActivityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stationary => "stationary",
            Self::Walking => "walking",
            Self::Running => "running",
            Self::Cycling => "cycling",
            Self::Car => "car",
            Self::Bus => "bus",
            Self::Motorcycle => "motorcycle",
            Self::Train => "train",
            Self::Tram => "tram",
            Self::Boat => "boat",
            Self::Airplane => "airplane",
            Self::Scooter => "scooter",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "stationary" => Some(Self::Stationary),
            "walking" => Some(Self::Walking),
            "running" => Some(Self::Running),
            "cycling" => Some(Self::Cycling),
            "car" => Some(Self::Car),
            "bus" => Some(Self::Bus),
            "motorcycle" => Some(Self::Motorcycle),
            "train" => Some(Self::Train),
            "tram" => Some(Self::Tram),
            "boat" => Some(Self::Boat),
            "airplane" => Some(Self::Airplane),
            "scooter" => Some(Self::Scooter),
            _ => None,
        }
    }
}

/// A single observation from the location acquisition layer.
///
/// Samples are created by the recorder and never deleted; merges and edge
/// cleansing only ever reassign `timeline_item_id`, and broken samples are
/// parked with the `disabled` flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocomotionSample {
    pub id: String,
    pub date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinate: Option<Coordinate>,
    pub horizontal_accuracy: f64,
    /// Metres per second.
    pub speed: f64,
    /// Degrees clockwise from true north.
    pub course: f64,
    pub altitude: f64,
    pub recording_state: RecordingState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classified_activity_type: Option<ActivityType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed_activity_type: Option<ActivityType>,
    pub timeline_item_id: String,
    pub disabled: bool,
}

impl LocomotionSample {
    /// Confirmed type wins over the classifier's guess.
    pub fn activity_type(&self) -> Option<ActivityType> {
        self.confirmed_activity_type.or(self.classified_activity_type)
    }

    pub fn has_usable_coordinate(&self) -> bool {
        self.coordinate.is_some_and(|c| c.is_usable())
    }

    pub fn usable_coordinate(&self) -> Option<Coordinate> {
        self.coordinate.filter(Coordinate::is_usable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample(coordinate: Option<Coordinate>) -> LocomotionSample {
        LocomotionSample {
            id: "sample-1".into(),
            date: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            coordinate,
            horizontal_accuracy: 10.0,
            speed: 1.2,
            course: 90.0,
            altitude: 30.0,
            recording_state: RecordingState::Recording,
            classified_activity_type: Some(ActivityType::Walking),
            confirmed_activity_type: None,
            timeline_item_id: "item-1".into(),
            disabled: false,
        }
    }

    #[test]
    fn confirmed_type_wins() {
        let mut s = sample(None);
        assert_eq!(s.activity_type(), Some(ActivityType::Walking));
        s.confirmed_activity_type = Some(ActivityType::Cycling);
        assert_eq!(s.activity_type(), Some(ActivityType::Cycling));
    }

    #[test]
    fn usable_coordinate_filters_null_island() {
        assert!(!sample(Some(Coordinate::new(0.0, 0.0))).has_usable_coordinate());
        assert!(sample(Some(Coordinate::new(-37.8, 144.9))).has_usable_coordinate());
        assert!(!sample(None).has_usable_coordinate());
    }

    #[test]
    fn recording_state_string_codec_round_trips() {
        for state in [
            RecordingState::Off,
            RecordingState::Recording,
            RecordingState::Sleeping,
            RecordingState::DeepSleeping,
            RecordingState::Wakeup,
            RecordingState::Standby,
        ] {
            assert_eq!(RecordingState::from_str(state.as_str()), Some(state));
        }
        assert_eq!(RecordingState::from_str("bogus"), None);
    }
}
