//! Domain types and models

pub mod interval;
pub mod item;
pub mod sample;

pub use interval::DateInterval;
pub use item::{
    ItemKind, Keepness, TimelineItem, TimelineItemBase, TripFields, VisitFields,
};
pub use sample::{ActivityType, LocomotionSample, RecordingState};

use uuid::Uuid;

/// Generate a fresh timeline item id.
pub fn new_item_id() -> String {
    Uuid::new_v4().to_string()
}

/// Generate a fresh sample id.
pub fn new_sample_id() -> String {
    Uuid::new_v4().to_string()
}
