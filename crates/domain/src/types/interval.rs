//! Date intervals and the signed gap/overlap measure between them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A closed date interval `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateInterval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn duration_secs(&self) -> f64 {
        (self.end - self.start).num_milliseconds() as f64 / 1_000.0
    }

    pub fn contains(&self, date: DateTime<Utc>) -> bool {
        date >= self.start && date <= self.end
    }

    /// Whether the two intervals touch or overlap.
    pub fn intersects(&self, other: &DateInterval) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// The smallest interval covering both.
    pub fn union(&self, other: &DateInterval) -> DateInterval {
        DateInterval {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// Signed seconds between two intervals.
    ///
    /// Positive = gap between them, negative = overlap duration, zero =
    /// exactly touching.
    pub fn time_interval_secs(&self, other: &DateInterval) -> f64 {
        let latest_start = self.start.max(other.start);
        let earliest_end = self.end.min(other.end);
        (latest_start - earliest_end).num_milliseconds() as f64 / 1_000.0
    }
}
