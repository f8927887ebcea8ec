//! Change-notification bus.
//!
//! Every store commit publishes the union of the date ranges it touched;
//! segment observers subscribe and refetch when a published range
//! intersects their window.

use locus_domain::DateInterval;
use tokio::sync::broadcast;
use tracing::trace;

const DEFAULT_CAPACITY: usize = 64;

/// Broadcast bus carrying the date ranges touched by each commit.
///
/// Slow subscribers may observe a lagged receiver; that is fine, a
/// lagged observer simply refetches on the next event.
pub struct TimelineChangeBus {
    sender: broadcast::Sender<DateInterval>,
}

impl TimelineChangeBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DateInterval> {
        self.sender.subscribe()
    }

    /// Publish an affected range. Dropped silently when nobody listens.
    pub fn publish(&self, range: DateInterval) {
        if self.sender.send(range).is_err() {
            trace!("change published with no subscribers");
        }
    }
}

impl Default for TimelineChangeBus {
    fn default() -> Self {
        Self::new()
    }
}
