//! Live timeline segment: a date-range window over the persisted
//! timeline that refetches on change notifications and optionally
//! triggers reprocessing.
//!
//! Change events are debounced with a one-second trailing-edge timer
//! (the latest event wins), so bursts of commits collapse into a single
//! refetch. The published item list is only ever written by the
//! segment's own worker task; consumers read it through a watch channel.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use locus_core::{ForegroundState, RecorderState, TimelineProcessor, TimelineStore};
use locus_domain::constants::SEGMENT_DEBOUNCE_MS;
use locus_domain::{DateInterval, LocomotionSample, TimelineItem};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A live window over the timeline.
///
/// Holding the segment keeps its observer task alive; dropping it
/// cancels the subscription. Cancellation is cooperative and never
/// interrupts a store transaction.
pub struct TimelineSegment {
    date_range: DateInterval,
    items: watch::Receiver<Vec<TimelineItem>>,
    cancellation: CancellationToken,
    task_handle: Option<JoinHandle<()>>,
}

/// Everything the worker task needs, bundled so spawning stays tidy.
struct SegmentWorker {
    store: Arc<dyn TimelineStore>,
    processor: Arc<TimelineProcessor>,
    foreground: Arc<dyn ForegroundState>,
    recorder: Arc<dyn RecorderState>,
    date_range: DateInterval,
    should_reprocess_on_update: bool,
    publisher: watch::Sender<Vec<TimelineItem>>,
    /// Samples held from the previous fetch, reused while an item's
    /// `samples_changed` flag stays clear.
    held_samples: HashMap<String, Vec<LocomotionSample>>,
}

impl TimelineSegment {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn TimelineStore>,
        changes: &crate::changes::TimelineChangeBus,
        processor: Arc<TimelineProcessor>,
        foreground: Arc<dyn ForegroundState>,
        recorder: Arc<dyn RecorderState>,
        date_range: DateInterval,
        should_reprocess_on_update: bool,
    ) -> Self {
        let (publisher, items) = watch::channel(Vec::new());
        let receiver = changes.subscribe();
        let cancellation = CancellationToken::new();

        let worker = SegmentWorker {
            store,
            processor,
            foreground,
            recorder,
            date_range,
            should_reprocess_on_update,
            publisher,
            held_samples: HashMap::new(),
        };

        let cancel = cancellation.clone();
        let task_handle = tokio::spawn(async move {
            worker.run(receiver, cancel).await;
        });

        Self { date_range, items, cancellation, task_handle: Some(task_handle) }
    }

    pub fn date_range(&self) -> DateInterval {
        self.date_range
    }

    /// Watch the published item list. The sender side only ever runs on
    /// the segment's worker task.
    pub fn subscribe(&self) -> watch::Receiver<Vec<TimelineItem>> {
        self.items.clone()
    }

    /// The most recently published items.
    pub fn current_items(&self) -> Vec<TimelineItem> {
        self.items.borrow().clone()
    }

    /// Stop observing and wait for the worker to finish.
    pub async fn stop(&mut self) {
        self.cancellation.cancel();
        if let Some(handle) = self.task_handle.take() {
            if let Err(err) = handle.await {
                warn!(error = %err, "segment worker did not shut down cleanly");
            }
        }
    }
}

impl Drop for TimelineSegment {
    fn drop(&mut self) {
        self.cancellation.cancel();
    }
}

impl SegmentWorker {
    async fn run(
        mut self,
        mut receiver: broadcast::Receiver<DateInterval>,
        cancel: CancellationToken,
    ) {
        // publish the initial window before the first change arrives
        self.refetch().await;

        let debounce = Duration::from_millis(SEGMENT_DEBOUNCE_MS);
        let mut deadline: Option<Instant> = None;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = receiver.recv() => match event {
                    Ok(range) if range.intersects(&self.date_range) => {
                        // trailing edge: the latest event wins
                        deadline = Some(Instant::now() + debounce);
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        debug!(missed, "change stream lagged; scheduling refetch");
                        deadline = Some(Instant::now() + debounce);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = sleep_until_deadline(deadline), if deadline.is_some() => {
                    deadline = None;
                    self.refetch().await;
                }
            }
        }

        debug!("segment observer stopped");
    }

    /// Refetch the window, reusing held samples where nothing changed,
    /// publish the new list, and maybe hand it to the processor.
    async fn refetch(&mut self) {
        let bases = match self.store.items_overlapping(&self.date_range).await {
            Ok(bases) => bases,
            Err(err) => {
                // quiescence: the timeline stays at its last published
                // state and the next change event retries
                warn!(error = %err, "segment refetch failed");
                return;
            }
        };

        let mut items = Vec::with_capacity(bases.len());
        for base_item in bases {
            match self.hydrate(base_item).await {
                Ok(item) => items.push(item),
                Err(err) => {
                    warn!(error = %err, "segment hydration failed");
                    return;
                }
            }
        }

        self.held_samples = items
            .iter()
            .filter_map(|item| {
                item.samples.as_ref().map(|samples| (item.base.id.clone(), samples.clone()))
            })
            .collect();

        let _ = self.publisher.send(items.clone());

        if self.should_reprocess_on_update {
            self.maybe_reprocess(items).await;
        }
    }

    async fn hydrate(&mut self, mut item: TimelineItem) -> locus_domain::Result<TimelineItem> {
        if !item.base.samples_changed {
            if let Some(held) = self.held_samples.get(&item.base.id) {
                item.samples = Some(held.clone());
                return Ok(item);
            }
            let samples = self.store.samples_for_item(&item.base.id).await?;
            item.samples = Some(samples);
            return Ok(item);
        }

        // dirty: take the store's refreshed projection instead
        match self.store.hydrated_item(&item.base.id).await? {
            Some(fresh) => Ok(fresh),
            None => {
                item.samples = Some(Vec::new());
                Ok(item)
            }
        }
    }

    /// Hand the window to the processor, unless the item currently being
    /// recorded lives here and is not yet worth keeping. The recorder is
    /// the sole authority on in-flight items.
    async fn maybe_reprocess(&self, items: Vec<TimelineItem>) {
        if items.is_empty() || !self.foreground.is_active() {
            return;
        }

        if let Some(current_id) = self.recorder.current_item_id() {
            let current = items.iter().find(|item| item.base.id == current_id);
            if let Some(current) = current {
                match current.is_worth_keeping() {
                    Ok(true) => {}
                    Ok(false) => {
                        debug!(current = %current_id, "current item not yet a keeper; skipping reprocess");
                        return;
                    }
                    Err(err) => {
                        warn!(error = %err, "keepness check failed; skipping reprocess");
                        return;
                    }
                }
            }
        }

        if let Err(err) = self.processor.process_items(items).await {
            warn!(error = %err, "segment reprocess failed");
        }
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
