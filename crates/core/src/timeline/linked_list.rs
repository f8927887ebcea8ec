//! In-memory window of timeline items for one processing pass.
//!
//! The window is an arena keyed by item id; neighbour lookups always go
//! through the live `previous_item_id`/`next_item_id` fields rather than
//! any cached ordering, so they survive freshly reassigned links.

use ahash::AHashMap;
use locus_domain::constants::MAX_PROCESSING_LIST_SIZE;
use locus_domain::{Result, TimelineItem};

use crate::ports::TimelineStore;

/// An ordered window of hydrated items around a seed.
pub struct TimelineLinkedList {
    items: AHashMap<String, TimelineItem>,
}

impl TimelineLinkedList {
    /// Build a window by walking outward from the seed item until two
    /// keeper items have been collected in each direction or the window
    /// holds [`MAX_PROCESSING_LIST_SIZE`] items.
    ///
    /// Returns `None` when the seed does not exist or is deleted.
    pub async fn from_seed(store: &dyn TimelineStore, seed_id: &str) -> Result<Option<Self>> {
        let Some(seed) = store.hydrated_item(seed_id).await? else {
            return Ok(None);
        };
        if seed.base.deleted {
            return Ok(None);
        }

        let mut items = AHashMap::new();
        let mut backward_cursor = seed.base.previous_item_id.clone();
        let mut forward_cursor = seed.base.next_item_id.clone();
        items.insert(seed.base.id.clone(), seed);

        let mut keepers = 0usize;
        while let Some(id) = backward_cursor.take() {
            if items.len() >= MAX_PROCESSING_LIST_SIZE || items.contains_key(&id) {
                break;
            }
            let Some(item) = store.hydrated_item(&id).await? else {
                break;
            };
            if item.base.deleted {
                break;
            }
            if item.is_worth_keeping()? {
                keepers += 1;
            }
            backward_cursor = item.base.previous_item_id.clone();
            items.insert(item.base.id.clone(), item);
            if keepers >= 2 {
                break;
            }
        }

        let mut keepers = 0usize;
        while let Some(id) = forward_cursor.take() {
            if items.len() >= MAX_PROCESSING_LIST_SIZE || items.contains_key(&id) {
                break;
            }
            let Some(item) = store.hydrated_item(&id).await? else {
                break;
            };
            if item.base.deleted {
                break;
            }
            if item.is_worth_keeping()? {
                keepers += 1;
            }
            forward_cursor = item.base.next_item_id.clone();
            items.insert(item.base.id.clone(), item);
            if keepers >= 2 {
                break;
            }
        }

        Ok(Some(Self { items }))
    }

    /// Build a window from already-hydrated items. Returns `None` when
    /// the input is empty.
    pub fn from_items(items: Vec<TimelineItem>) -> Option<Self> {
        if items.is_empty() {
            return None;
        }
        let map = items.into_iter().map(|item| (item.base.id.clone(), item)).collect();
        Some(Self { items: map })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, item_id: &str) -> bool {
        self.items.contains_key(item_id)
    }

    pub fn item(&self, item_id: &str) -> Option<&TimelineItem> {
        self.items.get(item_id)
    }

    pub fn item_mut(&mut self, item_id: &str) -> Option<&mut TimelineItem> {
        self.items.get_mut(item_id)
    }

    pub fn insert(&mut self, item: TimelineItem) {
        self.items.insert(item.base.id.clone(), item);
    }

    pub fn remove(&mut self, item_id: &str) -> Option<TimelineItem> {
        self.items.remove(item_id)
    }

    /// The item's previous neighbour, resolved through its live link id.
    pub fn previous_item(&self, item_id: &str) -> Option<&TimelineItem> {
        let previous_id = self.items.get(item_id)?.base.previous_item_id.as_deref()?;
        self.items.get(previous_id)
    }

    /// The item's next neighbour, resolved through its live link id.
    pub fn next_item(&self, item_id: &str) -> Option<&TimelineItem> {
        let next_id = self.items.get(item_id)?.base.next_item_id.as_deref()?;
        self.items.get(next_id)
    }

    /// Item ids in temporal order (by end date, ties by id for
    /// determinism).
    pub fn ordered_ids(&self) -> Vec<String> {
        let mut entries: Vec<(&String, &TimelineItem)> = self.items.iter().collect();
        entries.sort_by(|(id_a, a), (id_b, b)| {
            a.base.end_date.cmp(&b.base.end_date).then_with(|| id_a.cmp(id_b))
        });
        entries.into_iter().map(|(id, _)| id.clone()).collect()
    }
}
