//! Per-event subscriber buckets shared by the transports.

use std::collections::HashMap;
use std::sync::Weak;

use parking_lot::Mutex;

use crate::Subscription;

struct Slot<S> {
    id: u64,
    subscriber: S,
}

struct TableState<S> {
    buckets: HashMap<String, Vec<Slot<S>>>,
    next_id: u64,
}

/// Subscribers grouped by event name, in registration order.
///
/// Dispatch always works from a [`snapshot`](SubscriberTable::snapshot), so
/// a subscriber may add or remove entries while a delivery pass is running.
pub(crate) struct SubscriberTable<S> {
    state: Mutex<TableState<S>>,
}

impl<S: Clone> SubscriberTable<S> {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(TableState {
                buckets: HashMap::new(),
                next_id: 0,
            }),
        }
    }

    pub(crate) fn insert(&self, event: &str, subscriber: S) -> u64 {
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        state
            .buckets
            .entry(event.to_string())
            .or_default()
            .push(Slot { id, subscriber });
        id
    }

    /// Removes one slot; drops the bucket once it is empty.
    pub(crate) fn remove(&self, event: &str, id: u64) -> bool {
        let mut state = self.state.lock();
        let Some(bucket) = state.buckets.get_mut(event) else {
            return false;
        };
        let before = bucket.len();
        bucket.retain(|slot| slot.id != id);
        let removed = bucket.len() != before;
        if bucket.is_empty() {
            state.buckets.remove(event);
        }
        removed
    }

    pub(crate) fn snapshot(&self, event: &str) -> Vec<S> {
        self.state
            .lock()
            .buckets
            .get(event)
            .map(|bucket| bucket.iter().map(|slot| slot.subscriber.clone()).collect())
            .unwrap_or_default()
    }

    pub(crate) fn clear(&self) {
        self.state.lock().buckets.clear();
    }

    pub(crate) fn len(&self, event: &str) -> usize {
        self.state
            .lock()
            .buckets
            .get(event)
            .map_or(0, Vec::len)
    }

    pub(crate) fn bucket_count(&self) -> usize {
        self.state.lock().buckets.len()
    }
}

impl<S: Clone + Send + Sync + 'static> SubscriberTable<S> {
    /// Subscription that removes slot `id` if the table is still alive.
    pub(crate) fn subscription(table: Weak<Self>, event: &str, id: u64) -> Subscription {
        let event = event.to_string();
        Subscription::new(move || {
            if let Some(table) = table.upgrade() {
                table.remove(&event, id);
            }
        })
    }
}
