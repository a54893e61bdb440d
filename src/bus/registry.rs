//! Active registrations of one bus, keyed by (event, handler identity).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::{Event, Handler, HandlerId, Subscription};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct RegistrationKey {
    event: &'static str,
    handler: HandlerId,
}

impl RegistrationKey {
    pub(crate) fn of<E: Event>(handler: &Handler<E::Payload>) -> Self {
        Self {
            event: E::NAME,
            handler: handler.id(),
        }
    }
}

struct Registration {
    id: u64,
    transport: Subscription,
}

/// At most one registration per key. A newer registration replaces the older
/// one and detaches it from the transport; handles to the older one go inert.
pub(crate) struct Registry {
    entries: Mutex<HashMap<RegistrationKey, Registration>>,
    next_id: AtomicU64,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    pub(crate) fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Records the transport subscription made by `subscribe` and returns the
    /// bus-level handle for it.
    ///
    /// `subscribe` runs under the registry lock so a delivery racing the
    /// registration always finds its entry.
    pub(crate) fn register(
        self: &Arc<Self>,
        key: RegistrationKey,
        id: u64,
        subscribe: impl FnOnce() -> Subscription,
    ) -> Subscription {
        let replaced = {
            let mut entries = self.entries.lock();
            let transport = subscribe();
            entries.insert(key, Registration { id, transport })
        };
        if let Some(previous) = replaced {
            tracing::debug!(event = key.event, "replacing existing registration for handler");
            previous.transport.unsubscribe();
        }

        let registry = Arc::downgrade(self);
        Subscription::new(move || {
            if let Some(registry) = registry.upgrade() {
                registry.remove(&key, id);
            }
        })
    }

    /// Removes the registration only if it is still registration `id`.
    pub(crate) fn remove(&self, key: &RegistrationKey, id: u64) -> bool {
        let removed = {
            let mut entries = self.entries.lock();
            match entries.get(key) {
                Some(entry) if entry.id == id => entries.remove(key),
                _ => None,
            }
        };
        Self::detach(removed)
    }

    pub(crate) fn remove_key(&self, key: &RegistrationKey) -> bool {
        let removed = self.entries.lock().remove(key);
        Self::detach(removed)
    }

    /// Empties the registry, handing back every transport subscription.
    pub(crate) fn take_all(&self) -> Vec<Subscription> {
        self.entries
            .lock()
            .drain()
            .map(|(_, entry)| entry.transport)
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }

    // Runs outside the registry lock; the transport may call back into us.
    fn detach(removed: Option<Registration>) -> bool {
        match removed {
            Some(entry) => {
                entry.transport.unsubscribe();
                true
            }
            None => false,
        }
    }
}

/// Removes one registration when dropped, panic or not.
pub(crate) struct DetachOnDrop {
    pub(crate) registry: Weak<Registry>,
    pub(crate) key: RegistrationKey,
    pub(crate) id: u64,
}

impl Drop for DetachOnDrop {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.key, self.id);
        }
    }
}
