//! Idempotent unsubscribe capability.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

type Detach = Box<dyn FnOnce() + Send>;

/// Handle to an active registration.
///
/// Calling [`unsubscribe`](Subscription::unsubscribe) stops delivery. The
/// first call does the work; later calls, from any clone, do nothing.
/// Dropping a `Subscription` does **not** unsubscribe.
#[derive(Clone)]
pub struct Subscription {
    detach: Arc<Mutex<Option<Detach>>>,
}

impl Subscription {
    pub fn new<F>(detach: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            detach: Arc::new(Mutex::new(Some(Box::new(detach)))),
        }
    }

    /// A subscription that is already inactive.
    pub fn inert() -> Self {
        Self {
            detach: Arc::new(Mutex::new(None)),
        }
    }

    pub fn unsubscribe(&self) {
        // Taken under the lock, run outside it: detaching may re-enter.
        let detach = self.detach.lock().take();
        if let Some(detach) = detach {
            detach();
        }
    }

    /// `false` once `unsubscribe` has been called on this handle or a clone.
    pub fn is_active(&self) -> bool {
        self.detach.lock().is_some()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}
