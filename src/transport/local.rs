//! In-process reference transport.

use std::any::Any;
use std::sync::Arc;

use super::table::SubscriberTable;
use super::{PanicTally, Transport};
use crate::{Event, Handler, Subscription, TransportError};

type ErasedHandler = Arc<dyn Any + Send + Sync>;

/// Synchronous, in-process transport.
///
/// `publish` runs every handler subscribed to the event, in registration
/// order, on the calling thread before it returns. Each handler runs
/// isolated: a panicking handler does not keep its siblings from running,
/// and the panic comes back as [`TransportError::HandlerPanicked`].
///
/// ## Example
///
/// ```
/// use std::sync::{Arc, Mutex};
/// use typed_bus::{event_map, Handler, LocalTransport, Transport};
///
/// event_map! {
///     struct Tick: "tick" => u32;
/// }
///
/// let transport = LocalTransport::new();
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let sink = Arc::clone(&seen);
/// let sub = transport.subscribe::<Tick>(Handler::new(move |n: &u32| {
///     sink.lock().unwrap().push(*n);
/// }));
///
/// transport.publish::<Tick>(1).unwrap();
/// sub.unsubscribe();
/// transport.publish::<Tick>(2).unwrap();
///
/// assert_eq!(*seen.lock().unwrap(), vec![1]);
/// ```
pub struct LocalTransport {
    table: Arc<SubscriberTable<ErasedHandler>>,
}

impl Default for LocalTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalTransport {
    pub fn new() -> Self {
        Self {
            table: Arc::new(SubscriberTable::new()),
        }
    }

    /// Number of live subscriptions for `event`.
    pub fn subscriber_count(&self, event: &str) -> usize {
        self.table.len(event)
    }

    /// Number of events with at least one subscriber.
    pub fn event_count(&self) -> usize {
        self.table.bucket_count()
    }
}

impl Transport for LocalTransport {
    fn publish<E: Event>(&self, payload: E::Payload) -> Result<(), TransportError> {
        let snapshot = self.table.snapshot(E::NAME);
        let mut tally = PanicTally::default();

        for subscriber in snapshot {
            match subscriber.downcast_ref::<Handler<E::Payload>>() {
                Some(handler) => tally.isolate(|| handler.call(&payload)),
                None => tracing::warn!(
                    event = E::NAME,
                    "skipping subscriber registered with a different payload type"
                ),
            }
        }

        tally.into_result(E::NAME)
    }

    fn subscribe<E: Event>(&self, handler: Handler<E::Payload>) -> Subscription {
        let id = self.table.insert(E::NAME, Arc::new(handler));
        tracing::trace!(event = E::NAME, slot = id, "local subscribe");
        SubscriberTable::subscription(Arc::downgrade(&self.table), E::NAME, id)
    }

    fn close(&self) {
        tracing::debug!(events = self.table.bucket_count(), "closing local transport");
        self.table.clear();
    }
}
