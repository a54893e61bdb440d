//! The bus - typed front end over one transport.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::queue::{EventQueue, QueuedEvent};
use super::registry::{DetachOnDrop, RegistrationKey, Registry};
use crate::{log_reporter, ErrorReporter, Event, Handler, LocalTransport, Subscription, Transport};

/// Typed publish/subscribe bus over a [`Transport`].
///
/// The bus owns its transport exclusively, tracks every registration made
/// through it, and buffers events for deferred emission.
///
/// - **Registrations** are keyed by (event, handler identity). Registering
///   the same handler for the same event again replaces the previous
///   registration.
/// - **`emit`** is fire-and-forget: transport failures go to the error
///   reporter, never to the caller.
/// - **`drain`** processes the events queued when it starts, oldest first.
///   Events enqueued while it runs wait for the next drain.
///
/// ## Example
///
/// ```
/// use std::sync::{Arc, Mutex};
/// use typed_bus::{event_map, Bus, Handler};
///
/// event_map! {
///     struct Added: "added" => i32;
/// }
///
/// let bus = Bus::local();
/// let total = Arc::new(Mutex::new(0));
/// let sum = Arc::clone(&total);
/// bus.on::<Added>(Handler::new(move |n: &i32| *sum.lock().unwrap() += n));
///
/// bus.emit::<Added>(1);
/// bus.enqueue::<Added>(2);
/// bus.enqueue::<Added>(3);
/// assert_eq!(*total.lock().unwrap(), 1);
///
/// bus.drain();
/// assert_eq!(*total.lock().unwrap(), 6);
/// ```
pub struct Bus<T: Transport> {
    transport: T,
    registry: Arc<Registry>,
    queue: Mutex<EventQueue<T>>,
    reporter: ErrorReporter,
    closed: AtomicBool,
}

impl Bus<LocalTransport> {
    /// Bus over a fresh in-process transport.
    pub fn local() -> Self {
        Self::new(LocalTransport::new())
    }
}

impl Default for Bus<LocalTransport> {
    fn default() -> Self {
        Self::local()
    }
}

impl<T: Transport> Bus<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            registry: Arc::new(Registry::new()),
            queue: Mutex::new(EventQueue::new()),
            reporter: log_reporter(),
            closed: AtomicBool::new(false),
        }
    }

    /// Replace the reporter that receives publish failures.
    pub fn with_error_reporter(mut self, reporter: ErrorReporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// Register `handler` for `E`.
    ///
    /// The returned subscription removes exactly this registration; calling
    /// it again is a no-op.
    pub fn on<E: Event>(&self, handler: Handler<E::Payload>) -> Subscription {
        let key = RegistrationKey::of::<E>(&handler);
        let id = self.registry.next_id();
        tracing::trace!(event = E::NAME, registration = id, "on");
        self.registry
            .register(key, id, || self.transport.subscribe::<E>(handler))
    }

    /// Register `handler` for the next delivery of `E` only.
    ///
    /// The registration removes itself right after the handler runs, even if
    /// the handler panics. Unsubscribing before the first delivery means the
    /// handler never runs.
    pub fn once<E: Event>(&self, handler: Handler<E::Payload>) -> Subscription {
        let key = RegistrationKey::of::<E>(&handler);
        let id = self.registry.next_id();
        let registry = Arc::downgrade(&self.registry);
        let fired = AtomicBool::new(false);

        let wrapper = Handler::new(move |payload: &E::Payload| {
            if fired.swap(true, Ordering::AcqRel) {
                return;
            }
            let _detach = DetachOnDrop {
                registry: registry.clone(),
                key,
                id,
            };
            handler.call(payload);
        });

        tracing::trace!(event = E::NAME, registration = id, "once");
        self.registry
            .register(key, id, || self.transport.subscribe::<E>(wrapper))
    }

    /// Remove the registration of `handler` for `E`, if there is one.
    pub fn off<E: Event>(&self, handler: &Handler<E::Payload>) {
        let removed = self.registry.remove_key(&RegistrationKey::of::<E>(handler));
        tracing::trace!(event = E::NAME, removed, "off");
    }

    /// Publish `payload` now. Never fails from the caller's point of view.
    pub fn emit<E: Event>(&self, payload: E::Payload) {
        if let Err(err) = self.transport.publish::<E>(payload) {
            (self.reporter)(&err);
        }
    }

    /// Buffer `payload` for the next [`drain`](Bus::drain). Runs no handler.
    pub fn enqueue<E: Event>(&self, payload: E::Payload) {
        self.queue.lock().push(QueuedEvent::new::<E>(payload));
        tracing::trace!(event = E::NAME, "enqueued");
    }

    /// Emit every queued event, oldest first.
    pub fn drain(&self) {
        self.drain_with(|event| event.emit(self));
    }

    /// Hand every queued event to `processor`, oldest first, instead of
    /// emitting it.
    ///
    /// Only events queued before the call are processed. If `processor`
    /// panics, the events not yet handed out stay queued.
    pub fn drain_with<F>(&self, mut processor: F)
    where
        F: FnMut(QueuedEvent<T>),
    {
        let (pending, tail) = {
            let queue = self.queue.lock();
            (queue.len(), queue.tail())
        };
        tracing::trace!(pending, "drain");

        loop {
            let next = self.queue.lock().pop_before(tail);
            match next {
                Some(event) => processor(event),
                None => break,
            }
        }
    }

    /// Drop all queued events and registrations, then close the transport.
    ///
    /// Safe to call repeatedly; the transport is closed only once. The bus
    /// stays usable afterwards with whatever the closed transport still
    /// supports.
    pub fn clear(&self) {
        let dropped = self.queue.lock().clear();
        let subscriptions = self.registry.take_all();
        let released = subscriptions.len();
        for subscription in subscriptions {
            subscription.unsubscribe();
        }

        if !self.closed.swap(true, Ordering::AcqRel) {
            self.transport.close();
        }
        tracing::debug!(dropped, released, "bus cleared");
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn queued_len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Number of registrations currently tracked by this bus.
    pub fn subscription_count(&self) -> usize {
        self.registry.len()
    }

    /// `true` once [`clear`](Bus::clear) has closed the transport.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl<T: Transport> fmt::Debug for Bus<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bus")
            .field("subscriptions", &self.subscription_count())
            .field("queued", &self.queued_len())
            .field("closed", &self.is_closed())
            .finish()
    }
}
