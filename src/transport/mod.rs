//! Transports - the delivery backends a [`Bus`](crate::Bus) is built on.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Bus (one per transport)                  │
//! │  - registry of (event, handler) -> Subscription             │
//! │  - FIFO queue for enqueue() / drain()                       │
//! └─────────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Transport trait                        │
//! │  publish::<E>(payload) / subscribe::<E>(handler) / close()  │
//! └─────────────────────────────────────────────────────────────┘
//!          │                  │                     │
//!          ▼                  ▼                     ▼
//! ┌────────────────┐  ┌────────────────────┐  ┌─────────────────┐
//! │ LocalTransport │  │ BroadcastTransport │  │ BrokerTransport │
//! │ (in-process)   │  │ (cross-context)    │  │ (pub/sub broker)│
//! └────────────────┘  └────────────────────┘  └─────────────────┘
//! ```
//!
//! ## Contract
//!
//! - `publish` with no subscribers is a no-op, not an error.
//! - Subscribing the same handler twice yields two independent deliveries
//!   for every transport in this crate; the bus decides whether to allow it.
//! - Dispatch iterates a snapshot of the subscriber set, so handlers may
//!   subscribe or unsubscribe while a delivery pass is running.
//! - `close` is called at most once, by [`Bus::clear`](crate::Bus::clear).

#[cfg(feature = "broadcast")]
mod broadcast;
mod local;
pub(crate) mod table;

#[cfg(feature = "broadcast")]
pub use broadcast::{BroadcastConfig, BroadcastHub, BroadcastTransport};
pub use local::LocalTransport;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use crate::{Event, Handler, Subscription, TransportError};

/// Delivery backend for a [`Bus`](crate::Bus).
///
/// Errors returned from `publish` are never raised to the emitting caller;
/// the bus hands them to its [`ErrorReporter`](crate::ErrorReporter).
/// Transports that deliver asynchronously report their own inbound failures
/// the same way.
pub trait Transport: Send + Sync {
    /// Make `payload` available to subscribers of `E`.
    fn publish<E: Event>(&self, payload: E::Payload) -> Result<(), TransportError>;

    /// Deliver future payloads of `E` to `handler` until the returned
    /// subscription is cancelled.
    fn subscribe<E: Event>(&self, handler: Handler<E::Payload>) -> Subscription;

    /// Release every resource the transport holds.
    fn close(&self) {}
}

/// Tally of handler panics during one delivery pass.
#[derive(Debug, Default)]
pub(crate) struct PanicTally {
    failures: usize,
    first_message: Option<String>,
}

impl PanicTally {
    /// Runs `f`, catching a panic instead of unwinding into the dispatcher.
    pub(crate) fn isolate(&mut self, f: impl FnOnce()) {
        if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(f)) {
            self.failures += 1;
            self.first_message
                .get_or_insert_with(|| panic_message(panic.as_ref()));
        }
    }

    pub(crate) fn into_result(self, event: &str) -> Result<(), TransportError> {
        if self.failures == 0 {
            return Ok(());
        }
        Err(TransportError::HandlerPanicked {
            event: event.to_string(),
            failures: self.failures,
            message: self.first_message.unwrap_or_default(),
        })
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
