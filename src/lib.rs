//! # typed_bus
//!
//! A typed publish/subscribe event bus with a pluggable transport layer.
//!
//! Events are declared once with [`event_map!`]; every registration and
//! emission is then checked against the payload type bound to the event's
//! name. The same [`Bus`] API fronts different delivery backends:
//!
//! - [`LocalTransport`] - synchronous, in-process, registration order.
//! - [`BroadcastTransport`] - cross-context fan-out over a [`BroadcastHub`]
//!   (feature `broadcast`).
//! - [`broker::BrokerTransport`] - any pub/sub broker behind the
//!   [`broker::Publisher`] / [`broker::Subscriber`] traits (feature `broker`).
//!
//! ```
//! use std::sync::{Arc, Mutex};
//! use typed_bus::{event_map, Bus, Handler};
//!
//! event_map! {
//!     pub struct Greeted: "greeted" => String;
//! }
//!
//! let bus = Bus::local();
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = Arc::clone(&seen);
//! let handler = Handler::new(move |name: &String| sink.lock().unwrap().push(name.clone()));
//!
//! bus.on::<Greeted>(handler.clone());
//! bus.emit::<Greeted>("ada".to_string());
//! bus.off::<Greeted>(&handler);
//! bus.emit::<Greeted>("grace".to_string());
//!
//! assert_eq!(*seen.lock().unwrap(), vec!["ada".to_string()]);
//! ```

#[cfg(feature = "broker")]
pub mod broker;
mod bus;
mod error;
mod event;
mod subscription;
mod transport;

pub use bus::{Bus, QueuedEvent};
pub use error::{log_reporter, ErrorReporter, TransportError};
pub use event::{Event, Handler, HandlerId};
pub use subscription::Subscription;
#[cfg(feature = "broadcast")]
pub use transport::{BroadcastConfig, BroadcastHub, BroadcastTransport};
pub use transport::{LocalTransport, Transport};
