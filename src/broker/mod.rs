//! Broker pub/sub - the distributed backend.
//!
//! The traits here describe a message broker from the bus's point of view;
//! [`BrokerTransport`] adapts any `Publisher` + `Subscriber` pair into a
//! [`Transport`](crate::Transport).
//!
//! ```text
//! Bus::emit ──► BrokerTransport::publish ──► Publisher ──► broker
//!                                                            │
//! handlers ◄── poller thread ◄── Subscriber::poll ◄──────────┘
//! ```
//!
//! [`InMemoryBroker`] is included for tests and single-process use; NATS,
//! Redis or Kafka clients plug in by implementing the two traits.

mod in_memory;
mod message;
mod publisher;
mod subscriber;
mod transport;

pub use in_memory::InMemoryBroker;
pub use message::Message;
pub use publisher::{PublishError, Publisher};
pub use subscriber::{Subscribable, Subscriber};
pub use transport::{BrokerConfig, BrokerStats, BrokerTransport};
