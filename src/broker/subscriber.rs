//! Consuming side of a broker.

use super::{Message, PublishError};

/// Trait for receiving messages from a broker.
///
/// This is a pull-based interface; [`BrokerTransport`](super::BrokerTransport)
/// turns it into push delivery with a poller thread.
pub trait Subscriber: Send + Sync {
    /// Poll for the next message, blocking until one is available or timeout.
    fn poll(&self, timeout_ms: u64) -> Result<Option<Message>, PublishError>;

    /// Acknowledge that a message has been processed.
    fn ack(&self, message_id: &str) -> Result<(), PublishError>;

    /// Reject a message (redelivered or dead-lettered, broker permitting).
    fn nack(&self, message_id: &str, reason: &str) -> Result<(), PublishError>;
}

/// Subscribers that can fork independent consumers of the same stream.
pub trait Subscribable: Subscriber + Sized {
    /// The new subscriber keeps its own read position.
    fn new_subscriber(&self) -> Self;
}
