//! Publishing side of a broker.

use std::error::Error;

use thiserror::Error;

use super::Message;

/// Error type for broker operations.
#[derive(Debug, Error)]
pub enum PublishError {
    /// Connection to the broker failed
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    /// The broker rejected the message
    #[error("message rejected: {0}")]
    Rejected(String),
    /// Timeout waiting for acknowledgment
    #[error("publish timeout")]
    Timeout,
    #[error("broker error: {0}")]
    Other(#[source] Box<dyn Error + Send + Sync>),
}

/// Trait for publishing messages to a broker.
///
/// Implementations might include:
/// - `InMemoryBroker` - for testing and single-process scenarios
/// - `NatsPublisher`, `RedisPublisher`, `KafkaPublisher` - external
pub trait Publisher: Send + Sync {
    fn publish(&self, message: Message) -> Result<(), PublishError>;

    /// Publish multiple messages.
    ///
    /// Default implementation publishes sequentially and stops at the first
    /// failure.
    fn publish_batch(&self, messages: Vec<Message>) -> Result<(), PublishError> {
        for message in messages {
            self.publish(message)?;
        }
        Ok(())
    }
}
