use std::sync::Arc;

use thiserror::Error;

#[cfg(feature = "broker")]
use crate::broker::PublishError;

/// Errors raised by a transport.
///
/// Only [`TransportError::Unavailable`] ever reaches a caller directly (at
/// construction time). Everything else is routed to an [`ErrorReporter`].
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport could not be initialized in this environment.
    #[error("transport unavailable: {0}")]
    Unavailable(String),

    /// The delivery mechanism refused the payload.
    #[error("publish of {event} failed: {reason}")]
    Publish { event: String, reason: String },

    /// The broker backing the transport rejected the message.
    #[cfg(feature = "broker")]
    #[error("broker error for {event}: {source}")]
    Broker {
        event: String,
        #[source]
        source: PublishError,
    },

    /// Polling the broker for inbound messages failed.
    #[cfg(feature = "broker")]
    #[error("broker receive failed: {0}")]
    Receive(#[source] PublishError),

    /// The payload could not be serialized for the wire.
    #[error("failed to encode payload for {event}: {source}")]
    Encode {
        event: String,
        #[source]
        source: serde_json::Error,
    },

    /// An inbound message could not be decoded; it was dropped.
    #[error("dropped undecodable message for {event}: {source}")]
    Decode {
        event: String,
        #[source]
        source: serde_json::Error,
    },

    /// One or more handlers panicked while a payload was dispatched.
    #[error("{failures} handler(s) panicked while dispatching {event}: {message}")]
    HandlerPanicked {
        event: String,
        failures: usize,
        message: String,
    },
}

impl TransportError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        TransportError::Unavailable(msg.into())
    }

    pub fn publish(event: impl Into<String>, reason: impl Into<String>) -> Self {
        TransportError::Publish {
            event: event.into(),
            reason: reason.into(),
        }
    }

    /// Name of the event the error relates to, if any.
    pub fn event(&self) -> Option<&str> {
        match self {
            TransportError::Unavailable(_) => None,
            TransportError::Publish { event, .. }
            | TransportError::Encode { event, .. }
            | TransportError::Decode { event, .. }
            | TransportError::HandlerPanicked { event, .. } => Some(event),
            #[cfg(feature = "broker")]
            TransportError::Broker { event, .. } => Some(event),
            #[cfg(feature = "broker")]
            TransportError::Receive(_) => None,
        }
    }
}

/// Out-of-band channel for delivery failures.
pub type ErrorReporter = Arc<dyn Fn(&TransportError) + Send + Sync>;

/// The reporter used when none is injected: log and move on.
pub fn log_reporter() -> ErrorReporter {
    Arc::new(|err: &TransportError| {
        tracing::error!(event = err.event().unwrap_or("-"), error = %err, "event delivery failed");
    })
}
