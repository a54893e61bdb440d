//! In-memory broker for tests and single-process setups.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

use super::{Message, PublishError, Publisher, Subscribable, Subscriber};

/// In-memory broker.
///
/// Features:
/// - Thread-safe (shared across threads via `Clone`)
/// - Messages are stored in an append-only log
/// - Each subscriber tracks its own read position
///
/// ## Example
///
/// ```
/// use typed_bus::broker::{InMemoryBroker, Message, Publisher, Subscriber};
///
/// let broker = InMemoryBroker::new();
/// broker.publish(Message::with_string_payload("m-1", "order.created", "{}")).unwrap();
///
/// let sub1 = broker.new_subscriber();
/// let sub2 = broker.new_subscriber();
/// assert_eq!(sub1.poll(10).unwrap().unwrap().event_type, "order.created");
/// assert_eq!(sub2.poll(10).unwrap().unwrap().event_type, "order.created");
/// ```
#[derive(Clone)]
pub struct InMemoryBroker {
    /// Shared message log
    log: Arc<RwLock<MessageLog>>,
    /// Per-subscriber read position
    cursor: Arc<Mutex<Cursor>>,
    acked: Arc<Mutex<Vec<String>>>,
    nacked: Arc<Mutex<Vec<(String, String)>>>,
}

/// Messages plus an epoch bumped by every `clear`.
#[derive(Default)]
struct MessageLog {
    messages: Vec<Message>,
    epoch: u64,
}

#[derive(Default)]
struct Cursor {
    position: usize,
    epoch: u64,
}

impl Cursor {
    /// A cursor from an older epoch points into a log that no longer exists.
    fn sync(&mut self, log: &MessageLog) {
        if self.epoch != log.epoch {
            self.position = 0;
            self.epoch = log.epoch;
        }
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self {
            log: Arc::new(RwLock::new(MessageLog::default())),
            cursor: Arc::new(Mutex::new(Cursor::default())),
            acked: Arc::new(Mutex::new(Vec::new())),
            nacked: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A subscriber that shares the log and reads it from the beginning.
    pub fn new_subscriber(&self) -> Self {
        let epoch = self.log.read().epoch;
        self.subscriber_at(Cursor { position: 0, epoch })
    }

    /// A subscriber that only sees messages published from now on.
    pub fn latest_subscriber(&self) -> Self {
        let log = self.log.read();
        let cursor = Cursor {
            position: log.messages.len(),
            epoch: log.epoch,
        };
        drop(log);
        self.subscriber_at(cursor)
    }

    fn subscriber_at(&self, cursor: Cursor) -> Self {
        Self {
            log: Arc::clone(&self.log),
            cursor: Arc::new(Mutex::new(cursor)),
            acked: Arc::new(Mutex::new(Vec::new())),
            nacked: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn messages(&self) -> Vec<Message> {
        self.log.read().messages.clone()
    }

    pub fn event_types(&self) -> Vec<String> {
        self.log
            .read()
            .messages
            .iter()
            .map(|m| m.event_type.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.log.read().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.read().messages.is_empty()
    }

    pub fn current_position(&self) -> usize {
        let log = self.log.read();
        let mut cursor = self.cursor.lock();
        cursor.sync(&log);
        cursor.position
    }

    /// Message ids acknowledged through this subscriber.
    pub fn acknowledged(&self) -> Vec<String> {
        self.acked.lock().clone()
    }

    /// `(message id, reason)` pairs rejected through this subscriber.
    pub fn rejected(&self) -> Vec<(String, String)> {
        self.nacked.lock().clone()
    }

    /// Clear all messages from the log (useful for test cleanup).
    ///
    /// Every subscriber sharing the log starts over from the beginning of
    /// the emptied log. Ack/nack records are cleared for this handle only.
    pub fn clear(&self) {
        {
            let mut log = self.log.write();
            log.messages.clear();
            log.epoch += 1;
        }
        self.acked.lock().clear();
        self.nacked.lock().clear();
    }
}

impl Publisher for InMemoryBroker {
    fn publish(&self, message: Message) -> Result<(), PublishError> {
        self.log.write().messages.push(message);
        Ok(())
    }

    fn publish_batch(&self, messages: Vec<Message>) -> Result<(), PublishError> {
        self.log.write().messages.extend(messages);
        Ok(())
    }
}

impl Subscriber for InMemoryBroker {
    fn poll(&self, timeout_ms: u64) -> Result<Option<Message>, PublishError> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);

        loop {
            {
                let log = self.log.read();
                let mut cursor = self.cursor.lock();
                cursor.sync(&log);

                if let Some(message) = log.messages.get(cursor.position) {
                    cursor.position += 1;
                    return Ok(Some(message.clone()));
                }
            }

            if Instant::now() >= deadline {
                return Ok(None);
            }

            // Small sleep to avoid busy-waiting
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn ack(&self, message_id: &str) -> Result<(), PublishError> {
        self.acked.lock().push(message_id.to_string());
        Ok(())
    }

    fn nack(&self, message_id: &str, reason: &str) -> Result<(), PublishError> {
        // No redelivery; the message stays in the log.
        self.nacked
            .lock()
            .push((message_id.to_string(), reason.to_string()));
        Ok(())
    }
}

impl Subscribable for InMemoryBroker {
    fn new_subscriber(&self) -> Self {
        InMemoryBroker::new_subscriber(self)
    }
}
