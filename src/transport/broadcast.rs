//! Cross-context broadcast transport.
//!
//! A [`BroadcastHub`] plays the role of a named broadcast channel: every
//! endpoint connected to it receives what the *other* endpoints publish.
//! Messages cross the hub serialized, so each endpoint could just as well
//! live behind a process or sandbox boundary.
//!
//! ```text
//!  BroadcastTransport A ──┐                     ┌──► mailbox B ──► receiver thread B
//!                         ├──► BroadcastHub ────┤
//!  BroadcastTransport B ──┘   (JSON frames)     └──► mailbox C ──► receiver thread C
//! ```
//!
//! ## Rules
//! - **No echo**: an endpoint never receives its own publications.
//! - **Wire format**: `{"event": "<name>", "payload": <json>}`.
//! - **Malformed input is dropped**: undecodable frames and payloads that do
//!   not fit a subscriber's type are reported and skipped.
//! - **Bounded mailboxes** (optional): publishing to a full mailbox fails for
//!   that peer only; the error goes to the bus reporter.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::table::SubscriberTable;
use super::{PanicTally, Transport};
use crate::{log_reporter, ErrorReporter, Event, Handler, Subscription, TransportError};

type Frame = Arc<[u8]>;
type Inbound = Arc<dyn Fn(&Value) -> Result<(), serde_json::Error> + Send + Sync>;

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    event: String,
    payload: Value,
}

/// Settings for one broadcast endpoint.
#[derive(Clone)]
pub struct BroadcastConfig {
    /// Mailbox capacity; `None` means unbounded.
    pub capacity: Option<usize>,
    /// Name of the receiver thread.
    pub thread_name: String,
    /// Where inbound delivery failures go. Defaults to [`log_reporter`].
    pub reporter: Option<ErrorReporter>,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            capacity: None,
            thread_name: "typed-bus-broadcast".to_string(),
            reporter: None,
        }
    }
}

impl BroadcastConfig {
    /// Bound the mailbox to `capacity` frames. A capacity of zero is raised
    /// to one so the mailbox can hold at least one frame.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity.max(1));
        self
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    pub fn with_error_reporter(mut self, reporter: ErrorReporter) -> Self {
        self.reporter = Some(reporter);
        self
    }
}

impl fmt::Debug for BroadcastConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BroadcastConfig")
            .field("capacity", &self.capacity)
            .field("thread_name", &self.thread_name)
            .field("reporter", &self.reporter.is_some())
            .finish()
    }
}

struct Peer {
    id: u64,
    mailbox: Sender<Frame>,
}

#[derive(Default)]
struct HubState {
    peers: Vec<Peer>,
    next_id: u64,
    shut_down: bool,
}

/// Shared medium that broadcast endpoints connect to.
///
/// Cheap to clone; clones refer to the same hub.
#[derive(Clone, Default)]
pub struct BroadcastHub {
    state: Arc<Mutex<HubState>>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect a new endpoint with default settings.
    pub fn connect(&self) -> Result<BroadcastTransport, TransportError> {
        self.connect_with(BroadcastConfig::default())
    }

    /// Connect a new endpoint.
    ///
    /// Fails with [`TransportError::Unavailable`] if the hub was shut down or
    /// the receiver thread cannot be started.
    pub fn connect_with(
        &self,
        config: BroadcastConfig,
    ) -> Result<BroadcastTransport, TransportError> {
        let (mailbox, inbox) = match config.capacity {
            Some(capacity) => crossbeam_channel::bounded(capacity),
            None => crossbeam_channel::unbounded(),
        };

        let peer = {
            let mut state = self.state.lock();
            if state.shut_down {
                return Err(TransportError::unavailable(
                    "broadcast hub has been shut down",
                ));
            }
            let id = state.next_id;
            state.next_id += 1;
            state.peers.push(Peer { id, mailbox });
            id
        };

        let table = Arc::new(SubscriberTable::new());
        let reporter = config.reporter.unwrap_or_else(log_reporter);
        let worker_table = Arc::clone(&table);
        let spawned = thread::Builder::new()
            .name(config.thread_name)
            .spawn(move || receive_loop(inbox, worker_table, reporter));

        let receiver = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.detach(peer);
                return Err(TransportError::unavailable(format!(
                    "cannot start broadcast receiver: {}",
                    e
                )));
            }
        };

        tracing::debug!(peer, "broadcast endpoint connected");
        Ok(BroadcastTransport {
            peer,
            hub: self.clone(),
            table,
            closed: AtomicBool::new(false),
            receiver: Mutex::new(Some(receiver)),
        })
    }

    /// Number of connected endpoints.
    pub fn peer_count(&self) -> usize {
        self.state.lock().peers.len()
    }

    /// Deliver raw bytes to every endpoint, bypassing encoding.
    pub fn post_raw(&self, bytes: impl Into<Vec<u8>>) {
        let bytes: Vec<u8> = bytes.into();
        let frame: Frame = bytes.into();
        self.state.lock().peers.retain(|peer| {
            !matches!(
                peer.mailbox.try_send(frame.clone()),
                Err(TrySendError::Disconnected(_))
            )
        });
    }

    /// Disconnect every endpoint and refuse new ones.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        state.shut_down = true;
        state.peers.clear();
        tracing::debug!("broadcast hub shut down");
    }

    fn detach(&self, peer: u64) {
        self.state.lock().peers.retain(|p| p.id != peer);
    }

    fn post_from(&self, origin: u64, event: &str, frame: Frame) -> Result<(), TransportError> {
        let mut full = 0usize;
        let mut state = self.state.lock();
        state.peers.retain(|peer| {
            if peer.id == origin {
                return true;
            }
            match peer.mailbox.try_send(frame.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    full += 1;
                    true
                }
                Err(TrySendError::Disconnected(_)) => false,
            }
        });

        if full > 0 {
            return Err(TransportError::publish(
                event,
                format!("{} peer mailbox(es) full", full),
            ));
        }
        Ok(())
    }
}

fn receive_loop(
    inbox: Receiver<Frame>,
    table: Arc<SubscriberTable<Inbound>>,
    reporter: ErrorReporter,
) {
    for frame in inbox.iter() {
        let message: WireMessage = match serde_json::from_slice(&frame) {
            Ok(message) => message,
            Err(source) => {
                tracing::warn!(bytes = frame.len(), "dropping malformed broadcast frame");
                reporter(&TransportError::Decode {
                    event: "<unknown>".to_string(),
                    source,
                });
                continue;
            }
        };

        let mut tally = PanicTally::default();
        for inbound in table.snapshot(&message.event) {
            let mut decoded = Ok(());
            tally.isolate(|| decoded = inbound(&message.payload));
            if let Err(source) = decoded {
                tracing::warn!(event = %message.event, "dropping payload that does not decode");
                reporter(&TransportError::Decode {
                    event: message.event.clone(),
                    source,
                });
            }
        }
        if let Err(err) = tally.into_result(&message.event) {
            reporter(&err);
        }
    }
    tracing::debug!("broadcast receiver stopped");
}

/// One endpoint on a [`BroadcastHub`].
///
/// Delivery is asynchronous: handlers run on the endpoint's receiver thread.
/// After [`close`](Transport::close) the endpoint is detached; publishing on it
/// is a no-op.
pub struct BroadcastTransport {
    peer: u64,
    hub: BroadcastHub,
    table: Arc<SubscriberTable<Inbound>>,
    closed: AtomicBool,
    receiver: Mutex<Option<JoinHandle<()>>>,
}

impl BroadcastTransport {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of live subscriptions for `event` on this endpoint.
    pub fn subscriber_count(&self, event: &str) -> usize {
        self.table.len(event)
    }
}

impl Transport for BroadcastTransport {
    fn publish<E: Event>(&self, payload: E::Payload) -> Result<(), TransportError> {
        if self.is_closed() {
            tracing::debug!(event = E::NAME, "publish on closed broadcast endpoint ignored");
            return Ok(());
        }

        let encode = |source| TransportError::Encode {
            event: E::NAME.to_string(),
            source,
        };
        let message = WireMessage {
            event: E::NAME.to_string(),
            payload: serde_json::to_value(&payload).map_err(encode)?,
        };
        let frame = serde_json::to_vec(&message).map_err(encode)?;

        self.hub.post_from(self.peer, E::NAME, frame.into())
    }

    fn subscribe<E: Event>(&self, handler: Handler<E::Payload>) -> Subscription {
        let inbound: Inbound = Arc::new(move |value: &Value| -> Result<(), serde_json::Error> {
            let payload = <E::Payload as Deserialize>::deserialize(value)?;
            handler.call(&payload);
            Ok(())
        });
        let id = self.table.insert(E::NAME, inbound);
        SubscriberTable::subscription(Arc::downgrade(&self.table), E::NAME, id)
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.hub.detach(self.peer);
        self.table.clear();

        let receiver = self.receiver.lock().take();
        if let Some(handle) = receiver {
            // A handler may close its own endpoint; never join ourselves.
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
        tracing::debug!(peer = self.peer, "broadcast endpoint closed");
    }
}

impl Drop for BroadcastTransport {
    fn drop(&mut self) {
        self.close();
    }
}
