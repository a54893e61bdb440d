//! Transport backed by a pub/sub broker.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use super::{Message, Publisher, Subscriber};
use crate::transport::table::SubscriberTable;
use crate::transport::{PanicTally, Transport};
use crate::{log_reporter, ErrorReporter, Event, Handler, Subscription, TransportError};

type Inbound = Arc<dyn Fn(&[u8]) -> Result<(), serde_json::Error> + Send + Sync>;

/// Settings for a [`BrokerTransport`].
#[derive(Clone)]
pub struct BrokerConfig {
    /// How long one poll of the subscriber may block.
    pub poll_interval: Duration,
    /// Prefix of outgoing message ids (`"<origin>-<seq>"`).
    pub origin: String,
    /// Name of the poller thread.
    pub thread_name: String,
    /// Where inbound delivery failures go. Defaults to [`log_reporter`].
    pub reporter: Option<ErrorReporter>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            origin: "typed-bus".to_string(),
            thread_name: "typed-bus-broker".to_string(),
            reporter: None,
        }
    }
}

impl BrokerConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
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

impl fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("poll_interval", &self.poll_interval)
            .field("origin", &self.origin)
            .field("thread_name", &self.thread_name)
            .field("reporter", &self.reporter.is_some())
            .finish()
    }
}

/// Counters kept by the poller thread.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BrokerStats {
    /// Messages dispatched to at least one handler and acknowledged.
    pub handled: usize,
    /// Messages acknowledged without any local subscriber for their event.
    pub unrouted: usize,
    /// Messages rejected because a payload did not decode.
    pub dropped: usize,
    /// Poll cycles completed.
    pub polls: usize,
}

/// Transport that publishes through a broker [`Publisher`] and receives
/// through a broker [`Subscriber`].
///
/// Publishing is synchronous up to the broker; broker failures come back as
/// [`TransportError::Broker`]. Delivery to handlers happens on a poller
/// thread, so it is asynchronous, and it includes this endpoint's own
/// messages whenever its subscriber observes them.
///
/// ## Example
///
/// ```
/// use std::sync::mpsc;
/// use std::time::Duration;
/// use typed_bus::broker::{BrokerConfig, BrokerTransport, InMemoryBroker};
/// use typed_bus::{event_map, Bus, Handler};
///
/// event_map! {
///     struct OrderPlaced: "order.placed" => u64;
/// }
///
/// let broker = InMemoryBroker::new();
/// let transport = BrokerTransport::connect(
///     broker.clone(),
///     broker.latest_subscriber(),
///     BrokerConfig::default().with_origin("orders"),
/// )
/// .unwrap();
/// let bus = Bus::new(transport);
///
/// let (tx, rx) = mpsc::channel();
/// let tx = std::sync::Mutex::new(tx);
/// bus.on::<OrderPlaced>(Handler::new(move |id: &u64| {
///     tx.lock().unwrap().send(*id).unwrap();
/// }));
///
/// bus.emit::<OrderPlaced>(42);
/// assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), 42);
/// bus.clear();
/// ```
pub struct BrokerTransport<P: Publisher> {
    publisher: P,
    origin: String,
    sequence: AtomicU64,
    table: Arc<SubscriberTable<Inbound>>,
    stats: Arc<Mutex<BrokerStats>>,
    closed: AtomicBool,
    stop_tx: Mutex<Option<Sender<()>>>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl<P: Publisher> BrokerTransport<P> {
    /// Connect to a broker and start the poller thread.
    ///
    /// Fails with [`TransportError::Unavailable`] if the thread cannot start.
    pub fn connect<S>(publisher: P, subscriber: S, config: BrokerConfig) -> Result<Self, TransportError>
    where
        S: Subscriber + 'static,
    {
        let (stop_tx, stop_rx) = mpsc::channel();
        let table = Arc::new(SubscriberTable::new());
        let stats = Arc::new(Mutex::new(BrokerStats::default()));

        let poller = Poller {
            subscriber,
            table: Arc::clone(&table),
            stats: Arc::clone(&stats),
            reporter: config.reporter.unwrap_or_else(log_reporter),
            poll_interval: config.poll_interval,
        };
        let handle = thread::Builder::new()
            .name(config.thread_name)
            .spawn(move || poller.run(stop_rx))
            .map_err(|e| {
                TransportError::unavailable(format!("cannot start broker poller: {}", e))
            })?;

        tracing::debug!(origin = %config.origin, "broker transport connected");
        Ok(Self {
            publisher,
            origin: config.origin,
            sequence: AtomicU64::new(0),
            table,
            stats,
            closed: AtomicBool::new(false),
            stop_tx: Mutex::new(Some(stop_tx)),
            poller: Mutex::new(Some(handle)),
        })
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    pub fn stats(&self) -> BrokerStats {
        self.stats.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of live subscriptions for `event` on this endpoint.
    pub fn subscriber_count(&self, event: &str) -> usize {
        self.table.len(event)
    }
}

impl<P: Publisher> Transport for BrokerTransport<P> {
    fn publish<E: Event>(&self, payload: E::Payload) -> Result<(), TransportError> {
        if self.is_closed() {
            tracing::debug!(event = E::NAME, "publish on closed broker transport ignored");
            return Ok(());
        }

        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let id = format!("{}-{}", self.origin, seq);
        let message =
            Message::encode(id, E::NAME, &payload).map_err(|source| TransportError::Encode {
                event: E::NAME.to_string(),
                source,
            })?;

        self.publisher
            .publish(message)
            .map_err(|source| TransportError::Broker {
                event: E::NAME.to_string(),
                source,
            })
    }

    fn subscribe<E: Event>(&self, handler: Handler<E::Payload>) -> Subscription {
        let inbound: Inbound = Arc::new(move |bytes: &[u8]| -> Result<(), serde_json::Error> {
            let payload: E::Payload = serde_json::from_slice(bytes)?;
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
        self.table.clear();
        if let Some(stop_tx) = self.stop_tx.lock().take() {
            let _ = stop_tx.send(());
        }

        let poller = self.poller.lock().take();
        if let Some(handle) = poller {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
        tracing::debug!(origin = %self.origin, stats = ?self.stats(), "broker transport closed");
    }
}

impl<P: Publisher> Drop for BrokerTransport<P> {
    fn drop(&mut self) {
        self.close();
    }
}

struct Poller<S> {
    subscriber: S,
    table: Arc<SubscriberTable<Inbound>>,
    stats: Arc<Mutex<BrokerStats>>,
    reporter: ErrorReporter,
    poll_interval: Duration,
}

impl<S: Subscriber> Poller<S> {
    fn run(self, stop_rx: Receiver<()>) {
        let timeout_ms = self.poll_interval.as_millis() as u64;

        loop {
            match stop_rx.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => break,
                Err(TryRecvError::Empty) => {}
            }

            self.stats.lock().polls += 1;

            match self.subscriber.poll(timeout_ms) {
                Ok(Some(message)) => self.deliver(&message),
                Ok(None) => {}
                Err(err) => {
                    (self.reporter)(&TransportError::Receive(err));
                    // A failing broker usually fails fast; don't spin on it.
                    thread::sleep(self.poll_interval);
                }
            }
        }
    }

    fn deliver(&self, message: &Message) {
        let mut tally = PanicTally::default();
        let mut undecodable = None;
        let inbounds = self.table.snapshot(&message.event_type);
        let routed = !inbounds.is_empty();

        for inbound in inbounds {
            let mut decoded = Ok(());
            tally.isolate(|| decoded = inbound(&message.payload));
            if let Err(source) = decoded {
                undecodable = Some(source);
            }
        }

        let settled = match undecodable {
            None => {
                let mut stats = self.stats.lock();
                if routed {
                    stats.handled += 1;
                } else {
                    stats.unrouted += 1;
                }
                drop(stats);
                self.subscriber.ack(&message.id)
            }
            Some(source) => {
                self.stats.lock().dropped += 1;
                tracing::warn!(event = %message.event_type, id = %message.id, "dropping undecodable message");
                let settled = self.subscriber.nack(&message.id, &source.to_string());
                (self.reporter)(&TransportError::Decode {
                    event: message.event_type.clone(),
                    source,
                });
                settled
            }
        };
        if let Err(source) = settled {
            tracing::debug!(id = %message.id, "failed to settle broker message");
            (self.reporter)(&TransportError::Broker {
                event: message.event_type.clone(),
                source,
            });
        }

        if let Err(err) = tally.into_result(&message.event_type) {
            (self.reporter)(&err);
        }
    }
}
