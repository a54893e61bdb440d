//! FIFO buffer behind `enqueue` / `drain`.

use std::any::Any;
use std::collections::VecDeque;
use std::fmt;

use super::Bus;
use crate::{Event, Transport};

type ErasedPayload = Box<dyn Any + Send + Sync>;

/// One buffered `(event, payload)` pair, handed to drain processors.
///
/// The payload stays typed behind the event it was enqueued for: inspect it
/// with [`payload`](QueuedEvent::payload) or take it with
/// [`downcast`](QueuedEvent::downcast). [`emit`](QueuedEvent::emit) performs
/// the default processing.
pub struct QueuedEvent<T: Transport> {
    name: &'static str,
    payload: ErasedPayload,
    emit: fn(&Bus<T>, ErasedPayload),
}

impl<T: Transport> QueuedEvent<T> {
    pub(crate) fn new<E: Event>(payload: E::Payload) -> Self {
        Self {
            name: E::NAME,
            payload: Box::new(payload),
            emit: emit_erased::<T, E>,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is<E: Event>(&self) -> bool {
        self.name == E::NAME && self.payload.is::<E::Payload>()
    }

    pub fn payload<E: Event>(&self) -> Option<&E::Payload> {
        if self.name != E::NAME {
            return None;
        }
        self.payload.downcast_ref::<E::Payload>()
    }

    /// Takes the payload out, or gives the event back if it is not an `E`.
    pub fn downcast<E: Event>(self) -> Result<E::Payload, Self> {
        if !self.is::<E>() {
            return Err(self);
        }
        let Self {
            name,
            payload,
            emit,
        } = self;
        match payload.downcast::<E::Payload>() {
            Ok(payload) => Ok(*payload),
            Err(payload) => Err(Self {
                name,
                payload,
                emit,
            }),
        }
    }

    /// Publishes the event on `bus`, exactly as [`Bus::emit`] would.
    pub fn emit(self, bus: &Bus<T>) {
        (self.emit)(bus, self.payload)
    }
}

impl<T: Transport> fmt::Debug for QueuedEvent<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedEvent")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

fn emit_erased<T: Transport, E: Event>(bus: &Bus<T>, payload: ErasedPayload) {
    match payload.downcast::<E::Payload>() {
        Ok(payload) => bus.emit::<E>(*payload),
        Err(_) => tracing::warn!(event = E::NAME, "queued payload has an unexpected type"),
    }
}

/// Queue contents. Every pushed item gets the next sequence number, so a
/// drain can tell items queued before it started from later ones.
pub(crate) struct EventQueue<T: Transport> {
    items: VecDeque<(u64, QueuedEvent<T>)>,
    next_seq: u64,
}

impl<T: Transport> EventQueue<T> {
    pub(crate) fn new() -> Self {
        Self {
            items: VecDeque::new(),
            next_seq: 0,
        }
    }

    pub(crate) fn push(&mut self, event: QueuedEvent<T>) {
        self.items.push_back((self.next_seq, event));
        self.next_seq += 1;
    }

    /// Sequence number the next pushed item will get.
    pub(crate) fn tail(&self) -> u64 {
        self.next_seq
    }

    /// Pops the head only if it was pushed before `tail`.
    pub(crate) fn pop_before(&mut self, tail: u64) -> Option<QueuedEvent<T>> {
        match self.items.front() {
            Some((seq, _)) if *seq < tail => self.items.pop_front().map(|(_, event)| event),
            _ => None,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    /// Drops everything queued; returns how many items were dropped.
    /// Sequence numbers keep counting, so a drain in progress stops here.
    pub(crate) fn clear(&mut self) -> usize {
        let dropped = self.items.len();
        self.items.clear();
        dropped
    }
}
