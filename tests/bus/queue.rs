use std::cell::RefCell;

use typed_bus::{Bus, LocalTransport, QueuedEvent};

use crate::support::{recording, Log, Other, E};

// =============================================================================
// enqueue / drain
// =============================================================================

#[test]
fn enqueue_alone_runs_no_handler() {
    let bus = Bus::local();
    let log = Log::new();
    bus.on::<E>(recording(&log));

    bus.enqueue::<E>(1);
    bus.enqueue::<E>(2);

    assert!(log.entries().is_empty());
    assert_eq!(bus.queued_len(), 2);
}

#[test]
fn drain_emits_in_enqueue_order_once() {
    let bus = Bus::local();
    let log = Log::new();
    bus.on::<E>(recording(&log));

    bus.enqueue::<E>(1);
    bus.enqueue::<E>(2);
    bus.enqueue::<E>(3);
    bus.drain();
    assert_eq!(log.entries(), vec![1, 2, 3]);

    bus.drain();
    assert_eq!(log.entries(), vec![1, 2, 3]);
    assert_eq!(bus.queued_len(), 0);
}

#[test]
fn drain_keeps_fifo_order_across_events() {
    let bus = Bus::local();
    let log = Log::new();
    bus.on::<E>(recording(&log));
    bus.on::<Other>(recording(&log));

    bus.enqueue::<E>(1);
    bus.enqueue::<Other>(2);
    bus.enqueue::<E>(3);
    bus.drain();

    assert_eq!(log.entries(), vec![1, 2, 3]);
}

#[test]
fn drain_on_empty_queue_is_noop() {
    let bus = Bus::local();
    let mut calls = 0;
    bus.drain();
    bus.drain_with(|_| calls += 1);
    assert_eq!(calls, 0);
}

#[test]
fn custom_processor_replaces_emission() {
    let bus = Bus::local();
    let log = Log::new();
    bus.on::<E>(recording(&log));

    bus.enqueue::<E>(1);
    bus.enqueue::<Other>(2);

    let mut seen = Vec::new();
    bus.drain_with(|event| {
        let value = event
            .payload::<E>()
            .or_else(|| event.payload::<Other>())
            .copied();
        seen.push((event.name(), value));
    });

    assert_eq!(seen, vec![("e", Some(1)), ("other", Some(2))]);
    assert!(log.entries().is_empty());
    assert_eq!(bus.queued_len(), 0);
}

#[test]
fn custom_processor_can_filter_and_forward() {
    let bus = Bus::local();
    let log = Log::new();
    bus.on::<E>(recording(&log));
    bus.on::<Other>(recording(&log));

    for n in 1..=4 {
        bus.enqueue::<E>(n);
        bus.enqueue::<Other>(n * 10);
    }

    bus.drain_with(|event: QueuedEvent<LocalTransport>| {
        if event.is::<E>() {
            event.emit(&bus);
        }
    });

    assert_eq!(log.entries(), vec![1, 2, 3, 4]);
}

#[test]
fn events_enqueued_while_draining_wait_for_next_drain() {
    let bus = Bus::local();
    let mut processed = Vec::new();
    bus.enqueue::<E>(1);
    bus.enqueue::<E>(2);

    bus.drain_with(|event| {
        let n = event.downcast::<E>().unwrap();
        processed.push(n);
        bus.enqueue::<E>(n + 10);
    });

    assert_eq!(processed, vec![1, 2]);
    assert_eq!(bus.queued_len(), 2);

    bus.drain_with(|event| processed.push(event.downcast::<E>().unwrap()));
    assert_eq!(processed, vec![1, 2, 11, 12]);
}

#[test]
fn handlers_enqueueing_during_default_drain_are_deferred() {
    let bus = std::sync::Arc::new(Bus::local());
    let log = Log::new();
    let weak = std::sync::Arc::downgrade(&bus);
    let sink = log.clone();
    bus.on::<E>(typed_bus::Handler::new(move |n: &i32| {
        sink.push(*n);
        if *n < 3 {
            if let Some(bus) = weak.upgrade() {
                bus.enqueue::<E>(n + 1);
            }
        }
    }));

    bus.enqueue::<E>(1);
    bus.drain();
    assert_eq!(log.entries(), vec![1]);

    bus.drain();
    bus.drain();
    bus.drain();
    assert_eq!(log.entries(), vec![1, 2, 3]);
}

#[test]
fn panicking_processor_leaves_the_rest_queued() {
    let bus = Bus::local();
    bus.enqueue::<E>(1);
    bus.enqueue::<E>(2);
    bus.enqueue::<E>(3);

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        bus.drain_with(|event| {
            if event.payload::<E>() == Some(&2) {
                panic!("processor failure");
            }
        });
    }));

    assert!(result.is_err());
    assert_eq!(bus.queued_len(), 1);
}

#[test]
fn clear_inside_processor_stops_the_drain() {
    let bus = Bus::local();
    let mut processed = 0;
    bus.enqueue::<E>(1);
    bus.enqueue::<E>(2);
    bus.enqueue::<E>(3);

    bus.drain_with(|_| {
        processed += 1;
        bus.clear();
        bus.enqueue::<E>(99);
    });

    assert_eq!(processed, 1);
    assert_eq!(bus.queued_len(), 1);
}

#[test]
fn nested_drain_does_not_extend_the_outer_one() {
    let bus = Bus::local();
    let processed = RefCell::new(Vec::new());
    bus.enqueue::<E>(1);
    bus.enqueue::<E>(2);

    bus.drain_with(|event| {
        let n = event.downcast::<E>().unwrap();
        processed.borrow_mut().push(("outer", n));
        if n == 1 {
            bus.drain_with(|inner| {
                let n = inner.downcast::<E>().unwrap();
                processed.borrow_mut().push(("inner", n));
            });
            bus.enqueue::<E>(99);
        }
    });

    assert_eq!(*processed.borrow(), vec![("outer", 1), ("inner", 2)]);
    assert_eq!(bus.queued_len(), 1);
}
