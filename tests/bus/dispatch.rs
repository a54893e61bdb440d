use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use typed_bus::{Bus, Handler, TransportError};

use crate::support::{recording, tagging, Log, Order, OrderPlaced, Other, E};

// =============================================================================
// emit
// =============================================================================

#[test]
fn emit_reaches_every_handler_in_registration_order() {
    let bus = Bus::local();
    let log = Log::new();
    bus.on::<E>(tagging(&log, 1));
    bus.on::<E>(tagging(&log, 2));
    bus.on::<E>(tagging(&log, 3));

    bus.emit::<E>(0);

    assert_eq!(log.entries(), vec![1, 2, 3]);
}

#[test]
fn unsubscribing_one_handler_leaves_the_others() {
    let bus = Bus::local();
    let log = Log::new();
    bus.on::<E>(tagging(&log, 1));
    let second = bus.on::<E>(tagging(&log, 2));
    bus.on::<E>(tagging(&log, 3));

    bus.emit::<E>(0);
    second.unsubscribe();
    bus.emit::<E>(0);

    assert_eq!(log.entries(), vec![1, 2, 3, 1, 3]);
}

#[test]
fn emit_only_reaches_handlers_of_that_event() {
    let bus = Bus::local();
    let log = Log::new();
    bus.on::<E>(tagging(&log, 1));
    bus.on::<Other>(tagging(&log, 2));

    bus.emit::<Other>(0);

    assert_eq!(log.entries(), vec![2]);
}

#[test]
fn emit_without_subscribers_is_silent() {
    let reported = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&reported);
    let bus = Bus::local().with_error_reporter(Arc::new(move |_: &TransportError| {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    bus.emit::<E>(1);

    assert_eq!(reported.load(Ordering::SeqCst), 0);
}

#[test]
fn every_handler_sees_the_same_payload() {
    let bus = Bus::local();
    let seen: Arc<Mutex<Vec<(usize, Order)>>> = Arc::new(Mutex::new(Vec::new()));

    for tag in 0..2 {
        let seen = Arc::clone(&seen);
        bus.on::<OrderPlaced>(Handler::new(move |order: &Order| {
            seen.lock().unwrap().push((tag, order.clone()));
        }));
    }

    let order = Order {
        id: 7,
        items: vec!["tea".into(), "scones".into()],
    };
    bus.emit::<OrderPlaced>(order.clone());

    let seen = seen.lock().unwrap();
    assert_eq!(*seen, vec![(0, order.clone()), (1, order)]);
}

#[test]
fn payload_is_delivered_by_reference_to_one_value() {
    let bus = Bus::local();
    let addresses = Arc::new(Mutex::new(Vec::new()));

    for _ in 0..3 {
        let addresses = Arc::clone(&addresses);
        bus.on::<OrderPlaced>(Handler::new(move |order: &Order| {
            addresses.lock().unwrap().push(order as *const Order as usize);
        }));
    }

    bus.emit::<OrderPlaced>(Order {
        id: 1,
        items: Vec::new(),
    });

    let addresses = addresses.lock().unwrap();
    assert_eq!(addresses.len(), 3);
    assert!(addresses.iter().all(|a| *a == addresses[0]));
}

// =============================================================================
// handler failures
// =============================================================================

#[test]
fn panicking_handler_is_isolated_and_reported() {
    let reports = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&reports);
    let bus = Bus::local().with_error_reporter(Arc::new(move |err: &TransportError| {
        sink.lock().unwrap().push(err.to_string());
    }));
    let log = Log::new();

    bus.on::<E>(recording(&log));
    bus.on::<E>(Handler::new(|_: &i32| panic!("handler exploded")));
    bus.on::<E>(recording(&log));

    bus.emit::<E>(5);

    assert_eq!(log.entries(), vec![5, 5]);
    let reports = reports.lock().unwrap();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].contains("handler exploded"));
}
