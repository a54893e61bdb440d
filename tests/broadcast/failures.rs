use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use typed_bus::{BroadcastConfig, BroadcastHub, Bus, ErrorReporter, Handler, TransportError};

use crate::{Counter, CounterText};

const WAIT: Duration = Duration::from_secs(2);

fn reporter() -> (ErrorReporter, mpsc::Receiver<String>) {
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    let reporter: ErrorReporter = Arc::new(move |err: &TransportError| {
        let _ = tx.lock().unwrap().send(err.to_string());
    });
    (reporter, rx)
}

#[test]
fn malformed_frames_are_dropped_and_reported() {
    let hub = BroadcastHub::new();
    let (reporter, reports) = reporter();
    let receiver = Bus::new(
        hub.connect_with(BroadcastConfig::default().with_error_reporter(reporter))
            .unwrap(),
    );
    let sender = Bus::new(hub.connect().unwrap());

    let (tx, rx) = mpsc::channel();
    receiver.on::<Counter>(Handler::new(move |n: &u32| tx.send(*n).unwrap()));

    hub.post_raw(b"not json at all".to_vec());
    hub.post_raw(br#"{"event":5,"payload":1}"#.to_vec());

    assert!(reports.recv_timeout(WAIT).unwrap().contains("undecodable"));
    assert!(reports.recv_timeout(WAIT).unwrap().contains("undecodable"));

    // The receiver thread survived and keeps delivering.
    sender.emit::<Counter>(4);
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), 4);
}

#[test]
fn payload_of_the_wrong_shape_is_dropped() {
    let hub = BroadcastHub::new();
    let (reporter, reports) = reporter();
    let receiver = Bus::new(
        hub.connect_with(BroadcastConfig::default().with_error_reporter(reporter))
            .unwrap(),
    );
    let sender = Bus::new(hub.connect().unwrap());

    let (tx, rx) = mpsc::channel();
    receiver.on::<Counter>(Handler::new(move |n: &u32| tx.send(*n).unwrap()));

    sender.emit::<CounterText>("seven".to_string());

    let report = reports.recv_timeout(WAIT).unwrap();
    assert!(report.contains("counter"));
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
}

#[test]
fn handler_panic_on_receiver_thread_is_reported() {
    let hub = BroadcastHub::new();
    let (reporter, reports) = reporter();
    let receiver = Bus::new(
        hub.connect_with(BroadcastConfig::default().with_error_reporter(reporter))
            .unwrap(),
    );
    let sender = Bus::new(hub.connect().unwrap());

    let (tx, rx) = mpsc::channel();
    receiver.on::<Counter>(Handler::new(|n: &u32| {
        if *n == 1 {
            panic!("receiver handler failed");
        }
    }));
    receiver.on::<Counter>(Handler::new(move |n: &u32| tx.send(*n).unwrap()));

    sender.emit::<Counter>(1);
    sender.emit::<Counter>(2);

    assert!(reports.recv_timeout(WAIT).unwrap().contains("receiver handler failed"));
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), 1);
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), 2);
}

#[test]
fn connecting_to_a_shut_down_hub_fails() {
    let hub = BroadcastHub::new();
    let existing = hub.connect().unwrap();
    hub.shutdown();

    assert_eq!(hub.peer_count(), 0);
    assert!(matches!(
        hub.connect(),
        Err(TransportError::Unavailable(_))
    ));
    drop(existing);
}
