use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use typed_bus::{event_map, Handler};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: u32,
    pub items: Vec<String>,
}

event_map! {
    pub struct E: "e" => i32;
    pub struct Other: "other" => i32;
    pub struct OrderPlaced: "order.placed" => Order;
}

/// Shared log that handlers append to.
#[derive(Clone)]
pub struct Log<T> {
    entries: Arc<Mutex<Vec<T>>>,
}

impl<T: Clone + Send + 'static> Log<T> {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn push(&self, entry: T) {
        self.entries.lock().unwrap().push(entry);
    }

    pub fn entries(&self) -> Vec<T> {
        self.entries.lock().unwrap().clone()
    }
}

/// Handler that appends a fixed tag whenever it runs.
pub fn tagging(log: &Log<i32>, tag: i32) -> Handler<i32> {
    let log = log.clone();
    Handler::new(move |_: &i32| log.push(tag))
}

/// Handler that appends the payload it receives.
pub fn recording(log: &Log<i32>) -> Handler<i32> {
    let log = log.clone();
    Handler::new(move |payload: &i32| log.push(*payload))
}
