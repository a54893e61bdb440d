//! Broadcast transport integration tests.

mod failures;

use serde::{Deserialize, Serialize};
use typed_bus::event_map;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
    pub tab: String,
    pub x: i64,
    pub y: i64,
}

event_map! {
    pub struct CursorMoved: "cursor.moved" => Cursor;
    pub struct Counter: "counter" => u32;
    /// Same name as `Counter`, incompatible payload.
    pub struct CounterText: "counter" => String;
}
