//! Bus - registrations, dispatch, and the deferred event queue.
//!
//! ```text
//!   on / once / off ──► Registry ──► Transport::subscribe / Subscription
//!   emit ─────────────────────────► Transport::publish
//!   enqueue ──► EventQueue ──drain──► processor (default: emit)
//!   clear ──► empty queue + registry, then Transport::close
//! ```

#[allow(clippy::module_inception)]
mod bus;
mod queue;
mod registry;

pub use bus::Bus;
pub use queue::QueuedEvent;
