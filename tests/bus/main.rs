//! Bus integration tests over the local transport.

mod support;
mod dispatch;
mod queue;
