//! Broker transport integration tests.
