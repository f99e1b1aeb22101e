//! Test support
//!
//! In-memory stand-ins for the Kafka client handles, used by unit tests and
//! the HTTP integration tests. Nothing here talks to a real broker.

mod mocks;

pub use mocks::{FakeCluster, FakeConsumer, FakeProducer};
