#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

//! # Streambridge
//!
//! Streambridge is an HTTP to Apache Kafka protocol bridge: a RESTful API
//! for producing records to Kafka topics and consuming records from them
//! without speaking the native Kafka wire protocol.
//!
//! Clients create named consumer instances inside a consumer group,
//! subscribe them to topics or topic patterns, poll for batches of records,
//! commit offsets, seek, and delete the instance again. Producers post
//! record batches and receive per-record offset metadata.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run with defaults (listens on 0.0.0.0:8080, Kafka on localhost:9092)
//! $ ./streambridge
//!
//! # Run against a remote cluster with a custom bridge id
//! $ ./streambridge --bootstrap-servers kafka1:9092,kafka2:9092 --bridge-id edge
//! ```
//!
//! ```bash
//! # Create a consumer, subscribe it, poll
//! $ curl -X POST localhost:8080/consumers/my-group \
//!     -H 'Content-Type: application/vnd.kafka.v2+json' \
//!     -d '{"name": "my-consumer", "format": "json"}'
//! $ curl -X POST localhost:8080/consumers/my-group/instances/my-consumer/subscription \
//!     -H 'Content-Type: application/vnd.kafka.v2+json' \
//!     -d '{"topics": ["events"]}'
//! $ curl localhost:8080/consumers/my-group/instances/my-consumer/records \
//!     -H 'Accept: application/vnd.kafka.json.v2+json'
//! ```
//!
//! ## Architecture
//!
//! - [`server`]: HTTP surface, routers, health endpoints and shutdown
//! - [`bridge`]: the session layer mapping HTTP requests onto long-lived
//!   Kafka sessions (classification, format negotiation, codec, registry)
//! - [`kafka`]: the client seam and its rdkafka-backed implementations
//! - [`config`]: configuration and CLI arguments
//! - [`error`]: error types and `Result` alias
//! - [`testing`]: in-memory Kafka fakes for tests
//!
//! ## Library Usage
//!
//! ```no_run
//! use streambridge::{Result, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = ServerConfig::default();
//!     config.validate()?;
//!     streambridge::server::run_server(config).await
//! }
//! ```

pub mod bridge;
pub mod config;
pub mod error;
pub mod kafka;
pub mod server;
pub mod testing;

pub use config::{ServerArgs, ServerConfig};
pub use error::{BridgeError, Result};
