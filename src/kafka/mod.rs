//! Kafka client seam
//!
//! The bridge talks to Kafka through the two handle traits defined here so
//! the session layer stays independent of the client library. The real
//! implementations wrap rdkafka; the [`crate::testing`] module provides
//! in-memory stand-ins for tests.

mod consumer;
mod producer;

pub use consumer::BridgeConsumer;
pub use producer::BridgeProducer;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::KafkaConfig;
use crate::error::Result;

/// A record fetched from Kafka, before envelope encoding
#[derive(Debug, Clone)]
pub struct ConsumedRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub value: Option<Vec<u8>>,
}

/// A committed position for one partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionOffset {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub metadata: Option<String>,
}

/// A manual assignment entry, optionally with a starting position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionAssignment {
    pub topic: String,
    pub partition: i32,
    pub offset: Option<i64>,
}

/// Where a seek should move the position of a partition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekTarget {
    Offset(i64),
    Beginning,
    End,
}

/// Parameters for constructing the Kafka consumer behind an instance
#[derive(Debug, Clone)]
pub struct ConsumerSpec {
    /// Kafka consumer group
    pub group_id: String,
    /// `client.id`, always the instance name
    pub client_id: String,
    /// `auto.offset.reset` (latest, earliest, none)
    pub auto_offset_reset: String,
    /// `enable.auto.commit`
    pub enable_auto_commit: bool,
    /// `fetch.min.bytes`, when the creation body sets it
    pub fetch_min_bytes: Option<i64>,
    /// `request.timeout.ms`, when the creation body sets it
    pub request_timeout_ms: Option<i64>,
}

/// The consumer operations a session needs.
///
/// Operations on one handle are never issued concurrently; the session
/// registry serializes access per instance.
#[async_trait]
pub trait ConsumerHandle: Send + Sync {
    fn subscribe(&self, topics: &[String]) -> Result<()>;

    fn subscribe_pattern(&self, pattern: &str) -> Result<()>;

    fn unsubscribe(&self) -> Result<()>;

    fn assign(&self, partitions: &[PartitionAssignment]) -> Result<()>;

    /// Wait up to `timeout` for records, draining at most `max_records`
    async fn poll(&self, timeout: Duration, max_records: usize) -> Result<Vec<ConsumedRecord>>;

    /// Commit the given offsets synchronously
    async fn commit(&self, offsets: &[PartitionOffset]) -> Result<()>;

    /// Commit the most recently delivered offsets for the assigned
    /// partitions
    async fn commit_current(&self) -> Result<()>;

    async fn seek(&self, topic: &str, partition: i32, target: SeekTarget) -> Result<()>;
}

/// The producer operations a session needs
#[async_trait]
pub trait ProducerHandle: Send + Sync {
    /// Send one record and await its delivery metadata
    async fn send(
        &self,
        topic: &str,
        partition: Option<i32>,
        key: Option<Vec<u8>>,
        payload: Vec<u8>,
    ) -> Result<(i32, i64)>;

    /// Queue one record without awaiting delivery
    fn send_forget(
        &self,
        topic: &str,
        partition: Option<i32>,
        key: Option<Vec<u8>>,
        payload: Vec<u8>,
    ) -> Result<()>;
}

/// Creates the Kafka handles sessions own
pub trait KafkaClientFactory: Send + Sync {
    fn create_consumer(&self, spec: &ConsumerSpec) -> Result<Arc<dyn ConsumerHandle>>;

    /// `acks` is the raw Kafka setting ("all", "-1", "0", "1")
    fn create_producer(&self, acks: &str) -> Result<Arc<dyn ProducerHandle>>;
}

/// Factory backed by rdkafka against the configured cluster
pub struct RdkafkaClientFactory {
    kafka: KafkaConfig,
}

impl RdkafkaClientFactory {
    pub fn new(kafka: KafkaConfig) -> Self {
        Self { kafka }
    }
}

impl KafkaClientFactory for RdkafkaClientFactory {
    fn create_consumer(&self, spec: &ConsumerSpec) -> Result<Arc<dyn ConsumerHandle>> {
        Ok(Arc::new(BridgeConsumer::new(&self.kafka, spec)?))
    }

    fn create_producer(&self, acks: &str) -> Result<Arc<dyn ProducerHandle>> {
        Ok(Arc::new(BridgeProducer::new(&self.kafka, acks)?))
    }
}
