//! rdkafka-backed producer handle

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;
use tracing::debug;

use super::ProducerHandle;
use crate::config::KafkaConfig;
use crate::error::{BridgeError, Result};

/// Delivery timeout for awaited sends
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Producer handle backed by an rdkafka `FutureProducer`
pub struct BridgeProducer {
    inner: FutureProducer,
}

impl BridgeProducer {
    pub fn new(kafka: &KafkaConfig, acks: &str) -> Result<Self> {
        let inner: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &kafka.bootstrap_servers)
            .set("acks", acks)
            .create()
            .map_err(|e| BridgeError::Kafka(e.to_string()))?;

        debug!(acks = %acks, "Created Kafka producer");

        Ok(Self { inner })
    }
}

#[async_trait]
impl ProducerHandle for BridgeProducer {
    async fn send(
        &self,
        topic: &str,
        partition: Option<i32>,
        key: Option<Vec<u8>>,
        payload: Vec<u8>,
    ) -> Result<(i32, i64)> {
        let mut record: FutureRecord<'_, Vec<u8>, Vec<u8>> =
            FutureRecord::to(topic).payload(&payload);
        if let Some(ref key) = key {
            record = record.key(key);
        }
        if let Some(partition) = partition {
            record = record.partition(partition);
        }

        match self.inner.send(record, Timeout::After(DELIVERY_TIMEOUT)).await {
            Ok((partition, offset)) => Ok((partition, offset)),
            Err((e, _)) => Err(BridgeError::Kafka(e.to_string())),
        }
    }

    fn send_forget(
        &self,
        topic: &str,
        partition: Option<i32>,
        key: Option<Vec<u8>>,
        payload: Vec<u8>,
    ) -> Result<()> {
        let mut record: FutureRecord<'_, Vec<u8>, Vec<u8>> =
            FutureRecord::to(topic).payload(&payload);
        if let Some(ref key) = key {
            record = record.key(key);
        }
        if let Some(partition) = partition {
            record = record.partition(partition);
        }

        // queue only; delivery outcome is intentionally not observed
        match self.inner.send_result(record) {
            Ok(_) => Ok(()),
            Err((e, _)) => Err(BridgeError::Kafka(e.to_string())),
        }
    }
}
