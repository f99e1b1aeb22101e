//! rdkafka-backed consumer handle
//!
//! Wraps a `StreamConsumer` and exposes the synchronous-looking async
//! operations the session layer works with.

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::Message;
use rdkafka::topic_partition_list::{Offset, TopicPartitionList};
use rdkafka::util::Timeout;
use std::time::Duration;
use tracing::debug;

use super::{ConsumedRecord, ConsumerHandle, ConsumerSpec, PartitionAssignment, PartitionOffset, SeekTarget};
use crate::config::KafkaConfig;
use crate::error::{BridgeError, Result};

/// How long to wait for further records once the first one arrived
const DRAIN_TIMEOUT: Duration = Duration::from_millis(10);

/// Timeout for blocking seek calls into librdkafka
const SEEK_TIMEOUT: Duration = Duration::from_secs(10);

/// Consumer handle backed by an rdkafka `StreamConsumer`.
///
/// The underlying consumer is not reentrant; callers must serialize
/// operations, which the session registry guarantees.
pub struct BridgeConsumer {
    inner: StreamConsumer,
}

impl BridgeConsumer {
    pub fn new(kafka: &KafkaConfig, spec: &ConsumerSpec) -> Result<Self> {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &kafka.bootstrap_servers)
            .set("group.id", &spec.group_id)
            .set("client.id", &spec.client_id)
            .set("auto.offset.reset", &spec.auto_offset_reset)
            .set("enable.auto.commit", spec.enable_auto_commit.to_string());

        if let Some(fetch_min_bytes) = spec.fetch_min_bytes {
            config.set("fetch.min.bytes", fetch_min_bytes.to_string());
        }
        if let Some(request_timeout_ms) = spec.request_timeout_ms {
            config.set("request.timeout.ms", request_timeout_ms.to_string());
        }

        let inner: StreamConsumer = config.create().map_err(map_kafka_error)?;

        debug!(
            group = %spec.group_id,
            client_id = %spec.client_id,
            "Created Kafka consumer"
        );

        Ok(Self { inner })
    }

    fn convert(message: &rdkafka::message::BorrowedMessage<'_>) -> ConsumedRecord {
        ConsumedRecord {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            key: message.key().map(|k| k.to_vec()),
            value: message.payload().map(|v| v.to_vec()),
        }
    }
}

#[async_trait]
impl ConsumerHandle for BridgeConsumer {
    fn subscribe(&self, topics: &[String]) -> Result<()> {
        let refs: Vec<&str> = topics.iter().map(String::as_str).collect();
        self.inner.subscribe(&refs).map_err(map_kafka_error)
    }

    fn subscribe_pattern(&self, pattern: &str) -> Result<()> {
        // librdkafka treats topic names starting with '^' as regex patterns
        let topic = if pattern.starts_with('^') {
            pattern.to_string()
        } else {
            format!("^{}", pattern)
        };
        self.inner.subscribe(&[&topic]).map_err(map_kafka_error)
    }

    fn unsubscribe(&self) -> Result<()> {
        self.inner.unsubscribe();
        Ok(())
    }

    fn assign(&self, partitions: &[PartitionAssignment]) -> Result<()> {
        let mut tpl = TopicPartitionList::new();
        for assignment in partitions {
            match assignment.offset {
                Some(offset) => {
                    tpl.add_partition_offset(
                        &assignment.topic,
                        assignment.partition,
                        Offset::Offset(offset),
                    )
                    .map_err(map_kafka_error)?;
                }
                None => {
                    tpl.add_partition(&assignment.topic, assignment.partition);
                }
            }
        }
        self.inner.assign(&tpl).map_err(map_kafka_error)
    }

    async fn poll(&self, timeout: Duration, max_records: usize) -> Result<Vec<ConsumedRecord>> {
        let mut records = Vec::new();

        // wait up to the poll timeout for the first record
        match tokio::time::timeout(timeout, self.inner.recv()).await {
            Err(_) => return Ok(records),
            Ok(Err(e)) => return Err(map_kafka_error(e)),
            Ok(Ok(message)) => records.push(Self::convert(&message)),
        }

        // drain whatever the consumer already fetched
        while records.len() < max_records {
            match tokio::time::timeout(DRAIN_TIMEOUT, self.inner.recv()).await {
                Err(_) => break,
                Ok(Err(e)) => return Err(map_kafka_error(e)),
                Ok(Ok(message)) => records.push(Self::convert(&message)),
            }
        }

        Ok(records)
    }

    async fn commit(&self, offsets: &[PartitionOffset]) -> Result<()> {
        let mut tpl = TopicPartitionList::new();
        for offset in offsets {
            tpl.add_partition_offset(&offset.topic, offset.partition, Offset::Offset(offset.offset))
                .map_err(map_kafka_error)?;
        }
        self.inner
            .commit(&tpl, CommitMode::Sync)
            .map_err(map_kafka_error)
    }

    async fn commit_current(&self) -> Result<()> {
        self.inner
            .commit_consumer_state(CommitMode::Sync)
            .map_err(map_kafka_error)
    }

    async fn seek(&self, topic: &str, partition: i32, target: SeekTarget) -> Result<()> {
        let offset = match target {
            SeekTarget::Offset(offset) => Offset::Offset(offset),
            SeekTarget::Beginning => Offset::Beginning,
            SeekTarget::End => Offset::End,
        };
        self.inner
            .seek(topic, partition, offset, Timeout::After(SEEK_TIMEOUT))
            .map_err(map_kafka_error)
    }
}

/// Translate client library failures into the bridge error taxonomy.
///
/// Seeking a partition the consumer does not own surfaces as a seek error
/// (librdkafka "Erroneous state"); the REST contract reports it as 404.
fn map_kafka_error(e: KafkaError) -> BridgeError {
    match e {
        KafkaError::Seek(message) => BridgeError::NotFound(message),
        other => BridgeError::Kafka(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdkafka::error::RDKafkaErrorCode;

    #[test]
    fn test_seek_error_maps_to_not_found() {
        let err = map_kafka_error(KafkaError::Seek("Local: Erroneous state".to_string()));
        assert!(matches!(err, BridgeError::NotFound(_)));
        assert_eq!(err.to_string(), "Local: Erroneous state");
    }

    #[test]
    fn test_other_errors_map_to_kafka() {
        let err = map_kafka_error(KafkaError::MessageConsumption(
            RDKafkaErrorCode::UnknownTopicOrPartition,
        ));
        assert!(matches!(err, BridgeError::Kafka(_)));
    }
}
