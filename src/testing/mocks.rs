//! In-memory Kafka fakes
//!
//! `FakeCluster` models just enough of a broker for the session layer:
//! partitions are append-only vectors, consumers track per-partition
//! positions, and commits are recorded for assertions. It implements
//! [`KafkaClientFactory`] so it can be plugged straight into a
//! `SessionRegistry` under test.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{BridgeError, Result};
use crate::kafka::{
    ConsumedRecord, ConsumerHandle, ConsumerSpec, KafkaClientFactory, PartitionAssignment,
    PartitionOffset, ProducerHandle, SeekTarget,
};

#[derive(Debug, Clone)]
struct StoredRecord {
    key: Option<Vec<u8>>,
    value: Vec<u8>,
}

/// A record handed to a fake producer, kept for assertions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentRecord {
    pub topic: String,
    pub partition: i32,
    pub key: Option<Vec<u8>>,
    pub payload: Vec<u8>,
}

/// In-memory cluster shared by the fake handles it creates
#[derive(Default)]
pub struct FakeCluster {
    partitions: Mutex<HashMap<(String, i32), Vec<StoredRecord>>>,
    committed: Mutex<Vec<(String, i32, i64)>>,
    sent: Mutex<Vec<SentRecord>>,
    consumer_specs: Mutex<Vec<ConsumerSpec>>,
    producer_acks: Mutex<Vec<String>>,
    fail_next_commit: AtomicBool,
    poison_payload: Mutex<Option<Vec<u8>>>,
}

impl FakeCluster {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Append a record directly to a partition
    pub fn seed(&self, topic: &str, partition: i32, key: Option<&[u8]>, value: &[u8]) {
        self.partitions
            .lock()
            .entry((topic.to_string(), partition))
            .or_default()
            .push(StoredRecord {
                key: key.map(|k| k.to_vec()),
                value: value.to_vec(),
            });
    }

    /// Create a consumer handle with its own positions
    pub fn consumer(self: &Arc<Self>) -> Arc<FakeConsumer> {
        Arc::new(FakeConsumer {
            cluster: self.clone(),
            subscription: Mutex::new(FakeSubscription::None),
            positions: Mutex::new(HashMap::new()),
        })
    }

    /// Create a producer handle appending to this cluster
    pub fn producer(self: &Arc<Self>) -> Arc<FakeProducer> {
        Arc::new(FakeProducer {
            cluster: self.clone(),
        })
    }

    /// This cluster as a factory for the registry seam
    pub fn factory(self: &Arc<Self>) -> Arc<dyn KafkaClientFactory> {
        Arc::new(self.clone())
    }

    /// All commits observed, in order, as `(topic, partition, offset)`
    pub fn committed(&self) -> Vec<(String, i32, i64)> {
        self.committed.lock().clone()
    }

    /// All records produced through fake producers, in send order
    pub fn sent(&self) -> Vec<SentRecord> {
        self.sent.lock().clone()
    }

    /// Specs of every consumer created through the factory seam
    pub fn consumer_specs(&self) -> Vec<ConsumerSpec> {
        self.consumer_specs.lock().clone()
    }

    /// acks values of every producer created through the factory seam
    pub fn producer_acks(&self) -> Vec<String> {
        self.producer_acks.lock().clone()
    }

    /// Make the next commit fail with a broker-style error
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Make delivery fail for records with exactly this payload
    pub fn fail_delivery_for(&self, payload: &[u8]) {
        *self.poison_payload.lock() = Some(payload.to_vec());
    }

    fn partition_len(&self, topic: &str, partition: i32) -> i64 {
        self.partitions
            .lock()
            .get(&(topic.to_string(), partition))
            .map(|records| records.len() as i64)
            .unwrap_or(0)
    }
}

impl KafkaClientFactory for Arc<FakeCluster> {
    fn create_consumer(&self, spec: &ConsumerSpec) -> Result<Arc<dyn ConsumerHandle>> {
        self.consumer_specs.lock().push(spec.clone());
        Ok(self.consumer())
    }

    fn create_producer(&self, acks: &str) -> Result<Arc<dyn ProducerHandle>> {
        self.producer_acks.lock().push(acks.to_string());
        Ok(self.producer())
    }
}

#[derive(Debug, Clone)]
enum FakeSubscription {
    None,
    Topics(Vec<String>),
    Pattern(String),
    Assigned(Vec<(String, i32)>),
}

/// Consumer handle over a [`FakeCluster`]
pub struct FakeConsumer {
    cluster: Arc<FakeCluster>,
    subscription: Mutex<FakeSubscription>,
    positions: Mutex<HashMap<(String, i32), i64>>,
}

impl FakeConsumer {
    /// The partitions this consumer currently reads, in deterministic order
    fn sources(&self) -> Vec<(String, i32)> {
        let subscription = self.subscription.lock().clone();
        let partitions = self.cluster.partitions.lock();
        let mut sources: Vec<(String, i32)> = match subscription {
            FakeSubscription::None => Vec::new(),
            FakeSubscription::Topics(topics) => partitions
                .keys()
                .filter(|(topic, _)| topics.contains(topic))
                .cloned()
                .collect(),
            FakeSubscription::Pattern(pattern) => match regex::Regex::new(&pattern) {
                Ok(re) => partitions
                    .keys()
                    .filter(|(topic, _)| re.is_match(topic))
                    .cloned()
                    .collect(),
                Err(_) => Vec::new(),
            },
            FakeSubscription::Assigned(assigned) => assigned,
        };
        sources.sort();
        sources
    }

    fn owns(&self, topic: &str, partition: i32) -> bool {
        match &*self.subscription.lock() {
            FakeSubscription::None => false,
            FakeSubscription::Topics(topics) => topics.iter().any(|t| t == topic),
            FakeSubscription::Pattern(pattern) => regex::Regex::new(pattern)
                .map(|re| re.is_match(topic))
                .unwrap_or(false),
            FakeSubscription::Assigned(assigned) => assigned
                .iter()
                .any(|(t, p)| t == topic && *p == partition),
        }
    }
}

#[async_trait]
impl ConsumerHandle for FakeConsumer {
    fn subscribe(&self, topics: &[String]) -> Result<()> {
        *self.subscription.lock() = FakeSubscription::Topics(topics.to_vec());
        Ok(())
    }

    fn subscribe_pattern(&self, pattern: &str) -> Result<()> {
        *self.subscription.lock() = FakeSubscription::Pattern(pattern.to_string());
        Ok(())
    }

    fn unsubscribe(&self) -> Result<()> {
        *self.subscription.lock() = FakeSubscription::None;
        Ok(())
    }

    fn assign(&self, partitions: &[PartitionAssignment]) -> Result<()> {
        let mut positions = self.positions.lock();
        for assignment in partitions {
            if let Some(offset) = assignment.offset {
                positions.insert((assignment.topic.clone(), assignment.partition), offset);
            }
        }
        *self.subscription.lock() = FakeSubscription::Assigned(
            partitions
                .iter()
                .map(|a| (a.topic.clone(), a.partition))
                .collect(),
        );
        Ok(())
    }

    async fn poll(&self, _timeout: Duration, max_records: usize) -> Result<Vec<ConsumedRecord>> {
        let sources = self.sources();
        let partitions = self.cluster.partitions.lock();
        let mut positions = self.positions.lock();
        let mut out = Vec::new();

        for (topic, partition) in sources {
            let Some(stored) = partitions.get(&(topic.clone(), partition)) else {
                continue;
            };
            let position = positions.entry((topic.clone(), partition)).or_insert(0);
            while (*position as usize) < stored.len() && out.len() < max_records {
                let record = &stored[*position as usize];
                out.push(ConsumedRecord {
                    topic: topic.clone(),
                    partition,
                    offset: *position,
                    key: record.key.clone(),
                    value: Some(record.value.clone()),
                });
                *position += 1;
            }
        }

        Ok(out)
    }

    async fn commit(&self, offsets: &[PartitionOffset]) -> Result<()> {
        if self.cluster.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(BridgeError::Kafka("simulated commit failure".to_string()));
        }
        let mut committed = self.cluster.committed.lock();
        for offset in offsets {
            committed.push((offset.topic.clone(), offset.partition, offset.offset));
        }
        Ok(())
    }

    async fn commit_current(&self) -> Result<()> {
        if self.cluster.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(BridgeError::Kafka("simulated commit failure".to_string()));
        }
        let positions = self.positions.lock();
        let mut entries: Vec<_> = positions.iter().collect();
        entries.sort();
        let mut committed = self.cluster.committed.lock();
        for ((topic, partition), position) in entries {
            committed.push((topic.clone(), *partition, *position));
        }
        Ok(())
    }

    async fn seek(&self, topic: &str, partition: i32, target: SeekTarget) -> Result<()> {
        if !self.owns(topic, partition) {
            // librdkafka reports seeks on unowned partitions as state errors
            return Err(BridgeError::NotFound("Local: Erroneous state".to_string()));
        }
        let position = match target {
            SeekTarget::Offset(offset) => offset,
            SeekTarget::Beginning => 0,
            SeekTarget::End => self.cluster.partition_len(topic, partition),
        };
        self.positions
            .lock()
            .insert((topic.to_string(), partition), position);
        Ok(())
    }
}

/// Producer handle over a [`FakeCluster`]
pub struct FakeProducer {
    cluster: Arc<FakeCluster>,
}

impl FakeProducer {
    fn append(
        &self,
        topic: &str,
        partition: Option<i32>,
        key: Option<Vec<u8>>,
        payload: Vec<u8>,
    ) -> Result<(i32, i64)> {
        if let Some(ref poison) = *self.cluster.poison_payload.lock() {
            if *poison == payload {
                return Err(BridgeError::Kafka("simulated delivery failure".to_string()));
            }
        }
        let partition = partition.unwrap_or(0);
        let mut partitions = self.cluster.partitions.lock();
        let records = partitions.entry((topic.to_string(), partition)).or_default();
        let offset = records.len() as i64;
        records.push(StoredRecord {
            key: key.clone(),
            value: payload.clone(),
        });
        self.cluster.sent.lock().push(SentRecord {
            topic: topic.to_string(),
            partition,
            key,
            payload,
        });
        Ok((partition, offset))
    }
}

#[async_trait]
impl ProducerHandle for FakeProducer {
    async fn send(
        &self,
        topic: &str,
        partition: Option<i32>,
        key: Option<Vec<u8>>,
        payload: Vec<u8>,
    ) -> Result<(i32, i64)> {
        self.append(topic, partition, key, payload)
    }

    fn send_forget(
        &self,
        topic: &str,
        partition: Option<i32>,
        key: Option<Vec<u8>>,
        payload: Vec<u8>,
    ) -> Result<()> {
        self.append(topic, partition, key, payload).map(|_| ())
    }
}
