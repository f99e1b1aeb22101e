//! Producer session
//!
//! One `ProducerSession` exists per live HTTP connection that has produced.
//! It holds up to two Kafka producers: the acks-configured one whose
//! delivery metadata is reported per record, and a fire-and-forget acks=0
//! one. Both are materialised lazily on first use.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

use super::codec::{self, ProduceRecord, ProduceResponse, ProduceResult};
use super::format::EmbeddedFormat;
use crate::error::{BridgeError, Result};
use crate::kafka::{KafkaClientFactory, ProducerHandle};

/// Produce body whose `records` list is empty
pub const MSG_NO_RECORDS: &str = "Records list must contain at least one entry.";

/// Per-connection producer state
pub struct ProducerSession {
    factory: Arc<dyn KafkaClientFactory>,
    acks: String,
    with_metadata: Mutex<Option<Arc<dyn ProducerHandle>>>,
    fire_and_forget: Mutex<Option<Arc<dyn ProducerHandle>>>,
}

impl ProducerSession {
    pub fn new(factory: Arc<dyn KafkaClientFactory>, acks: String) -> Self {
        Self {
            factory,
            acks,
            with_metadata: Mutex::new(None),
            fire_and_forget: Mutex::new(None),
        }
    }

    /// Decode and send a batch, awaiting delivery metadata for each record.
    ///
    /// Decode failures reject the whole request before anything is sent;
    /// delivery failures are reported per record so a partial batch can
    /// succeed. The response preserves submission order.
    pub async fn send_records(
        &self,
        topic: &str,
        format: EmbeddedFormat,
        records: &[ProduceRecord],
    ) -> Result<ProduceResponse> {
        if records.is_empty() {
            return Err(BridgeError::Semantic(MSG_NO_RECORDS.to_string()));
        }

        let mut decoded = Vec::with_capacity(records.len());
        for record in records {
            let (key, value) = codec::decode_produce_record(format, record)?;
            decoded.push((key, value, record.partition));
        }

        let producer = self.metadata_producer()?;
        let mut offsets = Vec::with_capacity(decoded.len());
        for (key, value, partition) in decoded {
            match producer.send(topic, partition, key, value).await {
                Ok((partition, offset)) => {
                    debug!(topic = %topic, partition = partition, offset = offset, "Record produced");
                    offsets.push(ProduceResult::Ok { partition, offset });
                }
                Err(e) => {
                    offsets.push(ProduceResult::Err {
                        error_code: e.http_status().as_u16() as i32,
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(ProduceResponse { offsets })
    }

    /// Queue a record on the acks=0 producer without observing delivery.
    /// Not reachable from the HTTP surface.
    pub fn send_settled(
        &self,
        topic: &str,
        partition: Option<i32>,
        key: Option<Vec<u8>>,
        payload: Vec<u8>,
    ) -> Result<()> {
        self.settled_producer()?
            .send_forget(topic, partition, key, payload)
    }

    fn metadata_producer(&self) -> Result<Arc<dyn ProducerHandle>> {
        let mut guard = self.with_metadata.lock();
        if let Some(ref producer) = *guard {
            return Ok(producer.clone());
        }
        let producer = self.factory.create_producer(&self.acks)?;
        *guard = Some(producer.clone());
        Ok(producer)
    }

    fn settled_producer(&self) -> Result<Arc<dyn ProducerHandle>> {
        let mut guard = self.fire_and_forget.lock();
        if let Some(ref producer) = *guard {
            return Ok(producer.clone());
        }
        let producer = self.factory.create_producer("0")?;
        *guard = Some(producer.clone());
        Ok(producer)
    }
}
