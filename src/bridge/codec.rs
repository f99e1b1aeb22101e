//! Record envelope codec
//!
//! Converts between Kafka records and the JSON envelope carried over HTTP.
//! The `binary` format base64-encodes keys and values; the `json` format
//! embeds them as structured JSON.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::format::EmbeddedFormat;
use crate::error::{BridgeError, Result};
use crate::kafka::ConsumedRecord;

/// Produce request body: `{"records": [...]}`
#[derive(Debug, Deserialize)]
pub struct ProduceRequest {
    pub records: Vec<ProduceRecord>,
}

/// One record of a produce request
#[derive(Debug, Deserialize)]
pub struct ProduceRecord {
    #[serde(default)]
    pub key: Option<Value>,
    pub value: Value,
    #[serde(default)]
    pub partition: Option<i32>,
    /// Forces a null record key even when `key` is present
    #[serde(rename = "withNullKey", default)]
    pub with_null_key: bool,
}

/// Produce response body: `{"offsets": [...]}`, one entry per submitted
/// record in submission order
#[derive(Debug, Serialize)]
pub struct ProduceResponse {
    pub offsets: Vec<ProduceResult>,
}

/// Outcome for a single produced record
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ProduceResult {
    Ok { partition: i32, offset: i64 },
    Err { error_code: i32, error: String },
}

/// One consumed record as it appears in a poll response
#[derive(Debug, Serialize, Deserialize)]
pub struct RecordEnvelope {
    pub topic: String,
    pub key: Value,
    pub value: Value,
    pub partition: i32,
    pub offset: i64,
}

/// Encode a batch of consumed records into the response body for the given
/// embedded format. The returned bytes are what the size limit is checked
/// against.
pub fn encode_records(format: EmbeddedFormat, records: &[ConsumedRecord]) -> Result<Vec<u8>> {
    let envelopes: Vec<RecordEnvelope> = records
        .iter()
        .map(|record| {
            Ok(RecordEnvelope {
                topic: record.topic.clone(),
                key: encode_field(format, record.key.as_deref(), "key")?,
                value: encode_field(format, record.value.as_deref(), "value")?,
                partition: record.partition,
                offset: record.offset,
            })
        })
        .collect::<Result<_>>()?;

    serde_json::to_vec(&envelopes).map_err(|e| BridgeError::Internal(e.to_string()))
}

fn encode_field(format: EmbeddedFormat, bytes: Option<&[u8]>, field: &str) -> Result<Value> {
    let Some(bytes) = bytes else {
        return Ok(Value::Null);
    };
    match format {
        EmbeddedFormat::Binary => Ok(Value::String(BASE64.encode(bytes))),
        EmbeddedFormat::Json => serde_json::from_slice(bytes).map_err(|_| {
            BridgeError::NotAcceptable(format!("Failed to decode record {} as JSON.", field))
        }),
    }
}

/// Decode the key and value of a produce record into the bytes handed to
/// the producer. The key is `None` (a null-keyed Kafka record) when
/// `withNullKey` is set or no `key` is given.
pub fn decode_produce_record(
    format: EmbeddedFormat,
    record: &ProduceRecord,
) -> Result<(Option<Vec<u8>>, Vec<u8>)> {
    let key = match record.key {
        _ if record.with_null_key => None,
        Some(Value::Null) | None => None,
        Some(ref key) => Some(decode_field(format, key, "key")?),
    };
    let value = decode_field(format, &record.value, "value")?;
    Ok((key, value))
}

fn decode_field(format: EmbeddedFormat, value: &Value, field: &str) -> Result<Vec<u8>> {
    match format {
        EmbeddedFormat::Binary => {
            let encoded = value.as_str().ok_or_else(|| {
                BridgeError::Semantic(format!(
                    "The record {} must be a base64-encoded string.",
                    field
                ))
            })?;
            BASE64.decode(encoded).map_err(|_| {
                BridgeError::Semantic(format!(
                    "The record {} is not valid base64.",
                    field
                ))
            })
        }
        EmbeddedFormat::Json => {
            serde_json::to_vec(value).map_err(|e| BridgeError::Internal(e.to_string()))
        }
    }
}
