//! Embedded format negotiation
//!
//! Consumer instances are created with an embedded format (`binary` or
//! `json`) that fixes how record keys and values are represented inside the
//! JSON envelope. The format also pins the `Accept` value a poll must carry
//! and the `Content-Type` a produce request declares.

use std::fmt;
use std::str::FromStr;

use crate::error::{BridgeError, Result};

/// Media type for error envelopes and JSON metadata
pub const KAFKA_JSON: &str = "application/vnd.kafka.v2+json";
/// Media type for the `json` embedded format
pub const KAFKA_JSON_JSON: &str = "application/vnd.kafka.json.v2+json";
/// Media type for the `binary` embedded format
pub const KAFKA_JSON_BINARY: &str = "application/vnd.kafka.binary.v2+json";

/// Poll response whose `Accept` does not match the instance format
pub const MSG_ACCEPT_MISMATCH: &str =
    "Consumer format does not match the embedded format requested by the Accept header.";
/// Creation body carrying a format outside {binary, json}
pub const MSG_INVALID_FORMAT: &str = "Invalid format type.";

/// Encoding of keys and values inside the JSON envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddedFormat {
    /// Keys and values are base64 strings
    Binary,
    /// Keys and values are arbitrary JSON
    Json,
}

impl EmbeddedFormat {
    /// The `Content-Type` carried by consume responses of this format
    pub fn content_type(&self) -> &'static str {
        match self {
            EmbeddedFormat::Binary => KAFKA_JSON_BINARY,
            EmbeddedFormat::Json => KAFKA_JSON_JSON,
        }
    }

    /// Resolve the embedded format a produce request declares through its
    /// `Content-Type` header
    pub fn from_content_type(content_type: Option<&str>) -> Result<Self> {
        // parameters after ';' (charset etc.) do not affect the format
        let essence = content_type.map(|ct| ct.split(';').next().unwrap_or(ct).trim());
        match essence {
            Some(KAFKA_JSON_BINARY) => Ok(EmbeddedFormat::Binary),
            Some(KAFKA_JSON_JSON) => Ok(EmbeddedFormat::Json),
            _ => Err(BridgeError::NotAcceptable(format!(
                "Content-Type must be {} or {}.",
                KAFKA_JSON_BINARY, KAFKA_JSON_JSON
            ))),
        }
    }

    /// Check that the `Accept` header of a poll matches this format
    pub fn check_accept(&self, accept: Option<&str>) -> Result<()> {
        let matches = match accept.map(|a| a.split(';').next().unwrap_or(a).trim()) {
            Some(KAFKA_JSON_BINARY) => *self == EmbeddedFormat::Binary,
            Some(KAFKA_JSON_JSON) => *self == EmbeddedFormat::Json,
            _ => false,
        };
        if matches {
            Ok(())
        } else {
            Err(BridgeError::NotAcceptable(MSG_ACCEPT_MISMATCH.to_string()))
        }
    }
}

impl FromStr for EmbeddedFormat {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "binary" => Ok(EmbeddedFormat::Binary),
            "json" => Ok(EmbeddedFormat::Json),
            _ => Err(BridgeError::Semantic(MSG_INVALID_FORMAT.to_string())),
        }
    }
}

impl fmt::Display for EmbeddedFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmbeddedFormat::Binary => write!(f, "binary"),
            EmbeddedFormat::Json => write!(f, "json"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_parse_format() {
        assert_eq!(
            "binary".parse::<EmbeddedFormat>().unwrap(),
            EmbeddedFormat::Binary
        );
        assert_eq!(
            "json".parse::<EmbeddedFormat>().unwrap(),
            EmbeddedFormat::Json
        );
    }

    #[test]
    fn test_parse_invalid_format() {
        let err = "avro".parse::<EmbeddedFormat>().unwrap_err();
        assert_eq!(err.http_status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.to_string(), "Invalid format type.");
    }

    #[test]
    fn test_accept_matches_format() {
        assert!(EmbeddedFormat::Binary
            .check_accept(Some(KAFKA_JSON_BINARY))
            .is_ok());
        assert!(EmbeddedFormat::Json
            .check_accept(Some(KAFKA_JSON_JSON))
            .is_ok());
    }

    #[test]
    fn test_accept_mismatch_is_406() {
        let err = EmbeddedFormat::Json
            .check_accept(Some(KAFKA_JSON_BINARY))
            .unwrap_err();
        assert_eq!(err.http_status(), StatusCode::NOT_ACCEPTABLE);
        assert_eq!(err.to_string(), MSG_ACCEPT_MISMATCH);
    }

    #[test]
    fn test_missing_accept_is_406() {
        assert!(EmbeddedFormat::Binary.check_accept(None).is_err());
    }

    #[test]
    fn test_accept_ignores_parameters() {
        assert!(EmbeddedFormat::Json
            .check_accept(Some("application/vnd.kafka.json.v2+json; charset=utf-8"))
            .is_ok());
    }

    #[test]
    fn test_produce_content_type() {
        assert_eq!(
            EmbeddedFormat::from_content_type(Some(KAFKA_JSON_BINARY)).unwrap(),
            EmbeddedFormat::Binary
        );
        assert_eq!(
            EmbeddedFormat::from_content_type(Some(KAFKA_JSON_JSON)).unwrap(),
            EmbeddedFormat::Json
        );
        assert!(EmbeddedFormat::from_content_type(Some("application/json")).is_err());
        assert!(EmbeddedFormat::from_content_type(None).is_err());
    }

    #[test]
    fn test_response_content_types() {
        assert_eq!(EmbeddedFormat::Binary.content_type(), KAFKA_JSON_BINARY);
        assert_eq!(EmbeddedFormat::Json.content_type(), KAFKA_JSON_JSON);
    }
}
