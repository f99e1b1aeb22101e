//! Error types for the bridge
//!
//! This module defines the main error type used throughout the bridge and
//! provides the mapping to HTTP status codes for the REST error contract.

use axum::http::StatusCode;
use thiserror::Error;

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Main error type for the bridge
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed or schema-rejected request body
    #[error("{0}")]
    Validation(String),

    /// Well-formed but forbidden request content
    #[error("{0}")]
    Semantic(String),

    /// Duplicate instance name or conflicting subscription payload
    #[error("{0}")]
    Conflict(String),

    /// Missing consumer instance or seek against an unassigned partition
    #[error("{0}")]
    NotFound(String),

    /// `Accept`/`Content-Type` does not match the embedded format
    #[error("{0}")]
    NotAcceptable(String),

    /// Surfaced broker or client library failure, message passed verbatim
    #[error("{0}")]
    Kafka(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    /// Create a configuration error with context
    pub fn config(setting: &str, reason: impl Into<String>) -> Self {
        BridgeError::Config(format!("{}: {}", setting, reason.into()))
    }

    /// Create a server error with context
    pub fn server(operation: &str, detail: impl Into<String>) -> Self {
        BridgeError::Server(format!("{}: {}", operation, detail.into()))
    }

    /// Convert this error to the HTTP status code of the REST contract.
    ///
    /// The error envelope's `error_code` field equals this status.
    pub fn http_status(&self) -> StatusCode {
        match self {
            BridgeError::Validation(_) => StatusCode::BAD_REQUEST,
            BridgeError::Semantic(_) => StatusCode::UNPROCESSABLE_ENTITY,
            BridgeError::Conflict(_) => StatusCode::CONFLICT,
            BridgeError::NotFound(_) => StatusCode::NOT_FOUND,
            BridgeError::NotAcceptable(_) => StatusCode::NOT_ACCEPTABLE,
            BridgeError::Kafka(_)
            | BridgeError::Io(_)
            | BridgeError::Config(_)
            | BridgeError::Server(_)
            | BridgeError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_io_error_display() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: BridgeError = io_err.into();
        assert!(err.to_string().contains("IO error"));
    }

    #[test]
    fn test_kafka_error_is_verbatim() {
        let err = BridgeError::Kafka("Broker: Unknown topic or partition".to_string());
        assert_eq!(err.to_string(), "Broker: Unknown topic or partition");
    }

    #[test]
    fn test_config_builder() {
        let err = BridgeError::config("bootstrap_servers", "must not be empty");
        assert_eq!(
            err.to_string(),
            "Configuration error: bootstrap_servers: must not be empty"
        );
    }

    #[test]
    fn test_http_status_mapping() {
        let cases = vec![
            (
                BridgeError::Validation("bad body".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                BridgeError::Semantic("Invalid format type.".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                BridgeError::Conflict("duplicate".into()),
                StatusCode::CONFLICT,
            ),
            (
                BridgeError::NotFound("missing".into()),
                StatusCode::NOT_FOUND,
            ),
            (
                BridgeError::NotAcceptable("accept mismatch".into()),
                StatusCode::NOT_ACCEPTABLE,
            ),
            (
                BridgeError::Kafka("broker down".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                BridgeError::Internal("boom".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(
                err.http_status(),
                expected,
                "Error {:?} should map to {:?}",
                err,
                expected
            );
        }
    }
}
