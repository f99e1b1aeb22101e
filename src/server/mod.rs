//! HTTP server and REST API
//!
//! The server binds the session registry to the HTTP surface: the consumer
//! API under `/consumers`, the producer API under `/topics`, health
//! endpoints and the error envelope shared by all of them.

pub mod consumer_api;
pub mod http;
pub mod producer_api;
pub mod shutdown;

pub use http::{build_router, run_server, start_http_server, HttpServerState};
pub use shutdown::ShutdownCoordinator;

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::bridge::format;
use crate::error::BridgeError;

/// A payload-carrying request arrived without one
pub(crate) const MSG_EMPTY_PAYLOAD: &str = "The request cannot have empty payload";

/// The error envelope of the REST contract; `error_code` equals the HTTP
/// status of the response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error_code: i32,
    pub message: String,
}

impl ErrorBody {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            error_code: status.as_u16() as i32,
            message: message.into(),
        }
    }
}

/// Render a bridge error as the enveloped JSON response
pub(crate) fn error_response(err: &BridgeError) -> Response {
    let status = err.http_status();
    let body = ErrorBody::new(status, err.to_string());
    (
        status,
        [(header::CONTENT_TYPE, format::KAFKA_JSON)],
        Json(body),
    )
        .into_response()
}

/// Render an enveloped error from a bare status and message
pub(crate) fn status_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, format::KAFKA_JSON)],
        Json(ErrorBody::new(status, message)),
    )
        .into_response()
}
