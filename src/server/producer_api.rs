//! HTTP REST API for producing records
//!
//! ## Endpoints
//!
//! - `POST /topics/{topic}` - Produce records to a topic
//!
//! The embedded format of the request is declared through its
//! `Content-Type`. The producer session is bound to the HTTP connection and
//! torn down when it closes.

use axum::body::Bytes;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;

use super::{error_response, status_response, MSG_EMPTY_PAYLOAD};
use crate::bridge::codec::ProduceRequest;
use crate::bridge::{format::EmbeddedFormat, SessionRegistry};

/// Shared state for the producer API
#[derive(Clone)]
pub(crate) struct ProducerApiState {
    /// Session registry holding the per-connection producers
    pub registry: Arc<SessionRegistry>,
}

/// Create the producer API router
pub(crate) fn create_producer_api_router(state: ProducerApiState) -> Router {
    Router::new()
        .route("/topics/:topic", post(produce))
        .with_state(state)
}

/// Produce a batch of records to a topic
async fn produce(
    State(state): State<ProducerApiState>,
    Path(topic): Path<String>,
    ConnectInfo(connection): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    // the declared format gates everything else
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let format = match EmbeddedFormat::from_content_type(content_type) {
        Ok(format) => format,
        Err(e) => return error_response(&e),
    };

    if body.is_empty() {
        return status_response(StatusCode::UNPROCESSABLE_ENTITY, MSG_EMPTY_PAYLOAD);
    }
    let request: ProduceRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => return status_response(StatusCode::BAD_REQUEST, &e.to_string()),
    };

    let session = state.registry.producer_session(connection);
    match session.send_records(&topic, format, &request.records).await {
        Ok(response) => {
            debug!(
                topic = %topic,
                connection = %connection,
                records = response.offsets.len(),
                "Produce request served"
            );
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, crate::bridge::format::KAFKA_JSON)],
                Json(response),
            )
                .into_response()
        }
        Err(e) => error_response(&e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::format::{KAFKA_JSON_BINARY, KAFKA_JSON_JSON};
    use crate::config::{ConsumerDefaults, ProducerDefaults};
    use crate::testing::FakeCluster;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::Value;
    use tower::util::ServiceExt;

    fn test_router(cluster: &Arc<FakeCluster>) -> Router {
        let registry = Arc::new(SessionRegistry::new(
            cluster.factory(),
            "bridge".to_string(),
            ConsumerDefaults::default(),
            ProducerDefaults::default(),
        ));
        create_producer_api_router(ProducerApiState { registry })
    }

    fn produce_request(topic: &str, content_type: &str, body: &str) -> Request<Body> {
        let mut request = Request::builder()
            .method("POST")
            .uri(format!("/topics/{}", topic))
            .header("content-type", content_type)
            .body(Body::from(body.to_string()))
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo::<SocketAddr>("127.0.0.1:4242".parse().unwrap()));
        request
    }

    #[tokio::test]
    async fn test_produce_json_records() {
        let cluster = FakeCluster::shared();
        let app = test_router(&cluster);

        let response = app
            .oneshot(produce_request(
                "orders",
                KAFKA_JSON_JSON,
                r#"{"records":[{"key":"k1","value":{"qty":1}},{"value":"second"}]}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let parsed: Value = serde_json::from_slice(&body).unwrap();
        let offsets = parsed["offsets"].as_array().unwrap();
        assert_eq!(offsets.len(), 2);
        assert_eq!(offsets[0]["offset"], 0);
        assert_eq!(offsets[1]["offset"], 1);

        let sent = cluster.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].key.as_deref(), Some(br#""k1""#.as_slice()));
        assert_eq!(sent[1].key, None);
    }

    #[tokio::test]
    async fn test_produce_wrong_content_type_is_406() {
        let cluster = FakeCluster::shared();
        let app = test_router(&cluster);

        let response = app
            .oneshot(produce_request(
                "orders",
                "application/json",
                r#"{"records":[{"value":"x"}]}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
        assert!(cluster.sent().is_empty());
    }

    #[tokio::test]
    async fn test_produce_empty_body_is_422() {
        let cluster = FakeCluster::shared();
        let app = test_router(&cluster);

        let response = app
            .oneshot(produce_request("orders", KAFKA_JSON_BINARY, ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_produce_malformed_body_is_400() {
        let cluster = FakeCluster::shared();
        let app = test_router(&cluster);

        let response = app
            .oneshot(produce_request("orders", KAFKA_JSON_JSON, r#"{"nope":1}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
