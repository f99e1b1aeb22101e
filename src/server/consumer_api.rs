//! HTTP REST API for consumer instances
//!
//! ## Endpoints
//!
//! - `POST /consumers/{group}` - Create a consumer instance
//! - `DELETE /consumers/{group}/instances/{name}` - Delete an instance
//! - `POST /consumers/{group}/instances/{name}/subscription` - Subscribe
//! - `DELETE /consumers/{group}/instances/{name}/subscription` - Unsubscribe
//! - `POST /consumers/{group}/instances/{name}/assignments` - Manual assign
//! - `GET /consumers/{group}/instances/{name}/records` - Poll records
//! - `POST /consumers/{group}/instances/{name}/offsets` - Commit offsets
//! - `POST /consumers/{group}/instances/{name}/positions` - Seek
//! - `POST /consumers/{group}/instances/{name}/positions/beginning` - Seek to beginning
//! - `POST /consumers/{group}/instances/{name}/positions/end` - Seek to end

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use super::{error_response, status_response, MSG_EMPTY_PAYLOAD};
use crate::bridge::consumer::{MSG_SUBSCRIPTION_CONFLICT, MSG_SUBSCRIPTION_REQUIRED};
use crate::bridge::registry::ConsumerCreateOptions;
use crate::bridge::{format, forwarded, SessionRegistry};
use crate::kafka::{PartitionAssignment, PartitionOffset, SeekTarget};

/// Shared state for the consumer API
#[derive(Clone)]
pub(crate) struct ConsumerApiState {
    /// Session registry holding the live instances
    pub registry: Arc<SessionRegistry>,
}

/// Consumer creation request. Unknown properties are rejected with a
/// schema validation error.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateConsumerRequest {
    pub name: Option<String>,
    pub format: Option<String>,
    #[serde(rename = "auto.offset.reset")]
    pub auto_offset_reset: Option<String>,
    #[serde(rename = "enable.auto.commit")]
    pub enable_auto_commit: Option<bool>,
    #[serde(rename = "fetch.min.bytes")]
    pub fetch_min_bytes: Option<i64>,
    #[serde(rename = "consumer.request.timeout.ms")]
    pub request_timeout_ms: Option<i64>,
}

/// Consumer creation response
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateConsumerResponse {
    pub instance_id: String,
    pub base_uri: String,
}

/// Subscription request; exactly one of the two fields must be present
#[derive(Debug, Deserialize)]
pub struct SubscriptionRequest {
    pub topics: Option<Vec<String>>,
    pub topic_pattern: Option<String>,
}

/// Manual assignment request
#[derive(Debug, Deserialize)]
pub struct AssignmentsRequest {
    pub partitions: Vec<AssignmentEntry>,
}

/// One manually assigned partition, optionally with a starting position
#[derive(Debug, Deserialize)]
pub struct AssignmentEntry {
    pub topic: String,
    pub partition: i32,
    pub offset: Option<i64>,
}

/// Offsets list used by commit and seek
#[derive(Debug, Deserialize)]
pub struct OffsetsBody {
    pub offsets: Vec<OffsetEntry>,
}

/// One partition offset
#[derive(Debug, Deserialize)]
pub struct OffsetEntry {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub metadata: Option<String>,
}

/// Partition list used by seek-to-beginning and seek-to-end
#[derive(Debug, Deserialize)]
pub struct PositionsBody {
    pub partitions: Vec<PartitionEntry>,
}

/// One partition reference
#[derive(Debug, Deserialize)]
pub struct PartitionEntry {
    pub topic: String,
    pub partition: i32,
}

/// Query parameters of a poll; both values are sticky on the session
#[derive(Debug, Deserialize)]
pub struct PollQuery {
    pub timeout: Option<u64>,
    pub max_bytes: Option<u64>,
}

/// Create the consumer API router
pub(crate) fn create_consumer_api_router(state: ConsumerApiState) -> Router {
    Router::new()
        .route("/consumers/:group", post(create_consumer))
        .route(
            "/consumers/:group/instances/:name",
            delete(delete_consumer),
        )
        .route(
            "/consumers/:group/instances/:name/subscription",
            post(subscribe).delete(unsubscribe),
        )
        .route(
            "/consumers/:group/instances/:name/assignments",
            post(assign),
        )
        .route(
            "/consumers/:group/instances/:name/records",
            get(poll_records),
        )
        .route(
            "/consumers/:group/instances/:name/offsets",
            post(commit_offsets),
        )
        .route("/consumers/:group/instances/:name/positions", post(seek))
        .route(
            "/consumers/:group/instances/:name/positions/beginning",
            post(seek_to_beginning),
        )
        .route(
            "/consumers/:group/instances/:name/positions/end",
            post(seek_to_end),
        )
        .with_state(state)
}

/// Create a consumer instance in a group
async fn create_consumer(
    State(state): State<ConsumerApiState>,
    Path(group_id): Path<String>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if body.is_empty() {
        return status_response(StatusCode::UNPROCESSABLE_ENTITY, MSG_EMPTY_PAYLOAD);
    }
    let request: CreateConsumerRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        // schema validation contract: malformed/unknown properties are 400
        Err(e) => return status_response(StatusCode::BAD_REQUEST, &e.to_string()),
    };

    let options = ConsumerCreateOptions {
        name: request.name,
        format: request.format,
        auto_offset_reset: request.auto_offset_reset,
        enable_auto_commit: request.enable_auto_commit,
        fetch_min_bytes: request.fetch_min_bytes,
        request_timeout_ms: request.request_timeout_ms,
    };

    let created = state.registry.create_consumer(&group_id, options, |name| {
        forwarded::consumer_instance_uri(&headers, uri.path(), name)
    });

    match created {
        Ok((entry, base_uri)) => {
            entry.touch();
            let response = CreateConsumerResponse {
                instance_id: entry.name().to_string(),
                base_uri,
            };
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, format::KAFKA_JSON)],
                Json(response),
            )
                .into_response()
        }
        Err(e) => error_response(&e),
    }
}

/// Delete a consumer instance
async fn delete_consumer(
    State(state): State<ConsumerApiState>,
    Path((_group, name)): Path<(String, String)>,
) -> Response {
    match state.registry.delete_consumer(&name) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(&e),
    }
}

/// Subscribe an instance to topics or a topic pattern
async fn subscribe(
    State(state): State<ConsumerApiState>,
    Path((_group, name)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    let entry = match state.registry.get_consumer(&name) {
        Ok(entry) => entry,
        Err(e) => return error_response(&e),
    };

    if body.is_empty() {
        return status_response(StatusCode::UNPROCESSABLE_ENTITY, MSG_EMPTY_PAYLOAD);
    }
    let request: SubscriptionRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => return status_response(StatusCode::BAD_REQUEST, &e.to_string()),
    };

    let result = match (request.topics, request.topic_pattern) {
        (Some(_), Some(_)) => {
            return status_response(StatusCode::CONFLICT, MSG_SUBSCRIPTION_CONFLICT);
        }
        (None, None) => {
            return status_response(StatusCode::UNPROCESSABLE_ENTITY, MSG_SUBSCRIPTION_REQUIRED);
        }
        (Some(topics), None) => entry.lock().await.subscribe_topics(&topics),
        (None, Some(pattern)) => entry.lock().await.subscribe_pattern(&pattern),
    };

    match result {
        Ok(()) => {
            entry.touch();
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => error_response(&e),
    }
}

/// Drop an instance's subscription
async fn unsubscribe(
    State(state): State<ConsumerApiState>,
    Path((_group, name)): Path<(String, String)>,
) -> Response {
    let entry = match state.registry.get_consumer(&name) {
        Ok(entry) => entry,
        Err(e) => return error_response(&e),
    };

    let result = match entry.lock().await.unsubscribe() {
        Ok(()) => {
            entry.touch();
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => error_response(&e),
    };
    result
}

/// Manually assign partitions; replaces any subscription
async fn assign(
    State(state): State<ConsumerApiState>,
    Path((_group, name)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    let entry = match state.registry.get_consumer(&name) {
        Ok(entry) => entry,
        Err(e) => return error_response(&e),
    };

    if body.is_empty() {
        return status_response(StatusCode::UNPROCESSABLE_ENTITY, MSG_EMPTY_PAYLOAD);
    }
    let request: AssignmentsRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => return status_response(StatusCode::BAD_REQUEST, &e.to_string()),
    };

    let partitions: Vec<PartitionAssignment> = request
        .partitions
        .into_iter()
        .map(|entry| PartitionAssignment {
            topic: entry.topic,
            partition: entry.partition,
            offset: entry.offset,
        })
        .collect();

    let result = match entry.lock().await.assign(&partitions) {
        Ok(()) => {
            entry.touch();
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => error_response(&e),
    };
    result
}

/// Poll the instance for records
async fn poll_records(
    State(state): State<ConsumerApiState>,
    Path((_group, name)): Path<(String, String)>,
    Query(query): Query<PollQuery>,
    headers: HeaderMap,
) -> Response {
    let entry = match state.registry.get_consumer(&name) {
        Ok(entry) => entry,
        Err(e) => return error_response(&e),
    };

    // the Accept header must match the format fixed at creation
    let accept = headers.get(header::ACCEPT).and_then(|v| v.to_str().ok());
    if let Err(e) = entry.format().check_accept(accept) {
        return error_response(&e);
    }

    let result = entry.lock().await.poll(query.timeout, query.max_bytes).await;
    match result {
        Ok(body) => {
            entry.touch();
            debug!(instance = %name, bytes = body.len(), "Records delivered");
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, entry.format().content_type())],
                body,
            )
                .into_response()
        }
        Err(e) => error_response(&e),
    }
}

/// Commit offsets: the listed ones, or the last delivered positions when
/// the request has no body
async fn commit_offsets(
    State(state): State<ConsumerApiState>,
    Path((_group, name)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    let entry = match state.registry.get_consumer(&name) {
        Ok(entry) => entry,
        Err(e) => return error_response(&e),
    };

    let offsets = if body.is_empty() {
        None
    } else {
        match serde_json::from_slice::<OffsetsBody>(&body) {
            Ok(request) => Some(to_partition_offsets(request)),
            Err(e) => return status_response(StatusCode::BAD_REQUEST, &e.to_string()),
        }
    };

    let result = match entry.lock().await.commit(offsets).await {
        Ok(()) => {
            entry.touch();
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => error_response(&e),
    };
    result
}

/// Seek each listed partition to the given offset
async fn seek(
    State(state): State<ConsumerApiState>,
    Path((_group, name)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    let entry = match state.registry.get_consumer(&name) {
        Ok(entry) => entry,
        Err(e) => return error_response(&e),
    };

    if body.is_empty() {
        return status_response(StatusCode::UNPROCESSABLE_ENTITY, MSG_EMPTY_PAYLOAD);
    }
    let request: OffsetsBody = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => return status_response(StatusCode::BAD_REQUEST, &e.to_string()),
    };

    let offsets = to_partition_offsets(request);
    let result = match entry.lock().await.seek(&offsets).await {
        Ok(()) => {
            entry.touch();
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => error_response(&e),
    };
    result
}

async fn seek_to_beginning(
    state: State<ConsumerApiState>,
    path: Path<(String, String)>,
    body: Bytes,
) -> Response {
    seek_to_edge(state, path, body, SeekTarget::Beginning).await
}

async fn seek_to_end(
    state: State<ConsumerApiState>,
    path: Path<(String, String)>,
    body: Bytes,
) -> Response {
    seek_to_edge(state, path, body, SeekTarget::End).await
}

/// Seek the listed partitions to the beginning or end of their logs
async fn seek_to_edge(
    State(state): State<ConsumerApiState>,
    Path((_group, name)): Path<(String, String)>,
    body: Bytes,
    target: SeekTarget,
) -> Response {
    let entry = match state.registry.get_consumer(&name) {
        Ok(entry) => entry,
        Err(e) => return error_response(&e),
    };

    if body.is_empty() {
        return status_response(StatusCode::UNPROCESSABLE_ENTITY, MSG_EMPTY_PAYLOAD);
    }
    let request: PositionsBody = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => return status_response(StatusCode::BAD_REQUEST, &e.to_string()),
    };

    let partitions: Vec<(String, i32)> = request
        .partitions
        .into_iter()
        .map(|entry| (entry.topic, entry.partition))
        .collect();

    let result = match entry.lock().await.seek_to(target, &partitions).await {
        Ok(()) => {
            entry.touch();
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => error_response(&e),
    };
    result
}

fn to_partition_offsets(body: OffsetsBody) -> Vec<PartitionOffset> {
    body.offsets
        .into_iter()
        .map(|entry| PartitionOffset {
            topic: entry.topic,
            partition: entry.partition,
            offset: entry.offset,
            metadata: entry.metadata,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConsumerDefaults, ProducerDefaults};
    use crate::testing::FakeCluster;
    use axum::body::Body;
    use axum::http::Request;
    use tower::util::ServiceExt;

    fn test_router(cluster: &Arc<FakeCluster>) -> Router {
        let registry = Arc::new(SessionRegistry::new(
            cluster.factory(),
            "bridge".to_string(),
            ConsumerDefaults {
                poll_timeout_ms: 10,
                ..ConsumerDefaults::default()
            },
            ProducerDefaults::default(),
        ));
        create_consumer_api_router(ConsumerApiState { registry })
    }

    fn create_request(group: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(format!("/consumers/{}", group))
            .header("content-type", format::KAFKA_JSON)
            .header("host", "bridge.local:8080")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_consumer_returns_instance_and_uri() {
        let cluster = FakeCluster::shared();
        let app = test_router(&cluster);

        let response = app
            .oneshot(create_request(
                "my-group",
                r#"{"name":"my-kafka-consumer","format":"json"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let parsed: CreateConsumerResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed.instance_id, "my-kafka-consumer");
        assert_eq!(
            parsed.base_uri,
            "http://bridge.local:8080/consumers/my-group/instances/my-kafka-consumer"
        );
    }

    #[tokio::test]
    async fn test_create_with_unknown_property_is_400() {
        let cluster = FakeCluster::shared();
        let app = test_router(&cluster);

        let response = app
            .oneshot(create_request("g", r#"{"name":"c1","bogus":true}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_create_with_empty_body_is_422() {
        let cluster = FakeCluster::shared();
        let app = test_router(&cluster);

        let response = app.oneshot(create_request("g", "")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_subscribe_unknown_instance_is_404() {
        let cluster = FakeCluster::shared();
        let app = test_router(&cluster);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/consumers/g/instances/ghost/subscription")
                    .header("content-type", format::KAFKA_JSON)
                    .body(Body::from(r#"{"topics":["t"]}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
