//! HTTP server for the bridge
//!
//! Assembles the REST routers, serves them over a hand-rolled accept loop
//! (each connection is tracked so its producer session can be torn down on
//! close) and exposes the health endpoints.

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, Method, StatusCode, Uri};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::{Service, ServiceExt};
use tracing::{debug, info, warn};

use super::consumer_api::{create_consumer_api_router, ConsumerApiState};
use super::producer_api::{create_producer_api_router, ProducerApiState};
use super::shutdown::{ShutdownCoordinator, DEFAULT_DRAIN_TIMEOUT_SECS};
use super::{status_response, MSG_EMPTY_PAYLOAD};
use crate::bridge::{classify, HttpOperation, SessionRegistry};
use crate::config::ServerConfig;
use crate::error::{BridgeError, Result};
use crate::kafka::RdkafkaClientFactory;

/// Shared HTTP server state
#[derive(Clone)]
pub struct HttpServerState {
    /// Session registry for consumers and per-connection producers
    pub registry: Arc<SessionRegistry>,
    /// Shutdown coordinator for connection tracking
    pub shutdown: Arc<ShutdownCoordinator>,
}

/// Assemble the complete bridge router
pub fn build_router(state: &HttpServerState) -> Router {
    let consumer_router = create_consumer_api_router(ConsumerApiState {
        registry: state.registry.clone(),
    });
    let producer_router = create_producer_api_router(ProducerApiState {
        registry: state.registry.clone(),
    });

    Router::new()
        .route("/healthy", get(healthy_handler))
        .route("/ready", get(ready_handler))
        .with_state(state.clone())
        .merge(consumer_router)
        .merge(producer_router)
        .fallback(fallback_handler)
        .layer(middleware::from_fn(classify_requests))
}

/// Run the bridge: build the Kafka factory and registry, start the idle
/// sweeper, serve HTTP until a shutdown signal arrives
pub async fn run_server(config: ServerConfig) -> Result<()> {
    let factory = Arc::new(RdkafkaClientFactory::new(config.kafka.clone()));
    let registry = Arc::new(SessionRegistry::new(
        factory,
        config.bridge_id.clone(),
        config.consumer.clone(),
        config.producer.clone(),
    ));
    let sweeper = registry.spawn_idle_sweeper();
    let shutdown = Arc::new(ShutdownCoordinator::new());

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received shutdown signal");
                    shutdown.initiate_shutdown();
                }
                Err(e) => warn!(error = %e, "Failed to listen for shutdown signal"),
            }
        });
    }

    info!(
        bootstrap_servers = %config.kafka.bootstrap_servers,
        bridge_id = %config.bridge_id,
        "Starting HTTP-Kafka bridge"
    );

    let state = HttpServerState {
        registry,
        shutdown,
    };
    let result = start_http_server(config.http_addr, state).await;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    result
}

/// Bind and serve until shutdown; sessions are closed before the socket is
/// released
pub async fn start_http_server(addr: SocketAddr, state: HttpServerState) -> Result<()> {
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::AddrInUse {
            BridgeError::server(
                "bind",
                format!(
                    "HTTP port {} is already in use. Pick a different port with --http-addr \
                     or stop the existing process.",
                    addr.port()
                ),
            )
        } else {
            BridgeError::server("bind", format!("{}: {}", addr, e))
        }
    })?;

    info!(addr = %addr, "HTTP-Kafka bridge listening");
    serve(listener, state).await
}

async fn serve(listener: TcpListener, state: HttpServerState) -> Result<()> {
    let app = build_router(&state);
    let mut make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    let mut shutdown_rx = state.shutdown.subscribe();

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (socket, remote_addr) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(error = %e, "Failed to accept connection");
                        continue;
                    }
                };
                let service = match make_service.call(remote_addr).await {
                    Ok(service) => service,
                    Err(infallible) => match infallible {},
                };

                state.shutdown.connection_opened();
                let registry = state.registry.clone();
                let shutdown = state.shutdown.clone();

                tokio::spawn(async move {
                    let socket = TokioIo::new(socket);
                    let hyper_service = hyper::service::service_fn(
                        move |request: hyper::Request<hyper::body::Incoming>| {
                            service.clone().oneshot(request.map(Body::new))
                        },
                    );
                    if let Err(e) = hyper::server::conn::http1::Builder::new()
                        .serve_connection(socket, hyper_service)
                        .await
                    {
                        debug!(error = %e, connection = %remote_addr, "Connection error");
                    }
                    // the connection is gone; its producer session goes with it
                    registry.connection_closed(remote_addr);
                    shutdown.connection_closed();
                });
            }
            _ = shutdown_rx.recv() => {
                info!("Stopped accepting connections");
                break;
            }
        }
    }

    state
        .shutdown
        .drain_connections(Duration::from_secs(DEFAULT_DRAIN_TIMEOUT_SECS))
        .await;
    state.registry.shutdown();
    info!("HTTP-Kafka bridge has been shut down");
    Ok(())
}

/// Reject rejection-class requests before routing: known paths served with
/// the wrong method and payload-requiring requests without a payload
async fn classify_requests(request: axum::extract::Request, next: Next) -> Response {
    let has_body = request
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .map(|v| v != "0")
        .unwrap_or_else(|| request.headers().contains_key(header::TRANSFER_ENCODING));

    match classify(request.method(), request.uri().path(), has_body) {
        HttpOperation::Unprocessable => {
            status_response(StatusCode::UNPROCESSABLE_ENTITY, "Unprocessable request.")
        }
        HttpOperation::Empty => status_response(StatusCode::UNPROCESSABLE_ENTITY, MSG_EMPTY_PAYLOAD),
        _ => next.run(request).await,
    }
}

/// Anything the routers did not match is outside the bridge surface
async fn fallback_handler(method: Method, uri: Uri) -> Response {
    debug!(method = %method, path = %uri.path(), "Unmatched request");
    status_response(StatusCode::BAD_REQUEST, "Invalid request")
}

/// Liveness probe handler (always returns OK if the server is running)
async fn healthy_handler() -> Response {
    StatusCode::OK.into_response()
}

/// Readiness probe handler; not ready once shutdown has begun
async fn ready_handler(State(state): State<HttpServerState>) -> Response {
    if state.shutdown.is_shutting_down() {
        StatusCode::SERVICE_UNAVAILABLE.into_response()
    } else {
        StatusCode::OK.into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConsumerDefaults, ProducerDefaults};
    use crate::testing::FakeCluster;
    use axum::http::Request;
    use tower::util::ServiceExt;

    fn test_state() -> HttpServerState {
        let cluster = FakeCluster::shared();
        HttpServerState {
            registry: Arc::new(SessionRegistry::new(
                cluster.factory(),
                "bridge".to_string(),
                ConsumerDefaults::default(),
                ProducerDefaults::default(),
            )),
            shutdown: Arc::new(ShutdownCoordinator::new()),
        }
    }

    #[tokio::test]
    async fn test_healthy_endpoint() {
        let state = test_state();
        let app = build_router(&state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/healthy")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_ready_reflects_shutdown() {
        let state = test_state();
        let app = build_router(&state);

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        state.shutdown.initiate_shutdown();
        let response = app
            .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_unknown_path_is_invalid_request() {
        let state = test_state();
        let app = build_router(&state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/not-a-bridge-path")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_wrong_method_on_known_path_is_unprocessable() {
        let state = test_state();
        let app = build_router(&state);

        let response = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/consumers/my-group")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_empty_payload_rejected_before_routing() {
        let state = test_state();
        let app = build_router(&state);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/consumers/my-group")
                    .header("content-length", "0")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
