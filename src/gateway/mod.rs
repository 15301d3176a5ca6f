//! Routing engine: forwards delay requests to the backend under one of two
//! concurrency disciplines sharing a single external contract.
//!
//! Per request, both engines walk the same states:
//! Received -> Forwarding -> AwaitingDownstream -> Completing -> Responded | Failed.
//! Failed always produces a response; neither engine retries, reorders, or
//! adds latency beyond network and scheduling overhead.

pub mod event_loop;
pub mod thread_per_request;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use bytes::Bytes;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::error::ApiError;

pub use event_loop::EventLoopPool;
pub use thread_per_request::ThreadPerRequest;

/// Application version from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Which concurrency discipline the gateway runs under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineKind {
    #[default]
    ThreadPerRequest,
    EventLoop,
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineKind::ThreadPerRequest => write!(f, "thread-per-request"),
            EngineKind::EventLoop => write!(f, "event-loop"),
        }
    }
}

impl std::str::FromStr for EngineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "thread-per-request" | "tpr" => Ok(EngineKind::ThreadPerRequest),
            "event-loop" | "el" => Ok(EngineKind::EventLoop),
            _ => Err(format!("Unknown engine: {}", s)),
        }
    }
}

/// A request to forward downstream: the path suffix under the backend base URL
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    pub path: String,
}

/// Downstream reply, relayed to the original caller unchanged
#[derive(Debug, Clone)]
pub struct ForwardReply {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// Routing engine selected at startup. The two variants are never mixed
/// within one running instance.
pub enum RoutingEngine {
    ThreadPerRequest(ThreadPerRequest),
    EventLoop(EventLoopPool),
}

impl RoutingEngine {
    /// Build the engine of the given kind against a backend base URL.
    pub fn new(
        kind: EngineKind,
        client: reqwest::Client,
        backend_url: String,
        workers: usize,
    ) -> Self {
        match kind {
            EngineKind::ThreadPerRequest => {
                RoutingEngine::ThreadPerRequest(ThreadPerRequest::new(client, backend_url))
            }
            EngineKind::EventLoop => {
                RoutingEngine::EventLoop(EventLoopPool::new(workers, client, backend_url))
            }
        }
    }

    /// Forward one request and await the downstream reply.
    pub async fn handle(&self, request: ForwardRequest) -> Result<ForwardReply, ApiError> {
        match self {
            RoutingEngine::ThreadPerRequest(engine) => engine.handle(request).await,
            RoutingEngine::EventLoop(pool) => pool.handle(request).await,
        }
    }

    pub fn kind(&self) -> EngineKind {
        match self {
            RoutingEngine::ThreadPerRequest(_) => EngineKind::ThreadPerRequest,
            RoutingEngine::EventLoop(_) => EngineKind::EventLoop,
        }
    }
}

/// Gateway state shared across handlers. The engine is passed explicitly;
/// no request-handling code reaches ambient globals.
#[derive(Clone)]
pub struct GatewayState {
    pub engine: Arc<RoutingEngine>,
}

/// Build the gateway router around an already-initialized engine.
pub fn routes(engine: Arc<RoutingEngine>) -> Router {
    let state = GatewayState { engine };

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/backend/delay/:seconds", get(gateway_delay_seconds))
        .route("/backend/delay/ms/:milliseconds", get(gateway_delay_milliseconds))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET / - Simple health check
async fn root_handler(State(state): State<GatewayState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "Gateway is running",
        "engine": state.engine.kind().to_string(),
        "version": VERSION
    }))
}

/// GET /health - Detailed health check
async fn health_handler(State(state): State<GatewayState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "engine": state.engine.kind().to_string(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": VERSION
    }))
}

/// GET /backend/delay/{seconds} - Forward to the backend's seconds route.
///
/// The path parameter is relayed as an opaque string so the backend keeps
/// sole ownership of validation; its 400s come back unchanged.
async fn gateway_delay_seconds(
    State(state): State<GatewayState>,
    Path(seconds): Path<String>,
) -> Result<Response, ApiError> {
    let reply = state
        .engine
        .handle(ForwardRequest {
            path: format!("/delay/{}", seconds),
        })
        .await?;
    Ok(relay(reply))
}

/// GET /backend/delay/ms/{milliseconds} - Forward to the backend's ms route
async fn gateway_delay_milliseconds(
    State(state): State<GatewayState>,
    Path(milliseconds): Path<String>,
) -> Result<Response, ApiError> {
    let reply = state
        .engine
        .handle(ForwardRequest {
            path: format!("/delay/ms/{}", milliseconds),
        })
        .await?;
    Ok(relay(reply))
}

/// Relay a downstream reply verbatim: status, content type, body.
fn relay(reply: ForwardReply) -> Response {
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut builder = Response::builder().status(status);
    if let Some(content_type) = reply.content_type {
        builder = builder.header(header::CONTENT_TYPE, content_type);
    }
    builder
        .body(Body::from(reply.body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Issue the downstream GET and collect the reply.
///
/// Any HTTP status is a valid reply to relay; only transport-level failures
/// become errors. Connect failures classify as `DownstreamUnavailable` so the
/// caller sees a gateway error rather than a hang.
pub(crate) async fn forward(
    client: &reqwest::Client,
    backend_url: &str,
    path: &str,
) -> Result<ForwardReply, ApiError> {
    let url = format!("{}{}", backend_url, path);
    tracing::debug!(url = %url, "Forwarding request downstream");

    let response = client.get(&url).send().await.map_err(|e| {
        if e.is_connect() {
            ApiError::DownstreamUnavailable(format!("cannot reach backend at {}: {}", url, e))
        } else if e.is_timeout() {
            ApiError::DownstreamUnavailable(format!("backend timed out at {}: {}", url, e))
        } else {
            ApiError::Internal(anyhow::anyhow!("forward to {} failed: {}", url, e))
        }
    })?;

    let status = response.status().as_u16();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = response
        .bytes()
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("reading backend body failed: {}", e)))?;

    Ok(ForwardReply {
        status,
        content_type,
        body,
    })
}
