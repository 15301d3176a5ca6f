//! Delay simulator backend.
//!
//! Suspends the serving task for a requested duration and reports how long
//! the wait actually took, plus the identity of the worker thread that
//! resumed it. The wait is pure suspension; no CPU-bound work happens on
//! behalf of a request.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tower_http::trace::TraceLayer;

use crate::error::ApiError;

/// Application version from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Shared state for the delay service
#[derive(Clone)]
pub struct BackendState {
    /// Flipped to true when the server begins shutting down; in-flight
    /// waits observe it and fail with `Interrupted` instead of completing.
    shutdown: watch::Receiver<bool>,
}

/// Timing metadata produced after a completed wait
#[derive(Debug, Clone, Serialize)]
pub struct DelayResult {
    pub requested_ms: u64,
    pub actual_elapsed_ms: u64,
    pub executor_id: String,
}

/// Build the backend router.
///
/// The caller keeps the `watch::Sender` and flips it to `true` on shutdown
/// so in-flight waits are interrupted rather than silently completed.
pub fn routes(shutdown: watch::Receiver<bool>) -> Router {
    let state = BackendState { shutdown };

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/delay/:seconds", get(delay_seconds_handler))
        .route("/delay/ms/:milliseconds", get(delay_milliseconds_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET / - Simple health check
async fn root_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "Delay backend is running",
        "version": VERSION
    }))
}

/// GET /health - Detailed health check
async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": VERSION
    }))
}

/// GET /delay/{seconds} - Wait the requested number of whole seconds
async fn delay_seconds_handler(
    State(state): State<BackendState>,
    Path(seconds): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let amount = validate_amount(seconds, "seconds")?;
    tracing::info!(
        "Received request to delay for {} seconds on {}",
        amount,
        executor_id()
    );

    let result = perform_delay(Duration::from_secs(amount), state.shutdown.clone()).await?;

    tracing::info!(
        "Finished delay of {} seconds (took {} ms) on {}",
        amount,
        result.actual_elapsed_ms,
        result.executor_id
    );
    Ok(Json(json!({
        "message": format!("Delayed for {} seconds", amount),
        "actual_delay_ms": result.actual_elapsed_ms,
        "thread": result.executor_id,
    })))
}

/// GET /delay/ms/{milliseconds} - Wait the requested number of milliseconds
async fn delay_milliseconds_handler(
    State(state): State<BackendState>,
    Path(milliseconds): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let amount = validate_amount(milliseconds, "milliseconds")?;
    tracing::info!(
        "Received request to delay for {} milliseconds on {}",
        amount,
        executor_id()
    );

    let result = perform_delay(Duration::from_millis(amount), state.shutdown.clone()).await?;

    tracing::info!(
        "Finished delay of {} milliseconds (took {} ms) on {}",
        amount,
        result.actual_elapsed_ms,
        result.executor_id
    );
    Ok(Json(json!({
        "message": format!("Delayed for {} milliseconds", amount),
        "actual_delay_ms": result.actual_elapsed_ms,
        "ms": amount,
        "thread": result.executor_id,
    })))
}

/// Reject negative amounts before any wait happens. Zero is valid.
fn validate_amount(amount: i64, param: &str) -> Result<u64, ApiError> {
    if amount < 0 {
        return Err(ApiError::InvalidArgument(format!(
            "{} must be non-negative, got {}",
            param, amount
        )));
    }
    Ok(amount as u64)
}

/// Suspend the calling task for at least `requested`, measuring wall-clock
/// elapsed time around the suspension with a monotonic clock.
///
/// If shutdown begins before the wait completes, the call fails with
/// `Interrupted`; it never returns a partial result. All timing state is
/// local to the call, so concurrent delays never interfere.
pub async fn perform_delay(
    requested: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> Result<DelayResult, ApiError> {
    let start = Instant::now();

    tokio::select! {
        _ = tokio::time::sleep(requested) => {}
        // A closed channel means the server is tearing down as well
        _ = shutdown.wait_for(|stopped| *stopped) => {
            return Err(ApiError::Interrupted(format!(
                "delay of {} ms aborted by shutdown",
                requested.as_millis()
            )));
        }
    }

    let elapsed = start.elapsed();
    Ok(DelayResult {
        requested_ms: requested.as_millis() as u64,
        actual_elapsed_ms: elapsed.as_millis() as u64,
        executor_id: executor_id(),
    })
}

/// Identity of the OS thread currently driving this task.
///
/// Informational only; callers must never make correctness decisions on it.
pub fn executor_id() -> String {
    let thread = std::thread::current();
    format!("{}/{:?}", thread.name().unwrap_or("unnamed"), thread.id())
}
