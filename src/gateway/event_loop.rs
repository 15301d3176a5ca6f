//! Event-loop routing engine.
//!
//! A small fixed pool of worker loops is built once at startup; each worker
//! multiplexes many in-flight forwards, yielding at the downstream await
//! instead of blocking. Memory and CPU are bounded by the worker count, not
//! the number of logically concurrent requests. Replies route back to the
//! original caller over per-request oneshot channels.

use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{mpsc, oneshot};

use super::{forward, ForwardReply, ForwardRequest};
use crate::error::ApiError;

/// Queue depth per worker before senders start to apply backpressure
const WORKER_QUEUE_DEPTH: usize = 1024;

struct Job {
    request: ForwardRequest,
    reply: oneshot::Sender<Result<ForwardReply, ApiError>>,
}

pub struct EventLoopPool {
    /// One queue per worker; jobs are dealt round-robin
    queues: Vec<mpsc::Sender<Job>>,
    next: AtomicUsize,
}

impl EventLoopPool {
    /// Spin up `workers` worker loops. Dropping the pool closes the queues;
    /// each worker then drains its in-flight forwards and stops.
    pub fn new(workers: usize, client: reqwest::Client, backend_url: String) -> Self {
        let workers = workers.max(1);
        let mut queues = Vec::with_capacity(workers);

        for id in 0..workers {
            let (tx, rx) = mpsc::channel(WORKER_QUEUE_DEPTH);
            queues.push(tx);
            tokio::spawn(worker_loop(id, rx, client.clone(), backend_url.clone()));
        }

        tracing::info!(workers, "event-loop pool started");
        Self {
            queues,
            next: AtomicUsize::new(0),
        }
    }

    pub fn workers(&self) -> usize {
        self.queues.len()
    }

    /// Enqueue one request and await its reply.
    ///
    /// If the caller goes away before the reply arrives, the worker's send
    /// into the closed oneshot simply fails and the slot is released; the
    /// pool never grows with abandoned requests.
    pub async fn handle(&self, request: ForwardRequest) -> Result<ForwardReply, ApiError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.queues.len();

        self.queues[idx]
            .send(Job {
                request,
                reply: reply_tx,
            })
            .await
            .map_err(|_| ApiError::Internal(anyhow::anyhow!("worker pool is shut down")))?;

        reply_rx
            .await
            .map_err(|_| ApiError::Internal(anyhow::anyhow!("worker dropped the request")))?
    }
}

/// One worker loop: pull jobs from its queue and drive all of its in-flight
/// forwards concurrently. The worker does zero CPU work for a request while
/// it waits downstream.
async fn worker_loop(
    id: usize,
    mut jobs: mpsc::Receiver<Job>,
    client: reqwest::Client,
    backend_url: String,
) {
    let mut in_flight = FuturesUnordered::new();

    loop {
        tokio::select! {
            job = jobs.recv() => match job {
                Some(job) => {
                    let client = client.clone();
                    let backend_url = backend_url.clone();
                    in_flight.push(async move {
                        let result = forward(&client, &backend_url, &job.request.path).await;
                        // Caller may have timed out and gone; discarding is fine
                        let _ = job.reply.send(result);
                    });
                }
                None => break,
            },
            Some(()) = in_flight.next(), if !in_flight.is_empty() => {}
        }
    }

    // Queue closed: finish whatever is still in flight, then stop
    while in_flight.next().await.is_some() {}
    tracing::debug!(worker = id, "event-loop worker drained and stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, Json, Router};
    use serde_json::json;
    use std::sync::Arc;

    async fn spawn_stub_backend() -> String {
        let app = Router::new().route(
            "/delay/ms/:ms",
            get(|axum::extract::Path(ms): axum::extract::Path<u64>| async move {
                tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
                Json(json!({"ms": ms, "actual_delay_ms": ms, "thread": "stub"}))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_pool_clamps_to_one_worker() {
        let pool = EventLoopPool::new(0, reqwest::Client::new(), "http://x".to_string());
        assert_eq!(pool.workers(), 1);
    }

    #[tokio::test]
    async fn test_forwards_through_pool() {
        let backend_url = spawn_stub_backend().await;
        let pool = EventLoopPool::new(2, reqwest::Client::new(), backend_url);

        let reply = pool
            .handle(ForwardRequest {
                path: "/delay/ms/5".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(reply.status, 200);
        let body: serde_json::Value = serde_json::from_slice(&reply.body).unwrap();
        assert_eq!(body["ms"], 5);
    }

    #[tokio::test]
    async fn test_small_pool_carries_many_concurrent_requests() {
        // 200 concurrent 20ms requests through 4 workers; with one request
        // per worker at a time this would take a second, multiplexed it
        // finishes in a small multiple of the delay.
        let backend_url = spawn_stub_backend().await;
        let pool = Arc::new(EventLoopPool::new(4, reqwest::Client::new(), backend_url));

        let start = std::time::Instant::now();
        let mut handles = Vec::new();
        for _ in 0..200 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move {
                pool.handle(ForwardRequest {
                    path: "/delay/ms/20".to_string(),
                })
                .await
            }));
        }

        for handle in handles {
            let reply = handle.await.unwrap().unwrap();
            assert_eq!(reply.status, 200);
        }
        assert!(start.elapsed() < std::time::Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_abandoned_caller_releases_slot() {
        let backend_url = spawn_stub_backend().await;
        let pool = Arc::new(EventLoopPool::new(1, reqwest::Client::new(), backend_url));

        // Abandon a slow request partway through
        let slow = {
            let pool = pool.clone();
            tokio::spawn(async move {
                pool.handle(ForwardRequest {
                    path: "/delay/ms/500".to_string(),
                })
                .await
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        slow.abort();

        // The single worker still serves new requests
        let reply = pool
            .handle(ForwardRequest {
                path: "/delay/ms/5".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(reply.status, 200);
    }
}
