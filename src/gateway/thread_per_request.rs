//! Thread-per-request routing engine.
//!
//! Each inbound request gets one dedicated lightweight task end-to-end; the
//! task stays parked for the entire downstream wait. Concurrency cost is
//! task creation and scheduler bookkeeping, not OS thread stacks. The code
//! shape stays as close to naive blocking forwarding as possible.

use super::{forward, ForwardReply, ForwardRequest};
use crate::error::ApiError;

pub struct ThreadPerRequest {
    client: reqwest::Client,
    backend_url: String,
}

impl ThreadPerRequest {
    pub fn new(client: reqwest::Client, backend_url: String) -> Self {
        Self {
            client,
            backend_url,
        }
    }

    /// Forward one request on its own dedicated task.
    ///
    /// If the caller goes away before the downstream answers, the detached
    /// task still runs to completion of the forward (bounded by the
    /// downstream delay) and is then released; nothing leaks.
    pub async fn handle(&self, request: ForwardRequest) -> Result<ForwardReply, ApiError> {
        let client = self.client.clone();
        let backend_url = self.backend_url.clone();

        let unit = tokio::spawn(async move {
            forward(&client, &backend_url, &request.path).await
        });

        unit.await
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("request task failed: {}", e)))?
    }
}
