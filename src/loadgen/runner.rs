//! Staged load runner.
//!
//! A stage controller publishes the allowed concurrency on a watch channel,
//! recomputed every tick from the linear ramp schedule. Virtual callers are
//! spawned once for every possible concurrency slot and gate themselves on
//! the published allowance: slot i is active while i < allowed. An active
//! caller loops request, record, pace; nothing short of schedule exhaustion
//! ends the run.

use std::sync::Arc;
use std::time::{Duration, Instant};
use sysinfo::System;
use tokio::sync::watch;

use super::metrics::MetricsCollector;
use super::plan::LoadPlan;
use super::report::RunResult;
use super::schedule::Schedule;
use super::validate::validate_body;

/// Tick on which the stage controller republishes the allowed concurrency
const CONTROL_TICK: Duration = Duration::from_millis(100);

/// How often process CPU/RSS are sampled during the run
const RESOURCE_SAMPLE_INTERVAL: Duration = Duration::from_millis(500);

pub struct LoadRunner {
    plan: LoadPlan,
    client: reqwest::Client,
}

/// Outcome of one request iteration
enum Outcome {
    Success(Duration),
    Failure {
        /// Present when a response arrived before the check failed
        latency: Option<Duration>,
        reason: String,
    },
}

impl LoadRunner {
    pub fn new(plan: LoadPlan) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(plan.timeout)
            .pool_max_idle_per_host(500)
            .build()?;
        Ok(Self { plan, client })
    }

    /// Drive the full schedule, then evaluate thresholds over everything
    /// that was recorded.
    pub async fn run(&self) -> RunResult {
        let schedule = Schedule::new(self.plan.stages.clone());
        let metrics = Arc::new(MetricsCollector::new());
        let url = format!(
            "{}{}",
            self.plan.base_url.trim_end_matches('/'),
            self.plan.path
        );

        let (allow_tx, allow_rx) = watch::channel(0usize);
        let max_callers = schedule.max_concurrency();

        tracing::info!(
            target = %url,
            caller_slots = max_callers,
            schedule_secs = schedule.total_duration().as_secs_f64(),
            "starting load run"
        );

        metrics.start();

        let mut callers = Vec::with_capacity(max_callers);
        for slot in 0..max_callers {
            callers.push(tokio::spawn(virtual_caller(
                slot,
                allow_rx.clone(),
                self.client.clone(),
                url.clone(),
                self.plan.pacing,
                metrics.clone(),
            )));
        }

        let (sampler_stop_tx, mut sampler_stop_rx) = watch::channel(false);
        let sampler = {
            let metrics = metrics.clone();
            tokio::spawn(async move {
                let mut sys = System::new_all();
                loop {
                    tokio::select! {
                        _ = tokio::time::sleep(RESOURCE_SAMPLE_INTERVAL) => {
                            metrics.sample_resources(&mut sys);
                        }
                        _ = sampler_stop_rx.changed() => break,
                    }
                }
            })
        };

        // Stage controller: republish the ramp value until the schedule runs out
        let run_start = Instant::now();
        while let Some(allowed) = schedule.concurrency_at(run_start.elapsed()) {
            if allow_tx.send(allowed).is_err() {
                break;
            }
            tokio::time::sleep(CONTROL_TICK).await;
        }

        // Schedule exhausted: park every caller, then close the channel so
        // they exit once their current iteration finishes
        let _ = allow_tx.send(0);
        drop(allow_tx);

        for caller in callers {
            let _ = caller.await;
        }

        let _ = sampler_stop_tx.send(true);
        let _ = sampler.await;

        metrics.stop();
        RunResult::evaluate(&metrics, &self.plan.thresholds)
    }
}

/// One virtual caller. Active while its slot index is below the published
/// allowance; parked on the watch channel otherwise.
async fn virtual_caller(
    slot: usize,
    mut allow: watch::Receiver<usize>,
    client: reqwest::Client,
    url: String,
    pacing: Duration,
    metrics: Arc<MetricsCollector>,
) {
    loop {
        let active = *allow.borrow_and_update();
        if slot < active {
            match issue_request(&client, &url).await {
                Outcome::Success(latency) => metrics.record_success(latency),
                Outcome::Failure { latency, reason } => {
                    tracing::debug!(slot, %reason, "request failed");
                    metrics.record_failure(latency);
                }
            }
            tokio::time::sleep(pacing).await;
        } else if allow.changed().await.is_err() {
            break;
        }
    }
}

/// Issue one GET and classify the outcome. Timeouts and transport failures
/// carry no latency sample; anything that produced a response does.
async fn issue_request(client: &reqwest::Client, url: &str) -> Outcome {
    let start = Instant::now();

    let response = match client.get(url).send().await {
        Ok(response) => response,
        Err(e) => {
            let reason = if e.is_timeout() {
                "timeout".to_string()
            } else {
                format!("transport error: {}", e)
            };
            return Outcome::Failure {
                latency: None,
                reason,
            };
        }
    };

    let status = response.status();
    let body = match response.bytes().await {
        Ok(body) => body,
        Err(e) => {
            return Outcome::Failure {
                latency: Some(start.elapsed()),
                reason: format!("body read failed: {}", e),
            }
        }
    };
    let latency = start.elapsed();

    if !status.is_success() {
        return Outcome::Failure {
            latency: Some(latency),
            reason: format!("status {}", status),
        };
    }

    let verdict = validate_body(&body);
    if verdict.valid {
        Outcome::Success(latency)
    } else {
        Outcome::Failure {
            latency: Some(latency),
            reason: format!("body check failed: {}", verdict.reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loadgen::plan::{LoadStage, Threshold};
    use axum::{http::StatusCode, routing::get, Json, Router};
    use serde_json::json;

    async fn spawn_target(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        format!("http://{}", addr)
    }

    fn quick_plan(base_url: String, thresholds: Vec<Threshold>) -> LoadPlan {
        LoadPlan {
            base_url,
            path: "/backend/delay/ms/5".to_string(),
            stages: vec![
                LoadStage {
                    duration: Duration::from_millis(400),
                    target_concurrency: 4,
                },
                LoadStage {
                    duration: Duration::from_millis(200),
                    target_concurrency: 0,
                },
            ],
            timeout: Duration::from_secs(2),
            pacing: Duration::from_millis(10),
            thresholds,
        }
    }

    #[tokio::test]
    async fn test_run_against_healthy_target_passes() {
        let app = Router::new().route(
            "/backend/delay/ms/:ms",
            get(|| async {
                Json(json!({"ms": 5, "actual_delay_ms": 5, "thread": "stub"}))
            }),
        );
        let base_url = spawn_target(app).await;

        let plan = quick_plan(base_url, LoadPlan::default_thresholds());
        let result = LoadRunner::new(plan).unwrap().run().await;

        assert!(result.passed, "verdicts: {:?}", result.verdicts);
        assert!(result.snapshot.success_count > 0);
        assert_eq!(result.snapshot.error_count, 0);
    }

    #[tokio::test]
    async fn test_run_against_failing_target_fails_error_rate() {
        let app = Router::new().route(
            "/backend/delay/ms/:ms",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let base_url = spawn_target(app).await;

        let plan = quick_plan(base_url, LoadPlan::default_thresholds());
        let result = LoadRunner::new(plan).unwrap().run().await;

        assert!(!result.passed);
        assert!(result.snapshot.error_count > 0);
        assert_eq!(result.snapshot.success_count, 0);
    }

    #[tokio::test]
    async fn test_unreachable_target_records_failures_without_aborting() {
        // Nothing listens here; every attempt fails at the transport level
        let plan = quick_plan("http://127.0.0.1:1".to_string(), Vec::new());
        let result = LoadRunner::new(plan).unwrap().run().await;

        // No thresholds, so the run passes, but failures were recorded
        assert!(result.passed);
        assert!(result.snapshot.error_count > 0);
        assert_eq!(result.snapshot.success_count, 0);
    }

    #[tokio::test]
    async fn test_malformed_body_counts_as_failure() {
        let app = Router::new().route(
            "/backend/delay/ms/:ms",
            get(|| async { "not json at all" }),
        );
        let base_url = spawn_target(app).await;

        let plan = quick_plan(base_url, Vec::new());
        let result = LoadRunner::new(plan).unwrap().run().await;

        assert!(result.snapshot.error_count > 0);
        assert_eq!(result.snapshot.success_count, 0);
    }
}
