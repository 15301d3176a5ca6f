use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::time::Duration;

use crate::loadgen::{LoadPlan, LoadStage, Threshold};

/// Gatewait - gateway concurrency benchmark harness
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the delay simulator backend
    Backend(BackendArgs),
    /// Run the forwarding gateway in front of a backend
    Gateway(GatewayArgs),
    /// Drive a staged load run against a target and judge it
    Load(LoadArgs),
    /// Boot backend and gateway in-process, then run the load plan
    Standalone(StandaloneArgs),
}

#[derive(Args, Debug)]
pub struct BackendArgs {
    /// Bind address
    #[arg(short = 'H', long, env = "SERVER_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Bind port
    #[arg(short, long, env = "SERVER_PORT", default_value = "8081")]
    pub port: u16,
}

#[derive(Args, Debug)]
pub struct GatewayArgs {
    /// Bind address
    #[arg(short = 'H', long, env = "SERVER_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Bind port
    #[arg(short, long, env = "SERVER_PORT", default_value = "8080")]
    pub port: u16,

    /// Backend base URL to forward to
    #[arg(short, long, env = "BACKEND_URL")]
    pub backend_url: String,

    /// Concurrency engine (thread-per-request or event-loop)
    #[arg(short, long, env = "GATEWAY_ENGINE", default_value = "thread-per-request")]
    pub engine: String,

    /// Worker count for the event-loop engine
    #[arg(short, long, env = "GATEWAY_WORKERS", default_value = "4")]
    pub workers: usize,

    /// Downstream connect timeout in seconds
    #[arg(long, env = "HTTP_CONNECT_TIMEOUT", default_value = "10")]
    pub connect_timeout: u64,

    /// Downstream request timeout in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "300")]
    pub request_timeout: u64,
}

#[derive(Args, Debug)]
pub struct LoadArgs {
    /// Target base URL
    #[arg(short, long, env = "BASE_URL")]
    pub base_url: String,

    /// Request path each virtual caller hits
    #[arg(long, default_value = "/backend/delay/ms/50")]
    pub path: String,

    /// Ramp stages as <duration>:<target>, comma separated
    /// (default: 5s:200,10s:800,15s:1200,15s:1200,5s:0)
    #[arg(short, long, value_delimiter = ',')]
    pub stages: Vec<String>,

    /// Per-request timeout in seconds
    #[arg(short, long, default_value = "10")]
    pub timeout: u64,

    /// Pacing sleep between a caller's iterations, in milliseconds
    #[arg(long, default_value = "50")]
    pub pacing_ms: u64,

    /// Thresholds such as 'error_rate<0.05' or 'p95<3000'
    /// (default: error_rate<0.05,p95<3000)
    #[arg(short = 'T', long = "threshold")]
    pub thresholds: Vec<String>,

    /// Output the result as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct StandaloneArgs {
    /// Concurrency engine (thread-per-request or event-loop)
    #[arg(short, long, default_value = "thread-per-request")]
    pub engine: String,

    /// Worker count for the event-loop engine
    #[arg(short, long, default_value = "4")]
    pub workers: usize,

    /// Backend delay per request in milliseconds
    #[arg(short, long, default_value = "50")]
    pub delay_ms: u64,

    /// Ramp stages as <duration>:<target>, comma separated
    #[arg(short, long, value_delimiter = ',')]
    pub stages: Vec<String>,

    /// Per-request timeout in seconds
    #[arg(short, long, default_value = "10")]
    pub timeout: u64,

    /// Pacing sleep between a caller's iterations, in milliseconds
    #[arg(long, default_value = "50")]
    pub pacing_ms: u64,

    /// Thresholds such as 'error_rate<0.05' or 'p95<3000'
    #[arg(short = 'T', long = "threshold")]
    pub thresholds: Vec<String>,

    /// Output the result as JSON
    #[arg(long)]
    pub json: bool,
}

impl LoadArgs {
    pub fn to_plan(&self) -> Result<LoadPlan> {
        build_plan(
            self.base_url.clone(),
            self.path.clone(),
            &self.stages,
            self.timeout,
            self.pacing_ms,
            &self.thresholds,
        )
    }
}

impl StandaloneArgs {
    pub fn to_plan(&self, base_url: String) -> Result<LoadPlan> {
        build_plan(
            base_url,
            format!("/backend/delay/ms/{}", self.delay_ms),
            &self.stages,
            self.timeout,
            self.pacing_ms,
            &self.thresholds,
        )
    }
}

/// Assemble a load plan, falling back to the original schedule and
/// thresholds when none are given.
pub fn build_plan(
    base_url: String,
    path: String,
    stages: &[String],
    timeout_secs: u64,
    pacing_ms: u64,
    thresholds: &[String],
) -> Result<LoadPlan> {
    let stages = if stages.is_empty() {
        LoadPlan::default_stages()
    } else {
        stages
            .iter()
            .map(|s| {
                s.parse::<LoadStage>()
                    .map_err(|e| anyhow::anyhow!("invalid stage {:?}: {}", s, e))
            })
            .collect::<Result<Vec<_>>>()?
    };

    let thresholds = if thresholds.is_empty() {
        LoadPlan::default_thresholds()
    } else {
        thresholds
            .iter()
            .map(|t| {
                t.parse::<Threshold>()
                    .map_err(|e| anyhow::anyhow!("invalid threshold {:?}: {}", t, e))
            })
            .collect::<Result<Vec<_>>>()?
    };

    Ok(LoadPlan {
        base_url,
        path,
        stages,
        timeout: Duration::from_secs(timeout_secs),
        pacing: Duration::from_millis(pacing_ms),
        thresholds,
    })
}
