//! Load generator: staged concurrency ramps with post-run threshold
//! evaluation.
//!
//! - Stage schedule with linear concurrency interpolation
//! - Virtual callers with per-request timeout and fixed pacing
//! - HdrHistogram-based sample collection plus process CPU/RSS sampling
//! - Declarative thresholds and a pass/fail run verdict

pub mod metrics;
pub mod plan;
pub mod report;
pub mod runner;
pub mod schedule;
pub mod validate;

pub use metrics::MetricsCollector;
pub use plan::{LoadPlan, LoadStage, Threshold};
pub use report::RunResult;
pub use runner::LoadRunner;
pub use schedule::Schedule;
