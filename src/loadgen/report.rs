//! Run result and threshold verdicts.

use serde::Serialize;

use super::metrics::{MetricsCollector, MetricsSnapshot};
use super::plan::{Metric, Threshold};

/// Verdict for one threshold: the observed value next to the bound it was
/// checked against
#[derive(Debug, Clone, Serialize)]
pub struct ThresholdVerdict {
    pub threshold: String,
    pub observed: f64,
    pub bound: f64,
    pub passed: bool,
}

/// Aggregate of all recorded outcomes plus per-threshold verdicts.
/// Immutable once the run ends.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub snapshot: MetricsSnapshot,
    pub verdicts: Vec<ThresholdVerdict>,
    /// Conjunction of all threshold verdicts
    pub passed: bool,
}

impl RunResult {
    /// Evaluate every threshold over the full aggregated sample set.
    pub fn evaluate(collector: &MetricsCollector, thresholds: &[Threshold]) -> Self {
        let snapshot = collector.snapshot();

        let verdicts: Vec<ThresholdVerdict> = thresholds
            .iter()
            .map(|threshold| {
                let observed = match threshold.metric {
                    Metric::ErrorRate => snapshot.error_rate,
                    Metric::LatencyPercentile(p) => collector.latency_percentile(p),
                };
                ThresholdVerdict {
                    threshold: threshold.to_string(),
                    observed,
                    bound: threshold.bound,
                    passed: threshold.comparator.check(observed, threshold.bound),
                }
            })
            .collect();

        let passed = verdicts.iter().all(|v| v.passed);

        Self {
            snapshot,
            verdicts,
            passed,
        }
    }

    /// Print the human-readable report
    pub fn print_report(&self) {
        println!();
        println!("=== Load Run Report ===");
        println!();
        println!(
            "  Requests:   {} total, {} ok, {} failed ({:.2}% error rate)",
            self.snapshot.success_count + self.snapshot.error_count,
            self.snapshot.success_count,
            self.snapshot.error_count,
            self.snapshot.error_rate * 100.0
        );
        println!(
            "  Throughput: {:.1} req/s over {:.1}s",
            self.snapshot.requests_per_second, self.snapshot.elapsed_secs
        );
        println!(
            "  Latency:    p50 {:.1}ms, p95 {:.1}ms, p99 {:.1}ms",
            self.snapshot.latency_p50, self.snapshot.latency_p95, self.snapshot.latency_p99
        );
        println!(
            "  Resources:  CPU avg {:.1}% max {:.1}%, RSS avg {:.0}MB max {:.0}MB",
            self.snapshot.avg_cpu,
            self.snapshot.max_cpu,
            self.snapshot.avg_memory_mb,
            self.snapshot.max_memory_mb
        );
        println!();
        println!("  Thresholds:");
        for verdict in &self.verdicts {
            println!(
                "    {} {:<24} observed {:.4} vs bound {}",
                if verdict.passed { "PASS" } else { "FAIL" },
                verdict.threshold,
                verdict.observed,
                verdict.bound
            );
        }
        println!();
        println!(
            "  Verdict: {}",
            if self.passed { "PASSED" } else { "FAILED" }
        );
        println!();
    }

    /// Export the result as JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loadgen::plan::LoadPlan;
    use std::time::Duration;

    #[test]
    fn test_healthy_run_passes_default_thresholds() {
        let collector = MetricsCollector::new();
        collector.start();
        for _ in 0..100 {
            collector.record_success(Duration::from_millis(60));
        }
        collector.record_failure(Some(Duration::from_millis(60)));
        collector.stop();

        let result = RunResult::evaluate(&collector, &LoadPlan::default_thresholds());

        assert!(result.passed);
        assert_eq!(result.verdicts.len(), 2);
        assert!(result.verdicts.iter().all(|v| v.passed));
    }

    #[test]
    fn test_all_errors_fails_error_rate_threshold() {
        let collector = MetricsCollector::new();
        collector.start();
        for _ in 0..50 {
            collector.record_failure(Some(Duration::from_millis(10)));
        }
        collector.stop();

        let result = RunResult::evaluate(&collector, &LoadPlan::default_thresholds());

        assert!(!result.passed);
        let error_verdict = result
            .verdicts
            .iter()
            .find(|v| v.threshold.starts_with("error_rate"))
            .unwrap();
        assert!(!error_verdict.passed);
        assert!((error_verdict.observed - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_slow_latency_fails_percentile_threshold() {
        let collector = MetricsCollector::new();
        collector.start();
        for _ in 0..100 {
            collector.record_success(Duration::from_millis(4000));
        }
        collector.stop();

        let result = RunResult::evaluate(&collector, &LoadPlan::default_thresholds());

        assert!(!result.passed);
        let latency_verdict = result
            .verdicts
            .iter()
            .find(|v| v.threshold.starts_with("p95"))
            .unwrap();
        assert!(!latency_verdict.passed);
        assert!(latency_verdict.observed >= 3000.0);
    }

    #[test]
    fn test_no_thresholds_always_passes() {
        let collector = MetricsCollector::new();
        let result = RunResult::evaluate(&collector, &[]);
        assert!(result.passed);
        assert!(result.verdicts.is_empty());
    }

    #[test]
    fn test_json_export_contains_verdicts() {
        let collector = MetricsCollector::new();
        collector.record_success(Duration::from_millis(10));
        let result = RunResult::evaluate(&collector, &LoadPlan::default_thresholds());

        let json = result.to_json();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(value["verdicts"].is_array());
        assert!(value["passed"].is_boolean());
    }
}
