//! Sample collection using HdrHistogram for accurate percentile calculations.

use hdrhistogram::Histogram;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use sysinfo::System;

/// Thread-safe collector for load-run samples
pub struct MetricsCollector {
    /// Latency of completed requests (microseconds)
    latency_histogram: Mutex<Histogram<u64>>,
    /// Samples that passed status and body checks
    success_count: AtomicU64,
    /// Failed samples: non-2xx, timeout, unreachable, malformed body
    error_count: AtomicU64,
    /// Process CPU/RSS sampled during the run
    resources: Mutex<ResourceStats>,
    start_time: Mutex<Option<Instant>>,
    end_time: Mutex<Option<Instant>>,
}

#[derive(Default)]
struct ResourceStats {
    samples: u64,
    cpu_sum: f64,
    cpu_max: f32,
    memory_sum_mb: f64,
    memory_max_mb: f64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            // Latencies up to 10 minutes with 3 significant figures
            latency_histogram: Mutex::new(Histogram::new_with_bounds(1, 600_000_000, 3).unwrap()),
            success_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            resources: Mutex::new(ResourceStats::default()),
            start_time: Mutex::new(None),
            end_time: Mutex::new(None),
        }
    }

    /// Mark the start of the run
    pub fn start(&self) {
        *self.start_time.lock().unwrap() = Some(Instant::now());
    }

    /// Mark the end of the run
    pub fn stop(&self) {
        *self.end_time.lock().unwrap() = Some(Instant::now());
    }

    /// Record a sample that passed all checks
    pub fn record_success(&self, latency: Duration) {
        self.record_latency(latency);
        self.success_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed sample; latency is present when a response arrived
    /// before the check failed (e.g. a 500), absent for timeouts and
    /// transport errors.
    pub fn record_failure(&self, latency: Option<Duration>) {
        if let Some(latency) = latency {
            self.record_latency(latency);
        }
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    fn record_latency(&self, latency: Duration) {
        let latency_us = latency.as_micros() as u64;
        if let Ok(mut hist) = self.latency_histogram.lock() {
            let _ = hist.record(latency_us.max(1));
        }
    }

    /// Sample this process's CPU and RSS
    pub fn sample_resources(&self, sys: &mut System) {
        sys.refresh_all();
        let Ok(pid) = sysinfo::get_current_pid() else {
            return;
        };
        let Some(process) = sys.process(pid) else {
            return;
        };

        let cpu = process.cpu_usage();
        let memory_mb = process.memory() as f64 / (1024.0 * 1024.0);

        let mut stats = self.resources.lock().unwrap();
        stats.samples += 1;
        stats.cpu_sum += cpu as f64;
        stats.cpu_max = stats.cpu_max.max(cpu);
        stats.memory_sum_mb += memory_mb;
        stats.memory_max_mb = stats.memory_max_mb.max(memory_mb);
    }

    pub fn success_count(&self) -> u64 {
        self.success_count.load(Ordering::Relaxed)
    }

    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    pub fn total_requests(&self) -> u64 {
        self.success_count() + self.error_count()
    }

    /// Failed samples over total samples, 0.0 to 1.0. A run with no samples
    /// has an error rate of 0.
    pub fn error_rate(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            return 0.0;
        }
        self.error_count() as f64 / total as f64
    }

    pub fn elapsed(&self) -> Duration {
        let start = self.start_time.lock().unwrap();
        let end = self.end_time.lock().unwrap();
        match (*start, *end) {
            (Some(s), Some(e)) => e.duration_since(s),
            (Some(s), None) => s.elapsed(),
            _ => Duration::ZERO,
        }
    }

    pub fn requests_per_second(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            return 0.0;
        }
        self.total_requests() as f64 / elapsed
    }

    /// Latency percentile in milliseconds over all recorded samples
    pub fn latency_percentile(&self, percentile: f64) -> f64 {
        let hist = self.latency_histogram.lock().unwrap();
        hist.value_at_percentile(percentile) as f64 / 1000.0
    }

    /// Create a snapshot of current metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        let resources = self.resources.lock().unwrap();
        let (avg_cpu, avg_memory_mb) = if resources.samples > 0 {
            (
                (resources.cpu_sum / resources.samples as f64) as f32,
                resources.memory_sum_mb / resources.samples as f64,
            )
        } else {
            (0.0, 0.0)
        };

        MetricsSnapshot {
            success_count: self.success_count(),
            error_count: self.error_count(),
            error_rate: self.error_rate(),
            requests_per_second: self.requests_per_second(),
            latency_p50: self.latency_percentile(50.0),
            latency_p95: self.latency_percentile(95.0),
            latency_p99: self.latency_percentile(99.0),
            elapsed_secs: self.elapsed().as_secs_f64(),
            avg_cpu,
            max_cpu: resources.cpu_max,
            avg_memory_mb,
            max_memory_mb: resources.memory_max_mb,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// A snapshot of metrics at a point in time
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub success_count: u64,
    pub error_count: u64,
    pub error_rate: f64,
    pub requests_per_second: f64,
    pub latency_p50: f64,
    pub latency_p95: f64,
    pub latency_p99: f64,
    pub elapsed_secs: f64,
    pub avg_cpu: f32,
    pub max_cpu: f32,
    pub avg_memory_mb: f64,
    pub max_memory_mb: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_counts_and_rate() {
        let collector = MetricsCollector::new();
        collector.start();

        collector.record_success(Duration::from_millis(100));
        collector.record_success(Duration::from_millis(150));
        collector.record_success(Duration::from_millis(200));
        collector.record_failure(Some(Duration::from_millis(400)));

        collector.stop();

        assert_eq!(collector.success_count(), 3);
        assert_eq!(collector.error_count(), 1);
        assert_eq!(collector.total_requests(), 4);
        assert!((collector.error_rate() - 0.25).abs() < 0.001);
    }

    #[test]
    fn test_empty_collector_has_zero_error_rate() {
        let collector = MetricsCollector::new();
        assert_eq!(collector.error_rate(), 0.0);
        assert_eq!(collector.requests_per_second(), 0.0);
    }

    #[test]
    fn test_failure_without_latency_skips_histogram() {
        let collector = MetricsCollector::new();
        collector.record_failure(None);

        assert_eq!(collector.error_count(), 1);
        assert_eq!(collector.latency_percentile(99.0), 0.0);
    }

    #[test]
    fn test_percentiles_reflect_samples() {
        let collector = MetricsCollector::new();
        for ms in [10u64, 20, 30, 40, 50, 60, 70, 80, 90, 1000] {
            collector.record_success(Duration::from_millis(ms));
        }

        let p50 = collector.latency_percentile(50.0);
        let p99 = collector.latency_percentile(99.0);
        assert!(p50 >= 40.0 && p50 <= 60.0, "p50 was {}", p50);
        assert!(p99 >= 900.0, "p99 was {}", p99);
    }

    #[test]
    fn test_resource_sampling() {
        let collector = MetricsCollector::new();
        let mut sys = System::new_all();
        collector.sample_resources(&mut sys);

        let snapshot = collector.snapshot();
        assert!(snapshot.max_memory_mb > 0.0);
    }
}
