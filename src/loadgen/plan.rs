//! Load plan: the stage schedule and pass/fail thresholds for a run.

use std::time::Duration;

/// One window of the concurrency ramp: over `duration`, the number of active
/// virtual callers moves linearly from the previous stage's target to
/// `target_concurrency`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadStage {
    pub duration: Duration,
    pub target_concurrency: usize,
}

impl std::str::FromStr for LoadStage {
    type Err = String;

    /// Parse the compact `<duration>:<target>` form, e.g. `5s:200` or `500ms:10`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (duration, target) = s
            .split_once(':')
            .ok_or_else(|| format!("stage must be <duration>:<target>, got {:?}", s))?;
        Ok(LoadStage {
            duration: parse_duration(duration)?,
            target_concurrency: target
                .trim()
                .parse()
                .map_err(|_| format!("invalid stage target: {:?}", target))?,
        })
    }
}

/// Parse `5s` / `500ms` / bare seconds.
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|_| format!("invalid duration: {:?}", s))
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| format!("invalid duration: {:?}", s))
    } else {
        s.parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| format!("invalid duration: {:?}", s))
    }
}

/// Which aggregated metric a threshold checks
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Metric {
    /// Failed samples over total samples, 0.0 to 1.0
    ErrorRate,
    /// Latency percentile in milliseconds, e.g. 95.0 for p95
    LatencyPercentile(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Lt,
    Le,
}

impl Comparator {
    pub fn check(&self, observed: f64, bound: f64) -> bool {
        match self {
            Comparator::Lt => observed < bound,
            Comparator::Le => observed <= bound,
        }
    }
}

/// A post-run assertion over the full aggregated sample set
#[derive(Debug, Clone, PartialEq)]
pub struct Threshold {
    pub metric: Metric,
    pub comparator: Comparator,
    pub bound: f64,
}

impl std::fmt::Display for Threshold {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let metric = match self.metric {
            Metric::ErrorRate => "error_rate".to_string(),
            Metric::LatencyPercentile(p) => format!("p{}", p),
        };
        let cmp = match self.comparator {
            Comparator::Lt => "<",
            Comparator::Le => "<=",
        };
        write!(f, "{}{}{}", metric, cmp, self.bound)
    }
}

impl std::str::FromStr for Threshold {
    type Err = String;

    /// Parse the compact forms `error_rate<0.05`, `p95<3000`, `p99<=5000`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (idx, comparator, op_len) = if let Some(idx) = s.find("<=") {
            (idx, Comparator::Le, 2)
        } else if let Some(idx) = s.find('<') {
            (idx, Comparator::Lt, 1)
        } else {
            return Err(format!("threshold must contain < or <=, got {:?}", s));
        };

        let metric_str = s[..idx].trim();
        let metric = if metric_str == "error_rate" {
            Metric::ErrorRate
        } else if let Some(p) = metric_str.strip_prefix('p') {
            let percentile: f64 = p
                .parse()
                .map_err(|_| format!("invalid percentile: {:?}", metric_str))?;
            if !(0.0..=100.0).contains(&percentile) {
                return Err(format!("percentile out of range: {}", percentile));
            }
            Metric::LatencyPercentile(percentile)
        } else {
            return Err(format!("unknown metric: {:?}", metric_str));
        };

        let bound: f64 = s[idx + op_len..]
            .trim()
            .parse()
            .map_err(|_| format!("invalid bound in {:?}", s))?;

        Ok(Threshold {
            metric,
            comparator,
            bound,
        })
    }
}

/// Everything a run needs, owned exclusively by the load generator
#[derive(Debug, Clone)]
pub struct LoadPlan {
    /// Target base URL; supplied externally, never hardcoded
    pub base_url: String,
    /// Fixed request path each virtual caller hits
    pub path: String,
    pub stages: Vec<LoadStage>,
    /// Per-request timeout; an elapsed timeout is a failed sample
    pub timeout: Duration,
    /// Fixed sleep between a caller's iterations
    pub pacing: Duration,
    pub thresholds: Vec<Threshold>,
}

impl LoadPlan {
    /// The original medium-load schedule: ramp to 200, 800, 1200, hold, down.
    pub fn default_stages() -> Vec<LoadStage> {
        vec![
            LoadStage {
                duration: Duration::from_secs(5),
                target_concurrency: 200,
            },
            LoadStage {
                duration: Duration::from_secs(10),
                target_concurrency: 800,
            },
            LoadStage {
                duration: Duration::from_secs(15),
                target_concurrency: 1200,
            },
            LoadStage {
                duration: Duration::from_secs(15),
                target_concurrency: 1200,
            },
            LoadStage {
                duration: Duration::from_secs(5),
                target_concurrency: 0,
            },
        ]
    }

    /// Failure rate under 5%, p95 under 3 seconds.
    pub fn default_thresholds() -> Vec<Threshold> {
        vec![
            Threshold {
                metric: Metric::ErrorRate,
                comparator: Comparator::Lt,
                bound: 0.05,
            },
            Threshold {
                metric: Metric::LatencyPercentile(95.0),
                comparator: Comparator::Lt,
                bound: 3000.0,
            },
        ]
    }
}
