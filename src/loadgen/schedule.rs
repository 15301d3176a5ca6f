//! Concurrency ramp schedule.
//!
//! Stages execute strictly in order; within a stage the allowed concurrency
//! interpolates linearly from the previous stage's target to this stage's
//! target over the stage duration. Equal targets hold, greater ramp up,
//! lesser ramp down.

use std::time::Duration;

use super::plan::LoadStage;

pub struct Schedule {
    stages: Vec<LoadStage>,
}

impl Schedule {
    pub fn new(stages: Vec<LoadStage>) -> Self {
        Self { stages }
    }

    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }

    /// The highest concurrency the schedule can reach; the runner spawns
    /// this many virtual-caller slots up front.
    pub fn max_concurrency(&self) -> usize {
        self.stages
            .iter()
            .map(|s| s.target_concurrency)
            .max()
            .unwrap_or(0)
    }

    /// Allowed concurrency at `elapsed` since run start, or `None` once the
    /// schedule is exhausted.
    pub fn concurrency_at(&self, elapsed: Duration) -> Option<usize> {
        let mut stage_start = Duration::ZERO;
        let mut previous_target = 0usize;

        for stage in &self.stages {
            let stage_end = stage_start + stage.duration;
            if elapsed < stage_end {
                let in_stage = elapsed - stage_start;
                return Some(interpolate(
                    previous_target,
                    stage.target_concurrency,
                    in_stage,
                    stage.duration,
                ));
            }
            previous_target = stage.target_concurrency;
            stage_start = stage_end;
        }

        None
    }
}

/// Linear interpolation between two targets, rounded to the nearest caller.
fn interpolate(from: usize, to: usize, elapsed: Duration, duration: Duration) -> usize {
    if duration.is_zero() {
        return to;
    }
    let fraction = (elapsed.as_secs_f64() / duration.as_secs_f64()).clamp(0.0, 1.0);
    let value = from as f64 + (to as f64 - from as f64) * fraction;
    value.round() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(secs: u64, target: usize) -> LoadStage {
        LoadStage {
            duration: Duration::from_secs(secs),
            target_concurrency: target,
        }
    }

    #[test]
    fn test_ramp_up_is_linear() {
        let schedule = Schedule::new(vec![stage(10, 100)]);

        assert_eq!(schedule.concurrency_at(Duration::ZERO), Some(0));
        assert_eq!(schedule.concurrency_at(Duration::from_secs(5)), Some(50));
        assert_eq!(
            schedule.concurrency_at(Duration::from_millis(9_999)),
            Some(100)
        );
        assert_eq!(schedule.concurrency_at(Duration::from_secs(10)), None);
    }

    #[test]
    fn test_hold_stage_stays_flat() {
        let schedule = Schedule::new(vec![stage(5, 200), stage(10, 200)]);

        assert_eq!(schedule.concurrency_at(Duration::from_secs(6)), Some(200));
        assert_eq!(schedule.concurrency_at(Duration::from_secs(14)), Some(200));
    }

    #[test]
    fn test_ramp_down_reaches_zero() {
        let schedule = Schedule::new(vec![stage(5, 200), stage(5, 0)]);

        assert_eq!(
            schedule.concurrency_at(Duration::from_millis(7_500)),
            Some(100)
        );
        assert_eq!(
            schedule.concurrency_at(Duration::from_millis(9_990)),
            Some(0)
        );
    }

    #[test]
    fn test_stages_execute_in_order() {
        let schedule = Schedule::new(vec![stage(5, 200), stage(10, 800)]);

        // Second stage starts from the first stage's target
        assert_eq!(schedule.concurrency_at(Duration::from_secs(5)), Some(200));
        assert_eq!(schedule.concurrency_at(Duration::from_secs(10)), Some(500));
        assert_eq!(
            schedule.concurrency_at(Duration::from_millis(14_999)),
            Some(800)
        );
    }

    #[test]
    fn test_totals() {
        let schedule = Schedule::new(vec![stage(5, 200), stage(10, 800), stage(5, 0)]);
        assert_eq!(schedule.total_duration(), Duration::from_secs(20));
        assert_eq!(schedule.max_concurrency(), 800);
    }

    #[test]
    fn test_empty_schedule_is_immediately_exhausted() {
        let schedule = Schedule::new(Vec::new());
        assert_eq!(schedule.concurrency_at(Duration::ZERO), None);
        assert_eq!(schedule.max_concurrency(), 0);
    }

    #[test]
    fn test_zero_duration_stage_jumps() {
        let schedule = Schedule::new(vec![
            LoadStage {
                duration: Duration::ZERO,
                target_concurrency: 50,
            },
            stage(5, 50),
        ]);
        assert_eq!(schedule.concurrency_at(Duration::from_millis(1)), Some(50));
    }
}
