//! Timer-driven simulated executor.

use super::{TaskExecutor, TaskOutcome};
use crate::core::Task;
use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;
use tracing::debug;

/// Simulates task work by sleeping a random number of time units.
///
/// Each attempt sleeps a whole number of `unit`s drawn uniformly from
/// `min_units..=max_units`, then succeeds, or fails with probability
/// `failure_rate`. The defaults mirror a 1–5 second build simulation.
#[derive(Debug, Clone)]
pub struct SimulatedExecutor {
    min_units: u32,
    max_units: u32,
    unit: Duration,
    failure_rate: f64,
}

impl Default for SimulatedExecutor {
    fn default() -> Self {
        Self {
            min_units: 1,
            max_units: 5,
            unit: Duration::from_secs(1),
            failure_rate: 0.0,
        }
    }
}

impl SimulatedExecutor {
    /// Creates a simulator with the default 1–5 second delays.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the inclusive range of units to sleep.
    #[must_use]
    pub fn with_units(mut self, min_units: u32, max_units: u32) -> Self {
        self.min_units = min_units.min(max_units);
        self.max_units = max_units.max(min_units);
        self
    }

    /// Sets the length of one unit.
    #[must_use]
    pub fn with_unit(mut self, unit: Duration) -> Self {
        self.unit = unit;
        self
    }

    /// Sets the probability, clamped to `[0, 1]`, that an attempt fails.
    #[must_use]
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    fn roll(&self) -> (Duration, bool) {
        let mut rng = rand::thread_rng();
        let units = rng.gen_range(self.min_units..=self.max_units);
        let fails = self.failure_rate > 0.0 && rng.gen_bool(self.failure_rate);
        (self.unit * units, fails)
    }
}

#[async_trait]
impl TaskExecutor for SimulatedExecutor {
    async fn execute(&self, stage: &str, task: &Task) -> TaskOutcome {
        let (delay, fails) = self.roll();
        debug!(
            stage = %stage,
            task = %task.name,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Simulating task"
        );
        tokio::time::sleep(delay).await;

        if fails {
            TaskOutcome::failure(format!("simulated {} failure", task.task_type))
        } else {
            TaskOutcome::success()
        }
    }
}
