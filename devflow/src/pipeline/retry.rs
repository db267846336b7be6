//! The retry-or-not decision point for failed task attempts.
//!
//! The engine asks a [`RetryPolicy`] once per failed attempt. Backoff
//! tuning belongs to the policy, not the scheduler.

use crate::core::Task;
use crate::errors::TaskExecutionError;
use std::fmt::Debug;
use std::time::Duration;

/// Outcome of a retry decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry(Duration),
    /// No more retries, fail the task.
    GiveUp,
}

/// Decides whether a failed task attempt is retried.
pub trait RetryPolicy: Send + Sync + Debug {
    /// Called after a failed attempt. `task.attempts` counts attempts made
    /// so far, including the one that just failed.
    fn decide(&self, task: &Task, error: &TaskExecutionError) -> RetryDecision;
}

/// Never retries.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

impl RetryPolicy for NoRetry {
    fn decide(&self, _task: &Task, _error: &TaskExecutionError) -> RetryDecision {
        RetryDecision::GiveUp
    }
}

/// Retries every task up to a fixed number of total attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaxAttempts {
    attempts: u32,
    delay: Duration,
}

impl MaxAttempts {
    /// Allows `attempts` total attempts per task, waiting `delay` between them.
    #[must_use]
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }
}

impl RetryPolicy for MaxAttempts {
    fn decide(&self, task: &Task, error: &TaskExecutionError) -> RetryDecision {
        if task.attempts < self.attempts {
            tracing::debug!(
                task = %task.name,
                attempt = task.attempts,
                max_attempts = self.attempts,
                error = %error.detail,
                "Retrying task"
            );
            RetryDecision::Retry(self.delay)
        } else {
            RetryDecision::GiveUp
        }
    }
}
