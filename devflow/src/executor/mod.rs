//! The task executor capability.
//!
//! The engine never performs task work itself: every task is handed to a
//! caller-supplied [`TaskExecutor`]. Tests plug in instant, deterministic
//! executors; [`SimulatedExecutor`] reproduces a timer-driven simulation.

mod simulated;

pub use simulated::SimulatedExecutor;

use crate::core::Task;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Result reported by an executor for one task attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
    /// The task's work succeeded.
    Succeeded {
        /// Locator of an artifact produced by the task, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        artifact: Option<String>,
    },
    /// The task's work failed.
    Failed {
        /// Human-readable error detail.
        detail: String,
    },
}

impl TaskOutcome {
    /// A plain success.
    #[must_use]
    pub fn success() -> Self {
        Self::Succeeded { artifact: None }
    }

    /// A success that produced an artifact at `locator`.
    #[must_use]
    pub fn success_with_artifact(locator: impl Into<String>) -> Self {
        Self::Succeeded {
            artifact: Some(locator.into()),
        }
    }

    /// A failure with an error detail.
    #[must_use]
    pub fn failure(detail: impl Into<String>) -> Self {
        Self::Failed {
            detail: detail.into(),
        }
    }

    /// Returns true for a success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }
}

/// Trait for the work performed by a task.
///
/// Called once per attempt with the owning stage's name and a snapshot of the
/// task in its `Running` state. Implementations may take as long as they
/// need; the engine imposes no deadline.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Performs the task's work.
    async fn execute(&self, stage: &str, task: &Task) -> TaskOutcome;
}

/// A simple function-based executor.
pub struct FnExecutor<F>
where
    F: Fn(&str, &Task) -> TaskOutcome + Send + Sync,
{
    func: F,
}

impl<F> FnExecutor<F>
where
    F: Fn(&str, &Task) -> TaskOutcome + Send + Sync,
{
    /// Creates a new function-based executor.
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> std::fmt::Debug for FnExecutor<F>
where
    F: Fn(&str, &Task) -> TaskOutcome + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnExecutor").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F> TaskExecutor for FnExecutor<F>
where
    F: Fn(&str, &Task) -> TaskOutcome + Send + Sync,
{
    async fn execute(&self, stage: &str, task: &Task) -> TaskOutcome {
        (self.func)(stage, task)
    }
}

/// An executor that succeeds every task immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpExecutor;

#[async_trait]
impl TaskExecutor for NoOpExecutor {
    async fn execute(&self, _stage: &str, _task: &Task) -> TaskOutcome {
        TaskOutcome::success()
    }
}
