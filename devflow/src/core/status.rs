//! Task, stage and pipeline status enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The execution status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task has not started.
    #[default]
    Pending,
    /// Task executor is in progress.
    Running,
    /// Task executor reported success.
    Succeeded,
    /// Task executor reported failure.
    Failed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl TaskStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// The execution status of a stage.
///
/// State machine transitions:
/// - `Pending` → `Running` (dependencies succeeded, scheduler launched it)
/// - `Blocked` → `Pending` (last dependency succeeded)
/// - `Pending` | `Blocked` → `Skipped` (a dependency failed or was skipped,
///   or the run halted or was cancelled)
/// - `Running` → `Succeeded` | `Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Stage is eligible to start.
    #[default]
    Pending,
    /// Stage is waiting on unfinished dependencies.
    Blocked,
    /// Stage is executing its tasks.
    Running,
    /// Every task succeeded.
    Succeeded,
    /// A task failed, or the stage runner aborted.
    Failed,
    /// Stage never ran.
    Skipped,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Blocked => write!(f, "blocked"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

impl StageStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }

    /// Returns true if dependents of a stage in this status can never run.
    #[must_use]
    pub fn blocks_dependents(&self) -> bool {
        matches!(self, Self::Failed | Self::Skipped)
    }
}

/// The overall status of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    /// Pipeline has not been run.
    #[default]
    Pending,
    /// Pipeline run is in progress.
    Running,
    /// Every stage succeeded.
    Succeeded,
    /// At least one stage did not succeed.
    Failed,
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl PipelineStatus {
    /// Aggregates terminal stage statuses into a pipeline status.
    ///
    /// Succeeded iff every stage succeeded.
    #[must_use]
    pub fn from_stages<'a>(statuses: impl IntoIterator<Item = &'a StageStatus>) -> Self {
        if statuses.into_iter().all(|s| *s == StageStatus::Succeeded) {
            Self::Succeeded
        } else {
            Self::Failed
        }
    }
}
