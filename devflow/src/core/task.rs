//! Task state machine.

use super::TaskStatus;
use crate::utils::{now_utc, Timestamp};
use serde::{Deserialize, Serialize};

/// The smallest unit of pipeline work.
///
/// A task is owned by exactly one stage and only moves forward:
/// `Pending` → `Running` → `Succeeded` | `Failed`. Transition methods return
/// `false` and leave the task untouched when called from the wrong state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Task name, unique within its stage.
    pub name: String,
    /// Free-form type tag (e.g. "build", "test", "deploy").
    pub task_type: String,
    /// Current status.
    pub status: TaskStatus,
    /// When the first attempt started.
    pub started_at: Option<Timestamp>,
    /// When the task reached a terminal status.
    pub ended_at: Option<Timestamp>,
    /// Executor error detail, present iff `Failed`.
    pub error: Option<String>,
    /// Number of executor invocations so far.
    pub attempts: u32,
}

impl Task {
    /// Creates a pending task.
    #[must_use]
    pub fn new(name: impl Into<String>, task_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            task_type: task_type.into(),
            status: TaskStatus::Pending,
            started_at: None,
            ended_at: None,
            error: None,
            attempts: 0,
        }
    }

    /// Moves a pending task to `Running` and stamps its start time.
    pub fn start(&mut self) -> bool {
        if self.status != TaskStatus::Pending {
            return false;
        }
        self.status = TaskStatus::Running;
        self.started_at = Some(now_utc());
        self.attempts = 1;
        true
    }

    /// Records another executor attempt on a running task.
    pub fn retry(&mut self) -> bool {
        if self.status != TaskStatus::Running {
            return false;
        }
        self.attempts += 1;
        true
    }

    /// Marks a running task as succeeded.
    pub fn succeed(&mut self) -> bool {
        if self.status != TaskStatus::Running {
            return false;
        }
        self.status = TaskStatus::Succeeded;
        self.stamp_end();
        true
    }

    /// Marks a running task as failed with the executor's error detail.
    pub fn fail(&mut self, detail: impl Into<String>) -> bool {
        if self.status != TaskStatus::Running {
            return false;
        }
        self.status = TaskStatus::Failed;
        self.error = Some(detail.into());
        self.stamp_end();
        true
    }

    /// Wall-clock duration in milliseconds, once the task has ended.
    #[must_use]
    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        }
    }

    // The system clock can step backwards; never record end < start.
    fn stamp_end(&mut self) {
        let now = now_utc();
        self.ended_at = Some(match self.started_at {
            Some(start) if start > now => start,
            _ => now,
        });
    }
}
