//! Stage state machine.

use super::{StageStatus, Task, TaskStatus};
use crate::errors::{PipelineValidationError, SkipReason};
use crate::utils::{now_utc, Timestamp};
use serde::{Deserialize, Serialize};

/// Derives a stage status from its tasks' statuses.
///
/// Failed iff any task failed, Succeeded iff every task succeeded, Running
/// otherwise (a task is running or pending tasks remain). A stage with no
/// tasks has nothing left to do and is Succeeded.
#[must_use]
pub fn derive_stage_status(tasks: &[Task]) -> StageStatus {
    if tasks.iter().any(|t| t.status == TaskStatus::Failed) {
        StageStatus::Failed
    } else if tasks.iter().all(|t| t.status == TaskStatus::Succeeded) {
        StageStatus::Succeeded
    } else {
        StageStatus::Running
    }
}

/// A named unit of pipeline work with ordered tasks and declared dependencies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    /// Stage name, unique within the pipeline.
    pub name: String,
    /// Tasks in execution order.
    pub tasks: Vec<Task>,
    /// Names of stages that must succeed before this one runs.
    pub depends_on: Vec<String>,
    /// Declared artifact name, if the stage produces one.
    pub artifact: Option<String>,
    /// Locator of the produced artifact, set on success.
    pub artifact_locator: Option<String>,
    /// Current status.
    pub status: StageStatus,
    /// When the stage started running.
    pub started_at: Option<Timestamp>,
    /// When the stage reached a terminal status.
    pub ended_at: Option<Timestamp>,
    /// Failure detail or skip explanation.
    pub error: Option<String>,
    /// Why the stage was skipped, if it was.
    pub skip_reason: Option<SkipReason>,
}

impl Stage {
    /// Creates a pending stage. Duplicate dependency names are collapsed.
    #[must_use]
    pub fn new(name: impl Into<String>, depends_on: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let mut deps: Vec<String> = Vec::new();
        for dep in depends_on {
            let dep = dep.into();
            if !deps.contains(&dep) {
                deps.push(dep);
            }
        }

        Self {
            name: name.into(),
            tasks: Vec::new(),
            depends_on: deps,
            artifact: None,
            artifact_locator: None,
            status: StageStatus::Pending,
            started_at: None,
            ended_at: None,
            error: None,
            skip_reason: None,
        }
    }

    /// Appends a task.
    ///
    /// # Errors
    ///
    /// Returns an error if a task with the same name already exists.
    pub fn add_task(&mut self, task: Task) -> Result<(), PipelineValidationError> {
        if self.task(&task.name).is_some() {
            return Err(PipelineValidationError::duplicate_task(&self.name, &task.name));
        }
        self.tasks.push(task);
        Ok(())
    }

    /// Looks up a task by name.
    #[must_use]
    pub fn task(&self, name: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.name == name)
    }

    /// Parks a pending stage until its dependencies finish.
    pub fn block(&mut self) -> bool {
        self.transition(StageStatus::Pending, StageStatus::Blocked)
    }

    /// Releases a blocked stage whose dependencies all succeeded.
    pub fn unblock(&mut self) -> bool {
        self.transition(StageStatus::Blocked, StageStatus::Pending)
    }

    /// Moves a pending stage to `Running` and stamps its start time.
    pub fn start(&mut self) -> bool {
        if !self.transition(StageStatus::Pending, StageStatus::Running) {
            return false;
        }
        self.started_at = Some(now_utc());
        true
    }

    /// Settles a running stage from its tasks' outcomes.
    ///
    /// Returns the resulting status. A stage whose tasks are still pending
    /// (the runner stopped early) is Failed, never Succeeded.
    pub fn finish(&mut self) -> StageStatus {
        if self.status != StageStatus::Running {
            return self.status;
        }
        let derived = derive_stage_status(&self.tasks);
        self.status = if derived == StageStatus::Running {
            StageStatus::Failed
        } else {
            derived
        };
        if self.status == StageStatus::Failed && self.error.is_none() {
            self.error = Some(
                self.tasks
                    .iter()
                    .find(|t| t.status == TaskStatus::Failed)
                    .map_or_else(
                        || "stage stopped before all tasks completed".to_string(),
                        |t| {
                            format!(
                                "task '{}' failed: {}",
                                t.name,
                                t.error.as_deref().unwrap_or("unknown error")
                            )
                        },
                    ),
            );
        }
        self.stamp_end();
        self.status
    }

    /// Fails a running stage whose runner could not complete.
    ///
    /// A task left running by the runner is failed with the same detail.
    pub fn abort(&mut self, detail: impl Into<String>) -> bool {
        if self.status != StageStatus::Running {
            return false;
        }
        let detail = detail.into();
        for task in &mut self.tasks {
            task.fail(detail.clone());
        }
        self.status = StageStatus::Failed;
        self.error = Some(detail);
        self.stamp_end();
        true
    }

    /// Skips a stage that has not started.
    pub fn skip(&mut self, reason: SkipReason) -> bool {
        if !matches!(self.status, StageStatus::Pending | StageStatus::Blocked) {
            return false;
        }
        self.status = StageStatus::Skipped;
        self.error = Some(reason.to_string());
        self.skip_reason = Some(reason);
        self.ended_at = Some(now_utc());
        true
    }

    fn transition(&mut self, from: StageStatus, to: StageStatus) -> bool {
        if self.status != from {
            return false;
        }
        self.status = to;
        true
    }

    fn stamp_end(&mut self) {
        let now = now_utc();
        self.ended_at = Some(match self.started_at {
            Some(start) if start > now => start,
            _ => now,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tasks_with(statuses: &[TaskStatus]) -> Vec<Task> {
        statuses
            .iter()
            .enumerate()
            .map(|(i, status)| {
                let mut task = Task::new(format!("t{i}"), "test");
                task.status = *status;
                task
            })
            .collect()
    }

    #[test]
    fn test_derive_stage_status() {
        use TaskStatus::{Failed, Pending, Running, Succeeded};

        assert_eq!(derive_stage_status(&tasks_with(&[Succeeded, Succeeded])), StageStatus::Succeeded);
        assert_eq!(derive_stage_status(&tasks_with(&[Succeeded, Failed, Pending])), StageStatus::Failed);
        assert_eq!(derive_stage_status(&tasks_with(&[Succeeded, Running])), StageStatus::Running);
        assert_eq!(derive_stage_status(&tasks_with(&[Succeeded, Pending])), StageStatus::Running);
        assert_eq!(derive_stage_status(&[]), StageStatus::Succeeded);
    }

    #[test]
    fn test_duplicate_dependencies_collapsed() {
        let stage = Stage::new("deploy", ["build", "test", "build"]);
        assert_eq!(stage.depends_on, vec!["build".to_string(), "test".to_string()]);
    }

    #[test]
    fn test_add_task_rejects_duplicates() {
        let mut stage = Stage::new("build", Vec::<String>::new());
        stage.add_task(Task::new("compile", "build")).unwrap();

        let err = stage.add_task(Task::new("compile", "build")).unwrap_err();
        assert_eq!(err.code(), Some("DEVFLOW-BUILD-DUPLICATE_TASK"));
        assert_eq!(stage.tasks.len(), 1);
    }

    #[test]
    fn test_finish_with_pending_tasks_is_failed() {
        let mut stage = Stage::new("build", Vec::<String>::new());
        stage.add_task(Task::new("compile", "build")).unwrap();
        stage.add_task(Task::new("test", "test")).unwrap();
        stage.start();

        stage.tasks[0].start();
        stage.tasks[0].fail("syntax error");

        assert_eq!(stage.finish(), StageStatus::Failed);
        assert_eq!(stage.tasks[1].status, TaskStatus::Pending);
        assert_eq!(stage.error.as_deref(), Some("task 'compile' failed: syntax error"));
        assert!(stage.started_at <= stage.ended_at);
    }

    #[test]
    fn test_abort_fails_running_task() {
        let mut stage = Stage::new("build", Vec::<String>::new());
        stage.add_task(Task::new("compile", "build")).unwrap();
        stage.add_task(Task::new("test", "test")).unwrap();
        stage.start();
        stage.tasks[0].start();

        assert!(stage.abort("runner panicked"));
        assert_eq!(stage.status, StageStatus::Failed);
        assert_eq!(stage.tasks[0].status, TaskStatus::Failed);
        assert_eq!(stage.tasks[0].error.as_deref(), Some("runner panicked"));
        assert_eq!(stage.tasks[1].status, TaskStatus::Pending);
        assert!(!stage.abort("again"));
    }

    #[test]
    fn test_skip_only_before_start() {
        let mut stage = Stage::new("deploy", ["build"]);
        assert!(stage.block());
        assert!(stage.skip(SkipReason::Halted));
        assert_eq!(stage.status, StageStatus::Skipped);
        assert_eq!(stage.skip_reason, Some(SkipReason::Halted));

        let mut running = Stage::new("build", Vec::<String>::new());
        running.start();
        assert!(!running.skip(SkipReason::Halted));
        assert_eq!(running.status, StageStatus::Running);
    }

    #[test]
    fn test_unblock_then_start() {
        let mut stage = Stage::new("deploy", ["build"]);
        stage.block();
        assert!(!stage.start());
        assert!(stage.unblock());
        assert!(stage.start());
        assert!(stage.started_at.is_some());
    }
}
