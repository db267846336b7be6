//! Test assertions for pipeline runs.

use crate::core::{StageStatus, TaskStatus};
use crate::pipeline::{PipelineSnapshot, RunResult};

/// Asserts that the run succeeded.
pub fn assert_run_succeeded(result: &RunResult) {
    assert!(
        result.is_success(),
        "Expected success, got status: {:?} with errors {:?}",
        result.overall_status,
        result.errors
    );
}

/// Asserts that a stage finished with the expected status.
pub fn assert_stage_status(result: &RunResult, stage: &str, expected: StageStatus) {
    let actual = result.stage_status(stage);
    assert_eq!(
        actual,
        Some(expected),
        "Expected stage '{stage}' to be {expected:?}, got {actual:?}"
    );
}

/// Asserts a task's status in a snapshot.
pub fn assert_task_status(snapshot: &PipelineSnapshot, stage: &str, task: &str, expected: TaskStatus) {
    let actual = snapshot
        .stage(stage)
        .and_then(|s| s.task(task))
        .map(|t| t.status);
    assert_eq!(
        actual,
        Some(expected),
        "Expected task '{stage}/{task}' to be {expected:?}, got {actual:?}"
    );
}

/// Asserts the structural invariants every snapshot must satisfy.
///
/// - A succeeded stage has only succeeded tasks.
/// - A skipped stage ran no tasks.
/// - A stage that started has every dependency succeeded.
/// - Start and end timestamps are ordered.
pub fn assert_snapshot_consistent(snapshot: &PipelineSnapshot) {
    for stage in &snapshot.stages {
        match stage.status {
            StageStatus::Succeeded => assert!(
                stage.tasks.iter().all(|t| t.status == TaskStatus::Succeeded),
                "Succeeded stage '{}' has unfinished tasks",
                stage.name
            ),
            StageStatus::Skipped => assert!(
                stage.tasks.iter().all(|t| t.status == TaskStatus::Pending),
                "Skipped stage '{}' ran tasks",
                stage.name
            ),
            _ => {}
        }

        if stage.started_at.is_some() {
            for dep in &stage.depends_on {
                assert_eq!(
                    snapshot.stage_status(dep),
                    Some(StageStatus::Succeeded),
                    "Stage '{}' started before dependency '{dep}' succeeded",
                    stage.name
                );
            }
        }

        if let (Some(start), Some(end)) = (stage.started_at, stage.ended_at) {
            assert!(start <= end, "Stage '{}' ended before it started", stage.name);
        }
        for task in &stage.tasks {
            if let (Some(start), Some(end)) = (task.started_at, task.ended_at) {
                assert!(start <= end, "Task '{}/{}' ended before it started", stage.name, task.name);
            }
        }
    }
}
