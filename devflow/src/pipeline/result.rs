//! Run results.

use crate::core::{PipelineStatus, Stage, StageStatus};
use crate::errors::{RunError, SkipReason};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Final outcome of one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    /// Stage name.
    pub name: String,
    /// Terminal status.
    pub status: StageStatus,
    /// Failure detail or skip explanation.
    pub error: Option<String>,
    /// Why the stage was skipped, if it was.
    pub skip_reason: Option<SkipReason>,
    /// Wall-clock duration in milliseconds, for stages that ran.
    pub duration_ms: Option<i64>,
}

impl From<&Stage> for StageReport {
    fn from(stage: &Stage) -> Self {
        let duration_ms = match (stage.started_at, stage.ended_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        };
        Self {
            name: stage.name.clone(),
            status: stage.status,
            error: stage.error.clone(),
            skip_reason: stage.skip_reason.clone(),
            duration_ms,
        }
    }
}

/// Result of running a pipeline.
///
/// Every declared stage is reported, in insertion order, with a terminal
/// status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    /// Unique identifier of this run.
    pub run_id: Uuid,
    /// Pipeline name.
    pub pipeline: String,
    /// Succeeded iff every stage succeeded.
    pub overall_status: PipelineStatus,
    /// Per-stage outcomes.
    pub stages: Vec<StageReport>,
    /// Task failures, aborted stages and skip records, in the order observed.
    pub errors: Vec<RunError>,
    /// Registered artifacts, keyed by producing stage.
    pub artifacts: BTreeMap<String, String>,
    /// Whether the run stopped launching stages because of a failure.
    pub halted: bool,
    /// Whether at least one stage was skipped because of cancellation.
    ///
    /// A token cancelled after the last stage was launched leaves this
    /// `false`.
    pub cancelled: bool,
    /// Cancellation reason, set only when `cancelled` is true.
    pub cancel_reason: Option<String>,
    /// Total run time in milliseconds.
    pub duration_ms: f64,
}

impl RunResult {
    /// Returns true if the pipeline succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.overall_status == PipelineStatus::Succeeded
    }

    /// Looks up a stage report.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Returns a stage's terminal status.
    #[must_use]
    pub fn stage_status(&self, name: &str) -> Option<StageStatus> {
        self.stage(name).map(|s| s.status)
    }

    /// Errors that represent real failures, excluding skip records.
    pub fn failures(&self) -> impl Iterator<Item = &RunError> {
        self.errors.iter().filter(|e| e.is_failure())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Task;

    #[test]
    fn test_stage_report_from_stage() {
        let mut stage = Stage::new("build", Vec::<String>::new());
        stage.add_task(Task::new("compile", "build")).unwrap();
        stage.start();
        stage.tasks[0].start();
        stage.tasks[0].succeed();
        stage.finish();

        let report = StageReport::from(&stage);
        assert_eq!(report.status, StageStatus::Succeeded);
        assert!(report.duration_ms.unwrap() >= 0);
        assert!(report.error.is_none());

        let mut skipped = Stage::new("deploy", ["build"]);
        skipped.skip(SkipReason::Halted);
        let report = StageReport::from(&skipped);
        assert_eq!(report.duration_ms, None);
        assert_eq!(report.skip_reason, Some(SkipReason::Halted));
    }
}
