//! Lifecycle events for observability.
//!
//! The scheduler publishes a [`PipelineEvent`] at every pipeline, stage and
//! task transition. Sinks must not block: they are called inline from the
//! scheduler and from stage runners.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use crate::utils::{now_utc, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of lifecycle transition an event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// The scheduler accepted the pipeline and is about to launch stages.
    #[serde(rename = "pipeline.started")]
    PipelineStarted,
    /// Every stage reached a terminal status.
    #[serde(rename = "pipeline.completed")]
    PipelineCompleted,
    /// A stage began running.
    #[serde(rename = "stage.started")]
    StageStarted,
    /// A stage succeeded.
    #[serde(rename = "stage.succeeded")]
    StageSucceeded,
    /// A stage failed.
    #[serde(rename = "stage.failed")]
    StageFailed,
    /// A stage was skipped.
    #[serde(rename = "stage.skipped")]
    StageSkipped,
    /// A task began its first attempt.
    #[serde(rename = "task.started")]
    TaskStarted,
    /// A task attempt failed and will be retried.
    #[serde(rename = "task.retrying")]
    TaskRetrying,
    /// A task succeeded.
    #[serde(rename = "task.succeeded")]
    TaskSucceeded,
    /// A task failed.
    #[serde(rename = "task.failed")]
    TaskFailed,
}

impl EventKind {
    /// Dotted event name, e.g. `stage.started`.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PipelineStarted => "pipeline.started",
            Self::PipelineCompleted => "pipeline.completed",
            Self::StageStarted => "stage.started",
            Self::StageSucceeded => "stage.succeeded",
            Self::StageFailed => "stage.failed",
            Self::StageSkipped => "stage.skipped",
            Self::TaskStarted => "task.started",
            Self::TaskRetrying => "task.retrying",
            Self::TaskSucceeded => "task.succeeded",
            Self::TaskFailed => "task.failed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineEvent {
    /// What happened.
    pub kind: EventKind,
    /// Pipeline name.
    pub pipeline: String,
    /// Stage involved, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    /// Task involved, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    /// Extra structured detail.
    #[serde(default)]
    pub data: serde_json::Value,
    /// When the event was created.
    pub at: Timestamp,
}

impl PipelineEvent {
    /// Creates a pipeline-level event.
    #[must_use]
    pub fn new(kind: EventKind, pipeline: impl Into<String>) -> Self {
        Self {
            kind,
            pipeline: pipeline.into(),
            stage: None,
            task: None,
            data: serde_json::Value::Null,
            at: now_utc(),
        }
    }

    /// Attaches the stage name.
    #[must_use]
    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    /// Attaches the task name.
    #[must_use]
    pub fn with_task(mut self, task: impl Into<String>) -> Self {
        self.task = Some(task.into());
        self
    }

    /// Attaches structured detail.
    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}
