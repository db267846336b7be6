//! Error types for the devflow engine.
//!
//! Build-time errors (graph validation, duplicate names) are fatal and are
//! returned before any stage starts. Run-time task failures never escape the
//! scheduler; they are recorded on the task and collected into
//! [`RunError`] values on the run result.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for devflow operations.
#[derive(Debug, Error)]
pub enum DevflowError {
    /// A pipeline validation error occurred.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// A cycle was detected in the stage dependency graph.
    #[error("{0}")]
    CycleDetected(#[from] CycleDetectedError),

    /// A stage depends on a stage that does not exist.
    #[error("{0}")]
    UnknownDependency(#[from] UnknownDependencyError),

    /// The run configuration is invalid.
    #[error("Invalid run configuration: {0}")]
    InvalidConfig(String),

    /// The pipeline has already been handed to a scheduler.
    #[error("Pipeline '{0}' has already been executed")]
    AlreadyExecuted(String),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Metadata about a validation error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "DEVFLOW-GRAPH-CYCLE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when pipeline validation fails.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
    /// Optional contract error info.
    pub error_info: Option<ContractErrorInfo>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Sets the contract error info.
    #[must_use]
    pub fn with_error_info(mut self, info: ContractErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// Returns the error code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.error_info.as_ref().map(|info| info.code.as_str())
    }

    /// Error for a stage name registered twice.
    #[must_use]
    pub fn duplicate_stage(stage: &str) -> Self {
        Self::new(format!("Stage '{stage}' is already defined"))
            .with_stages(vec![stage.to_string()])
            .with_error_info(
                ContractErrorInfo::new(
                    "DEVFLOW-BUILD-DUPLICATE_STAGE",
                    format!("Stage name '{stage}' is not unique"),
                )
                .with_fix_hint("Stage names must be unique within a pipeline."),
            )
    }

    /// Error for a task name registered twice within one stage.
    #[must_use]
    pub fn duplicate_task(stage: &str, task: &str) -> Self {
        Self::new(format!("Task '{task}' is already defined in stage '{stage}'"))
            .with_stages(vec![stage.to_string()])
            .with_error_info(
                ContractErrorInfo::new(
                    "DEVFLOW-BUILD-DUPLICATE_TASK",
                    format!("Task name '{task}' is not unique within stage '{stage}'"),
                )
                .with_context_entry("task", task)
                .with_fix_hint("Task names must be unique within their stage."),
            )
    }

    /// Error for a handle that does not belong to this builder.
    #[must_use]
    pub fn unknown_handle(stage: &str) -> Self {
        Self::new(format!("Stage handle '{stage}' does not belong to this pipeline"))
            .with_stages(vec![stage.to_string()])
            .with_error_info(ContractErrorInfo::new(
                "DEVFLOW-BUILD-UNKNOWN_HANDLE",
                "Stage handle was issued by a different builder",
            ))
    }

    /// Error for a pipeline with no stages.
    #[must_use]
    pub fn empty() -> Self {
        Self::new("Pipeline has no stages").with_error_info(
            ContractErrorInfo::new("DEVFLOW-BUILD-EMPTY", "Cannot build an empty pipeline")
                .with_fix_hint("Add at least one stage to the pipeline before building."),
        )
    }
}

/// Error raised when a cycle is detected in the stage dependency graph.
#[derive(Debug, Clone, Error)]
#[error("Cycle detected in pipeline: {}", cycle_path.join(" -> "))]
pub struct CycleDetectedError {
    /// The path of stages forming the cycle, first stage repeated at the end.
    pub cycle_path: Vec<String>,
    /// Contract error info.
    pub error_info: ContractErrorInfo,
}

impl CycleDetectedError {
    /// Creates a new cycle detected error.
    #[must_use]
    pub fn new(cycle_path: Vec<String>) -> Self {
        let info = ContractErrorInfo::new(
            "DEVFLOW-GRAPH-CYCLE",
            format!("Pipeline contains a dependency cycle: {}", cycle_path.join(" -> ")),
        )
        .with_fix_hint("Remove one of the dependencies in the cycle to break it.");

        Self {
            cycle_path,
            error_info: info,
        }
    }
}

/// Error raised when a stage declares a dependency that has no matching stage.
#[derive(Debug, Clone, Error)]
#[error("Stage '{stage}' depends on unknown stage '{missing}'")]
pub struct UnknownDependencyError {
    /// The stage declaring the dependency.
    pub stage: String,
    /// The dependency name that could not be resolved.
    pub missing: String,
    /// Contract error info.
    pub error_info: ContractErrorInfo,
}

impl UnknownDependencyError {
    /// Creates a new unknown dependency error.
    #[must_use]
    pub fn new(stage: impl Into<String>, missing: impl Into<String>) -> Self {
        let stage = stage.into();
        let missing = missing.into();
        let info = ContractErrorInfo::new(
            "DEVFLOW-GRAPH-MISSING_DEP",
            format!("Dependency '{missing}' not found"),
        )
        .with_context_entry("stage", stage.clone())
        .with_fix_hint("Check the dependency name for typos or add the missing stage.");

        Self {
            stage,
            missing,
            error_info: info,
        }
    }
}

/// A task's executor reported failure.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("Task '{task}' in stage '{stage}' failed: {detail}")]
pub struct TaskExecutionError {
    /// The stage owning the task.
    pub stage: String,
    /// The failing task.
    pub task: String,
    /// Error detail reported by the executor.
    pub detail: String,
}

impl TaskExecutionError {
    /// Creates a new task execution error.
    #[must_use]
    pub fn new(
        stage: impl Into<String>,
        task: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            stage: stage.into(),
            task: task.into(),
            detail: detail.into(),
        }
    }
}

/// Why a stage was skipped instead of run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    /// A dependency ended Failed.
    DependencyFailed {
        /// The failed dependency.
        dependency: String,
    },
    /// A dependency ended Skipped.
    DependencySkipped {
        /// The skipped dependency.
        dependency: String,
    },
    /// The run halted after a failure with `halt_on_failure` set.
    Halted,
    /// The run was cancelled.
    Cancelled {
        /// Cancellation reason supplied by the caller.
        reason: String,
    },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DependencyFailed { dependency } => {
                write!(f, "dependency '{dependency}' failed")
            }
            Self::DependencySkipped { dependency } => {
                write!(f, "dependency '{dependency}' was skipped")
            }
            Self::Halted => write!(f, "pipeline halted after a failure"),
            Self::Cancelled { reason } => write!(f, "pipeline cancelled: {reason}"),
        }
    }
}

/// Informational record of a stage that never ran.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("Stage '{stage}' skipped: {reason}")]
pub struct StageSkippedError {
    /// The skipped stage.
    pub stage: String,
    /// Why it was skipped.
    pub reason: SkipReason,
}

impl StageSkippedError {
    /// Creates a new stage skipped record.
    #[must_use]
    pub fn new(stage: impl Into<String>, reason: SkipReason) -> Self {
        Self {
            stage: stage.into(),
            reason,
        }
    }
}

/// Run-time error collected into a run result.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunError {
    /// A task failed, failing its stage.
    #[error("{0}")]
    TaskExecution(TaskExecutionError),
    /// A stage was skipped.
    #[error("{0}")]
    StageSkipped(StageSkippedError),
    /// A stage runner panicked or could not be joined.
    #[error("Stage '{stage}' aborted: {detail}")]
    StageAborted {
        /// The aborted stage.
        stage: String,
        /// Panic or join error detail.
        detail: String,
    },
}

impl RunError {
    /// Returns the stage this error is attached to.
    #[must_use]
    pub fn stage(&self) -> &str {
        match self {
            Self::TaskExecution(err) => &err.stage,
            Self::StageSkipped(err) => &err.stage,
            Self::StageAborted { stage, .. } => stage,
        }
    }

    /// Returns true for errors that represent an actual failure.
    ///
    /// Skips are informational.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        !matches!(self, Self::StageSkipped(_))
    }
}
