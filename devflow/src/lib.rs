//! # Devflow
//!
//! A dependency-aware, concurrent build/deploy pipeline execution engine.
//!
//! A pipeline is a set of named stages, each an ordered list of tasks, with
//! declared stage-to-stage dependencies. Devflow provides:
//!
//! - **Validated construction**: duplicate names, unknown dependencies and
//!   cycles are rejected before anything runs
//! - **Concurrent scheduling**: a stage starts as soon as all of its
//!   dependencies have succeeded, up to an optional concurrency limit
//! - **Failure propagation**: dependents of a failed or skipped stage are
//!   skipped, independent branches keep running
//! - **Pluggable work**: task execution is delegated to a [`TaskExecutor`](executor::TaskExecutor)
//! - **Observability**: lifecycle events, `tracing` spans and consistent
//!   state snapshots at any time during a run
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use devflow::prelude::*;
//! use std::sync::Arc;
//!
//! let pipeline = PipelineBuilder::new("demo")
//!     .stage("build", &[], &[("compile", "build"), ("test", "test")])?
//!     .stage("deploy", &["build"], &[("deploy-to-prod", "deploy")])?
//!     .build()?;
//!
//! let result = pipeline
//!     .run(Arc::new(SimulatedExecutor::new()), RunConfig::default())
//!     .await?;
//! assert!(result.is_success());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod core;
pub mod errors;
pub mod events;
pub mod executor;
pub mod observability;
pub mod pipeline;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::core::{PipelineStatus, Stage, StageStatus, Task, TaskStatus};
    pub use crate::errors::{
        ContractErrorInfo, CycleDetectedError, DevflowError, PipelineValidationError, RunError,
        SkipReason, StageSkippedError, TaskExecutionError, UnknownDependencyError,
    };
    pub use crate::events::{
        CollectingEventSink, EventKind, EventSink, LoggingEventSink, NoOpEventSink, PipelineEvent,
    };
    pub use crate::executor::{
        FnExecutor, NoOpExecutor, SimulatedExecutor, TaskExecutor, TaskOutcome,
    };
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::pipeline::{
        DependencyGraph, MaxAttempts, NoRetry, Pipeline, PipelineBuilder, PipelineScheduler,
        PipelineSnapshot, RetryDecision, RetryPolicy, RunConfig, RunResult, StageHandle,
        StageReport,
    };
    pub use crate::utils::Timestamp;
}
