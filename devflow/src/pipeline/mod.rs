//! Pipeline building and execution.
//!
//! This module provides:
//! - Pipeline builder with validation
//! - The dependency graph and its topological order
//! - The concurrent stage scheduler
//! - Run configuration, retry policies and run results

mod builder;
mod config;
mod graph;
mod result;
mod retry;
mod scheduler;
mod state;

#[cfg(test)]
mod integration_tests;

pub use builder::{PipelineBuilder, StageHandle};
pub use config::RunConfig;
pub use graph::DependencyGraph;
pub use result::{RunResult, StageReport};
pub use retry::{MaxAttempts, NoRetry, RetryDecision, RetryPolicy};
pub use scheduler::PipelineScheduler;
pub use state::{Pipeline, PipelineSnapshot};
