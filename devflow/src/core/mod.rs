//! Core domain model types for devflow.
//!
//! This module contains the fundamental types used throughout the engine:
//! - Task, stage and pipeline status enums
//! - The task state machine
//! - The stage state machine and its status derivation rule

mod stage;
mod status;
mod task;

pub use stage::{derive_stage_status, Stage};
pub use status::{PipelineStatus, StageStatus, TaskStatus};
pub use task::Task;
