//! Testing utilities for devflow pipelines.
//!
//! This module provides:
//! - A scripted task executor that records calls
//! - Assertions over run results and snapshots

mod assertions;
mod mocks;

pub use assertions::{
    assert_run_succeeded, assert_snapshot_consistent, assert_stage_status, assert_task_status,
};
pub use mocks::{RecordedCall, ScriptedExecutor};
