//! The pipeline aggregate and its shared run state.

use super::{DependencyGraph, PipelineScheduler, RunConfig, RunResult};
use crate::core::{PipelineStatus, Stage, StageStatus};
use crate::errors::DevflowError;
use crate::executor::TaskExecutor;
use crate::utils::Timestamp;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Mutable state of a pipeline, guarded by one lock.
#[derive(Debug, Clone, Default)]
pub(crate) struct PipelineState {
    pub(crate) status: PipelineStatus,
    pub(crate) stages: Vec<Stage>,
    pub(crate) artifacts: BTreeMap<String, String>,
    pub(crate) started_at: Option<Timestamp>,
    pub(crate) ended_at: Option<Timestamp>,
    version: u64,
}

/// Handle to the lock-guarded state, shared with stage runners.
///
/// Every write bumps the state version, so two snapshots with the same
/// version are identical.
#[derive(Debug, Clone)]
pub(crate) struct SharedState(Arc<RwLock<PipelineState>>);

impl SharedState {
    fn new(stages: Vec<Stage>) -> Self {
        Self(Arc::new(RwLock::new(PipelineState {
            stages,
            ..PipelineState::default()
        })))
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&PipelineState) -> R) -> R {
        f(&*self.0.read())
    }

    pub(crate) fn write<R>(&self, f: impl FnOnce(&mut PipelineState) -> R) -> R {
        let mut guard = self.0.write();
        let result = f(&mut *guard);
        guard.version += 1;
        result
    }
}

/// A consistent, point-in-time copy of a pipeline's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSnapshot {
    /// Pipeline name.
    pub name: String,
    /// Overall status.
    pub status: PipelineStatus,
    /// Stages in insertion order.
    pub stages: Vec<Stage>,
    /// Registered artifacts, keyed by producing stage.
    pub artifacts: BTreeMap<String, String>,
    /// When the run started.
    pub started_at: Option<Timestamp>,
    /// When the run finished.
    pub ended_at: Option<Timestamp>,
    /// State version the snapshot was taken at.
    pub version: u64,
}

impl PipelineSnapshot {
    /// Looks up a stage by name.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Returns a stage's status.
    #[must_use]
    pub fn stage_status(&self, name: &str) -> Option<StageStatus> {
        self.stage(name).map(|s| s.status)
    }

    /// Names of stages currently running.
    #[must_use]
    pub fn running_stages(&self) -> Vec<&str> {
        self.stages
            .iter()
            .filter(|s| s.status == StageStatus::Running)
            .map(|s| s.name.as_str())
            .collect()
    }
}

/// Aggregate root: the validated stage collection, artifact registry and
/// overall run status.
///
/// Built by [`PipelineBuilder`](super::PipelineBuilder). A pipeline runs at
/// most once; its state stays queryable through [`Pipeline::snapshot`]
/// during and after the run.
#[derive(Debug)]
pub struct Pipeline {
    name: String,
    graph: DependencyGraph,
    state: SharedState,
    claimed: AtomicBool,
}

impl Pipeline {
    pub(crate) fn new(name: String, stages: Vec<Stage>, graph: DependencyGraph) -> Self {
        Self {
            name,
            graph,
            state: SharedState::new(stages),
            claimed: AtomicBool::new(false),
        }
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the validated dependency graph.
    #[must_use]
    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.graph.len()
    }

    /// Takes a consistent snapshot of the current state.
    ///
    /// Safe to call while a run is in progress.
    #[must_use]
    pub fn snapshot(&self) -> PipelineSnapshot {
        self.state.read(|s| PipelineSnapshot {
            name: self.name.clone(),
            status: s.status,
            stages: s.stages.clone(),
            artifacts: s.artifacts.clone(),
            started_at: s.started_at,
            ended_at: s.ended_at,
            version: s.version,
        })
    }

    /// Returns the overall status.
    #[must_use]
    pub fn status(&self) -> PipelineStatus {
        self.state.read(|s| s.status)
    }

    /// Returns a stage's status.
    #[must_use]
    pub fn stage_status(&self, name: &str) -> Option<StageStatus> {
        self.state
            .read(|s| s.stages.iter().find(|st| st.name == name).map(|st| st.status))
    }

    /// Returns the registered artifacts.
    #[must_use]
    pub fn artifacts(&self) -> BTreeMap<String, String> {
        self.state.read(|s| s.artifacts.clone())
    }

    /// Runs the pipeline with a default scheduler for `config`.
    ///
    /// # Errors
    ///
    /// See [`PipelineScheduler::run`].
    pub async fn run(
        &self,
        executor: Arc<dyn TaskExecutor>,
        config: RunConfig,
    ) -> Result<RunResult, DevflowError> {
        PipelineScheduler::new(config).run(self, executor).await
    }

    /// Runs the pipeline on a fresh multi-threaded runtime, blocking until
    /// every stage is terminal.
    ///
    /// Use [`Pipeline::run`] from async code.
    ///
    /// # Errors
    ///
    /// Returns [`DevflowError::Internal`] if called from within a tokio
    /// runtime or if the runtime cannot be created, otherwise see
    /// [`PipelineScheduler::run`]. The pipeline is not consumed when the call
    /// is rejected.
    pub fn run_blocking(
        &self,
        executor: Arc<dyn TaskExecutor>,
        config: RunConfig,
    ) -> Result<RunResult, DevflowError> {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(DevflowError::Internal(
                "run_blocking called from within an async runtime; use run instead".to_string(),
            ));
        }
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|e| DevflowError::Internal(format!("failed to start runtime: {e}")))?;
        runtime.block_on(self.run(executor, config))
    }

    pub(crate) fn shared(&self) -> &SharedState {
        &self.state
    }

    /// Marks the pipeline as handed to a scheduler.
    pub(crate) fn claim(&self) -> Result<(), DevflowError> {
        if self.claimed.swap(true, Ordering::SeqCst) {
            return Err(DevflowError::AlreadyExecuted(self.name.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Task;

    fn pipeline() -> Pipeline {
        let mut build = Stage::new("build", Vec::<String>::new());
        build.add_task(Task::new("compile", "build")).unwrap();
        let deploy = Stage::new("deploy", ["build"]);
        let stages = vec![build, deploy];
        let graph = DependencyGraph::build(&stages).unwrap();
        Pipeline::new("demo".to_string(), stages, graph)
    }

    #[test]
    fn test_snapshot_reflects_writes() {
        let pipeline = pipeline();
        let before = pipeline.snapshot();
        assert_eq!(before.status, PipelineStatus::Pending);
        assert_eq!(before.stage_status("build"), Some(StageStatus::Pending));

        pipeline.shared().write(|s| {
            s.stages[0].start();
            s.stages[0].tasks[0].start();
        });

        let after = pipeline.snapshot();
        assert!(after.version > before.version);
        assert_eq!(after.running_stages(), vec!["build"]);
        assert!(after.stage("build").unwrap().tasks[0].started_at.is_some());
        // The earlier snapshot is a copy and does not change.
        assert_eq!(before.stage_status("build"), Some(StageStatus::Pending));
    }

    #[test]
    fn test_claim_once() {
        let pipeline = pipeline();
        assert!(pipeline.claim().is_ok());
        assert!(matches!(pipeline.claim(), Err(DevflowError::AlreadyExecuted(name)) if name == "demo"));
    }

    #[test]
    fn test_queries() {
        let pipeline = pipeline();
        assert_eq!(pipeline.name(), "demo");
        assert_eq!(pipeline.stage_count(), 2);
        assert_eq!(pipeline.stage_status("missing"), None);
        assert!(pipeline.artifacts().is_empty());
        assert_eq!(pipeline.graph().dependencies("deploy"), vec!["build"]);
    }
}
