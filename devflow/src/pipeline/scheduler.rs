//! Dependency-aware concurrent stage scheduler.
//!
//! Stages are launched as soon as every dependency has succeeded, allowing
//! for maximum parallelism. Tasks inside a stage run sequentially on the
//! tokio task that runs the stage. Completions are handled one at a time by
//! the scheduler loop, which is the only place stage outcomes, artifacts and
//! the overall status are written.
//!
//! If the `run` future is dropped before it finishes, every stage runner is
//! aborted and the pipeline is left `Failed` with no stage still running.

use super::state::{PipelineState, SharedState};
use super::{NoRetry, Pipeline, RetryDecision, RetryPolicy, RunConfig, RunResult, StageReport};
use crate::cancellation::CancellationToken;
use crate::core::{PipelineStatus, Stage, StageStatus};
use crate::errors::{DevflowError, RunError, SkipReason, StageSkippedError, TaskExecutionError};
use crate::events::{EventKind, EventSink, NoOpEventSink, PipelineEvent};
use crate::executor::{TaskExecutor, TaskOutcome};
use crate::utils::now_utc;
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Drives a pipeline's stages to completion.
///
/// ```rust,ignore
/// let scheduler = PipelineScheduler::new(RunConfig::new().with_concurrency_limit(4))
///     .with_event_sink(Arc::new(LoggingEventSink::default()));
/// let result = scheduler.run(&pipeline, Arc::new(SimulatedExecutor::new())).await?;
/// ```
#[derive(Clone)]
pub struct PipelineScheduler {
    config: RunConfig,
    retry_policy: Arc<dyn RetryPolicy>,
    events: Arc<dyn EventSink>,
    cancel: Arc<CancellationToken>,
}

impl std::fmt::Debug for PipelineScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineScheduler")
            .field("config", &self.config)
            .field("retry_policy", &self.retry_policy)
            .field("cancel", &self.cancel)
            .finish_non_exhaustive()
    }
}

impl PipelineScheduler {
    /// Creates a scheduler with no retries, no event sink and a fresh
    /// cancellation token.
    #[must_use]
    pub fn new(config: RunConfig) -> Self {
        Self {
            config,
            retry_policy: Arc::new(NoRetry),
            events: Arc::new(NoOpEventSink),
            cancel: Arc::new(CancellationToken::new()),
        }
    }

    /// Sets the retry policy consulted after each failed task attempt.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: Arc<dyn RetryPolicy>) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Sets the sink receiving lifecycle events.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    /// Uses a caller-owned cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: Arc<CancellationToken>) -> Self {
        self.cancel = token;
        self
    }

    /// Returns the cancellation token observed by this scheduler.
    #[must_use]
    pub fn cancellation_token(&self) -> Arc<CancellationToken> {
        self.cancel.clone()
    }

    /// Returns the run configuration.
    #[must_use]
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Runs every stage of `pipeline` to a terminal status.
    ///
    /// Task failures do not produce an `Err`; they are reported in the
    /// returned [`RunResult`].
    ///
    /// # Errors
    ///
    /// - [`DevflowError::InvalidConfig`] if the configuration is invalid.
    /// - [`DevflowError::AlreadyExecuted`] if the pipeline was run before.
    /// - [`DevflowError::Internal`] if stages remain unfinished with nothing
    ///   left to run, which a validated graph rules out.
    ///
    /// # Cancel safety
    ///
    /// Dropping the returned future aborts the stage runners it spawned.
    /// Running stages end `Failed`, stages that never started end `Skipped`
    /// with [`SkipReason::Cancelled`], and the pipeline ends `Failed`.
    pub async fn run(
        &self,
        pipeline: &Pipeline,
        executor: Arc<dyn TaskExecutor>,
    ) -> Result<RunResult, DevflowError> {
        self.config.validate()?;
        pipeline.claim()?;

        let run_id = Uuid::new_v4();
        let start = Instant::now();
        let name = pipeline.name().to_string();
        let state = pipeline.shared().clone();
        let topological = pipeline.graph().topological_indices().to_vec();

        info!(
            pipeline = %name,
            run_id = %run_id,
            stages = topological.len(),
            halt_on_failure = self.config.halt_on_failure,
            concurrency_limit = ?self.config.concurrency_limit,
            "Pipeline run started"
        );

        state.write(|s| {
            s.status = PipelineStatus::Running;
            s.started_at = Some(now_utc());
            for (idx, stage) in s.stages.iter_mut().enumerate() {
                if !pipeline.graph().dependency_indices(idx).is_empty() {
                    stage.block();
                }
            }
        });
        let mut guard = RunGuard::new(&name, &state);
        self.publish(PipelineEvent::new(EventKind::PipelineStarted, &name)
            .with_data(serde_json::json!({ "run_id": run_id.to_string() })));

        let mut in_flight = FuturesUnordered::new();
        let mut errors: Vec<RunError> = Vec::new();
        let mut halted = false;
        let mut cancel_reason: Option<String> = None;

        loop {
            if cancel_reason.is_none() && self.cancel.is_cancelled() {
                let reason = self.cancel.reason().unwrap_or_default();
                warn!(pipeline = %name, reason = %reason, "Cancellation requested, no new stages will start");
                cancel_reason = Some(reason);
            }

            let Settled { ready, skipped } = state.write(|s| {
                settle(s, pipeline, &topological, halted, cancel_reason.as_deref())
            });
            for skip in skipped {
                info!(pipeline = %name, stage = %skip.stage, reason = %skip.reason, "Stage skipped");
                self.publish(
                    PipelineEvent::new(EventKind::StageSkipped, &name)
                        .with_stage(&skip.stage)
                        .with_data(serde_json::json!({ "reason": skip.reason.to_string() })),
                );
                errors.push(RunError::StageSkipped(skip));
            }

            for idx in ready {
                if !self.config.has_capacity(in_flight.len()) {
                    break;
                }
                let runner = self.launch(&state, &name, idx, &executor);
                let handle = tokio::spawn(runner.run());
                guard.track(&handle);
                in_flight.push(async move { (idx, handle.await) });
            }

            let Some((idx, joined)) = in_flight.next().await else {
                break;
            };

            let failed = match joined {
                Ok(run) => self.complete(&state, &name, idx, run, &mut errors),
                Err(join_err) => {
                    let detail = join_error_detail(join_err);
                    let stage = state.write(|s| {
                        s.stages[idx].abort(format!("stage runner aborted: {detail}"));
                        s.stages[idx].name.clone()
                    });
                    warn!(pipeline = %name, stage = %stage, detail = %detail, "Stage runner aborted");
                    self.publish(
                        PipelineEvent::new(EventKind::StageFailed, &name)
                            .with_stage(&stage)
                            .with_data(serde_json::json!({ "error": detail.clone() })),
                    );
                    errors.push(RunError::StageAborted { stage, detail });
                    true
                }
            };

            if failed && self.config.halt_on_failure && !halted {
                warn!(pipeline = %name, "Stage failed with halt_on_failure set, no new stages will start");
                halted = true;
            }
        }

        let (overall_status, stages, artifacts, unfinished) = state.write(|s| {
            s.status = PipelineStatus::from_stages(s.stages.iter().map(|st| &st.status));
            s.ended_at = Some(now_utc());
            let unfinished: Vec<String> = s
                .stages
                .iter()
                .filter(|st| !st.status.is_terminal())
                .map(|st| st.name.clone())
                .collect();
            (
                s.status,
                s.stages.iter().map(StageReport::from).collect::<Vec<_>>(),
                s.artifacts.clone(),
                unfinished,
            )
        });

        if !unfinished.is_empty() {
            return Err(DevflowError::Internal(format!(
                "Deadlocked stage graph; remaining stages: {unfinished:?}"
            )));
        }

        guard.disarm();

        let cancelled = errors.iter().any(|e| {
            matches!(e, RunError::StageSkipped(skip) if matches!(skip.reason, SkipReason::Cancelled { .. }))
        });
        let cancel_reason = cancel_reason.filter(|_| cancelled);

        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        info!(
            pipeline = %name,
            run_id = %run_id,
            status = %overall_status,
            duration_ms,
            "Pipeline run finished"
        );
        self.publish(
            PipelineEvent::new(EventKind::PipelineCompleted, &name).with_data(serde_json::json!({
                "run_id": run_id.to_string(),
                "status": overall_status,
                "duration_ms": duration_ms,
            })),
        );

        Ok(RunResult {
            run_id,
            pipeline: name,
            overall_status,
            stages,
            errors,
            artifacts,
            halted,
            cancelled,
            cancel_reason,
            duration_ms,
        })
    }

    /// Marks a ready stage Running and prepares its runner.
    fn launch(
        &self,
        state: &SharedState,
        pipeline: &str,
        idx: usize,
        executor: &Arc<dyn TaskExecutor>,
    ) -> StageRunner {
        let (stage, task_count) = state.write(|s| {
            let stage = &mut s.stages[idx];
            stage.start();
            (stage.name.clone(), stage.tasks.len())
        });
        debug!(pipeline = %pipeline, stage = %stage, tasks = task_count, "Stage started");
        self.publish(PipelineEvent::new(EventKind::StageStarted, pipeline).with_stage(&stage));

        StageRunner {
            pipeline: pipeline.to_string(),
            stage,
            idx,
            task_count,
            state: state.clone(),
            executor: executor.clone(),
            retry_policy: self.retry_policy.clone(),
            events: self.events.clone(),
        }
    }

    /// Settles a finished stage. Returns true if it failed.
    fn complete(
        &self,
        state: &SharedState,
        pipeline: &str,
        idx: usize,
        run: StageRun,
        errors: &mut Vec<RunError>,
    ) -> bool {
        let (stage, status, stage_error, locator) = state.write(|s| {
            let stage = &mut s.stages[idx];
            let status = stage.finish();
            let mut locator = None;
            if status == StageStatus::Succeeded {
                if let Some(artifact) = &stage.artifact {
                    let resolved = run
                        .artifact
                        .clone()
                        .unwrap_or_else(|| format!("{pipeline}/{}/{artifact}", stage.name));
                    stage.artifact_locator = Some(resolved.clone());
                    locator = Some(resolved);
                }
            }
            let name = stage.name.clone();
            let stage_error = stage.error.clone();
            if let Some(locator) = &locator {
                s.artifacts.insert(name.clone(), locator.clone());
            }
            (name, status, stage_error, locator)
        });

        if let Some(failure) = run.failure {
            errors.push(RunError::TaskExecution(failure));
        }

        if status == StageStatus::Succeeded {
            info!(pipeline = %pipeline, stage = %stage, artifact = ?locator, "Stage succeeded");
            self.publish(
                PipelineEvent::new(EventKind::StageSucceeded, pipeline)
                    .with_stage(&stage)
                    .with_data(serde_json::json!({ "artifact": locator })),
            );
            false
        } else {
            warn!(pipeline = %pipeline, stage = %stage, error = ?stage_error, "Stage failed");
            self.publish(
                PipelineEvent::new(EventKind::StageFailed, pipeline)
                    .with_stage(&stage)
                    .with_data(serde_json::json!({ "error": stage_error })),
            );
            true
        }
    }

    fn publish(&self, event: PipelineEvent) {
        self.events.publish(&event);
    }
}

/// Outcome of one frontier recomputation.
struct Settled {
    ready: Vec<usize>,
    skipped: Vec<StageSkippedError>,
}

/// Recomputes the frontier after a state change.
///
/// Walks stages in topological order so a skip cascades to every transitive
/// dependent in a single pass. Stages whose dependencies all succeeded are
/// released to `Pending` and returned as ready, unless the run is halted or
/// cancelled, in which case they are skipped.
fn settle(
    state: &mut PipelineState,
    pipeline: &Pipeline,
    topological: &[usize],
    halted: bool,
    cancel_reason: Option<&str>,
) -> Settled {
    let mut ready = Vec::new();
    let mut skipped = Vec::new();

    for &idx in topological {
        if !matches!(
            state.stages[idx].status,
            StageStatus::Pending | StageStatus::Blocked
        ) {
            continue;
        }

        let deps = pipeline.graph().dependency_indices(idx);
        let blocking = deps
            .iter()
            .map(|&d| &state.stages[d])
            .find(|dep| dep.status.blocks_dependents())
            .map(|dep| {
                let dependency = dep.name.clone();
                if dep.status == StageStatus::Failed {
                    SkipReason::DependencyFailed { dependency }
                } else {
                    SkipReason::DependencySkipped { dependency }
                }
            });

        let reason = if let Some(reason) = blocking {
            Some(reason)
        } else if let Some(reason) = cancel_reason {
            Some(SkipReason::Cancelled {
                reason: reason.to_string(),
            })
        } else if halted {
            Some(SkipReason::Halted)
        } else {
            None
        };

        if let Some(reason) = reason {
            let stage = &mut state.stages[idx];
            stage.skip(reason.clone());
            skipped.push(StageSkippedError::new(stage.name.clone(), reason));
            continue;
        }

        if deps
            .iter()
            .all(|&d| state.stages[d].status == StageStatus::Succeeded)
        {
            state.stages[idx].unblock();
            ready.push(idx);
        }
    }

    Settled { ready, skipped }
}

const RUN_DROPPED: &str = "run dropped before completion";

/// Settles the pipeline if the run future is dropped mid-run.
///
/// Holds an abort handle for every spawned stage runner. Unless disarmed,
/// dropping the guard aborts the runners, fails the stages that were running,
/// skips the stages that never started and marks the pipeline `Failed`.
struct RunGuard {
    pipeline: String,
    state: SharedState,
    runners: Vec<AbortHandle>,
    armed: bool,
}

impl RunGuard {
    fn new(pipeline: &str, state: &SharedState) -> Self {
        Self {
            pipeline: pipeline.to_string(),
            state: state.clone(),
            runners: Vec::new(),
            armed: true,
        }
    }

    fn track(&mut self, handle: &JoinHandle<StageRun>) {
        self.runners.push(handle.abort_handle());
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        for runner in &self.runners {
            runner.abort();
        }
        let (aborted, skipped) = self.state.write(|s| {
            let mut aborted = 0;
            let mut skipped = 0;
            for stage in &mut s.stages {
                if stage.abort(RUN_DROPPED) {
                    aborted += 1;
                } else if stage.skip(SkipReason::Cancelled {
                    reason: RUN_DROPPED.to_string(),
                }) {
                    skipped += 1;
                }
            }
            s.status = PipelineStatus::Failed;
            s.ended_at = Some(now_utc());
            (aborted, skipped)
        });
        warn!(
            pipeline = %self.pipeline,
            aborted,
            skipped,
            "Pipeline run dropped before completion"
        );
    }
}

fn join_error_detail(err: tokio::task::JoinError) -> String {
    if err.is_panic() {
        let panic = err.into_panic();
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        format!("panicked: {message}")
    } else {
        err.to_string()
    }
}

/// What a stage runner hands back to the scheduler.
#[derive(Debug, Default)]
struct StageRun {
    /// Locator reported by the last succeeding task that supplied one.
    artifact: Option<String>,
    /// The failure that stopped the stage, if any.
    failure: Option<TaskExecutionError>,
}

/// Runs one stage's tasks in order on a spawned tokio task.
///
/// Writes only its own stage's task entries; the stage's own status is left
/// to the scheduler.
struct StageRunner {
    pipeline: String,
    stage: String,
    idx: usize,
    task_count: usize,
    state: SharedState,
    executor: Arc<dyn TaskExecutor>,
    retry_policy: Arc<dyn RetryPolicy>,
    events: Arc<dyn EventSink>,
}

impl StageRunner {
    async fn run(self) -> StageRun {
        let mut run = StageRun::default();

        for t in 0..self.task_count {
            let Some(mut task) = self.write_stage(|stage| {
                let task = &mut stage.tasks[t];
                task.start();
                task.clone()
            }) else {
                return run;
            };
            debug!(pipeline = %self.pipeline, stage = %self.stage, task = %task.name, "Task started");
            self.publish(EventKind::TaskStarted, &task.name, serde_json::Value::Null);

            loop {
                match self.executor.execute(&self.stage, &task).await {
                    TaskOutcome::Succeeded { artifact } => {
                        if self.write_stage(|stage| stage.tasks[t].succeed()).is_none() {
                            return run;
                        }
                        debug!(pipeline = %self.pipeline, stage = %self.stage, task = %task.name, "Task succeeded");
                        self.publish(
                            EventKind::TaskSucceeded,
                            &task.name,
                            serde_json::json!({ "attempts": task.attempts }),
                        );
                        if artifact.is_some() {
                            run.artifact = artifact;
                        }
                        break;
                    }
                    TaskOutcome::Failed { detail } => {
                        let error = TaskExecutionError::new(&self.stage, &task.name, &detail);
                        match self.retry_policy.decide(&task, &error) {
                            RetryDecision::Retry(delay) => {
                                self.publish(
                                    EventKind::TaskRetrying,
                                    &task.name,
                                    serde_json::json!({
                                        "attempt": task.attempts,
                                        "error": detail,
                                        "delay_ms": u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                                    }),
                                );
                                tokio::time::sleep(delay).await;
                                let Some(retried) = self.write_stage(|stage| {
                                    let task = &mut stage.tasks[t];
                                    task.retry();
                                    task.clone()
                                }) else {
                                    return run;
                                };
                                task = retried;
                            }
                            RetryDecision::GiveUp => {
                                self.write_stage(|stage| stage.tasks[t].fail(&detail));
                                warn!(
                                    pipeline = %self.pipeline,
                                    stage = %self.stage,
                                    task = %task.name,
                                    attempts = task.attempts,
                                    error = %detail,
                                    "Task failed"
                                );
                                self.publish(
                                    EventKind::TaskFailed,
                                    &task.name,
                                    serde_json::json!({ "error": detail, "attempts": task.attempts }),
                                );
                                run.failure = Some(error);
                                return run;
                            }
                        }
                    }
                }
            }
        }

        run
    }

    /// Applies `f` to this runner's stage while it is still `Running`.
    ///
    /// Returns `None` once the stage was settled elsewhere, e.g. by a dropped
    /// run aborting it.
    fn write_stage<R>(&self, f: impl FnOnce(&mut Stage) -> R) -> Option<R> {
        self.state.write(|s| {
            let stage = &mut s.stages[self.idx];
            (stage.status == StageStatus::Running).then(|| f(stage))
        })
    }

    fn publish(&self, kind: EventKind, task: &str, data: serde_json::Value) {
        self.events.publish(
            &PipelineEvent::new(kind, &self.pipeline)
                .with_stage(&self.stage)
                .with_task(task)
                .with_data(data),
        );
    }
}
