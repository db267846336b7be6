//! End-to-end tests for pipeline execution.

use crate::cancellation::CancellationToken;
use crate::core::{PipelineStatus, StageStatus, TaskStatus};
use crate::errors::{DevflowError, RunError, SkipReason};
use crate::events::{CollectingEventSink, EventKind};
use crate::executor::{NoOpExecutor, SimulatedExecutor};
use crate::pipeline::{MaxAttempts, Pipeline, PipelineBuilder, PipelineScheduler, RunConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use crate::testing::{
    assert_run_succeeded, assert_snapshot_consistent, assert_stage_status, assert_task_status,
    ScriptedExecutor,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

fn demo() -> Pipeline {
    PipelineBuilder::new("demo")
        .stage("build", &[], &[("compile", "build"), ("test", "test")])
        .unwrap()
        .stage("deploy", &["build"], &[("deploy-to-prod", "deploy")])
        .unwrap()
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_demo_pipeline_runs_to_success() {
    let pipeline = demo();
    let executor = Arc::new(ScriptedExecutor::new());

    let result = pipeline.run(executor.clone(), RunConfig::default()).await.unwrap();

    assert_run_succeeded(&result);
    assert_stage_status(&result, "build", StageStatus::Succeeded);
    assert_stage_status(&result, "deploy", StageStatus::Succeeded);
    assert_eq!(
        executor.call_keys(),
        vec!["build/compile", "build/test", "deploy/deploy-to-prod"]
    );

    let snapshot = pipeline.snapshot();
    assert_snapshot_consistent(&snapshot);
    assert_eq!(snapshot.status, PipelineStatus::Succeeded);
    assert!(snapshot.started_at.is_some() && snapshot.ended_at.is_some());
    assert!(snapshot
        .stages
        .iter()
        .flat_map(|s| &s.tasks)
        .all(|t| t.status == TaskStatus::Succeeded && t.attempts == 1));
}

#[tokio::test]
async fn test_compile_failure_stops_stage_and_skips_deploy() {
    let pipeline = demo();
    let executor = Arc::new(ScriptedExecutor::new().fail("build/compile", "syntax error"));

    let result = pipeline.run(executor.clone(), RunConfig::default()).await.unwrap();

    assert_eq!(result.overall_status, PipelineStatus::Failed);
    assert_stage_status(&result, "build", StageStatus::Failed);
    assert_stage_status(&result, "deploy", StageStatus::Skipped);
    assert_eq!(executor.call_keys(), vec!["build/compile"]);

    let snapshot = pipeline.snapshot();
    assert_snapshot_consistent(&snapshot);
    assert_task_status(&snapshot, "build", "compile", TaskStatus::Failed);
    assert_task_status(&snapshot, "build", "test", TaskStatus::Pending);
    assert_task_status(&snapshot, "deploy", "deploy-to-prod", TaskStatus::Pending);
    assert_eq!(
        result.stage("deploy").unwrap().skip_reason,
        Some(SkipReason::DependencyFailed {
            dependency: "build".to_string()
        })
    );
    assert_eq!(result.failures().count(), 1);
}

#[test]
fn test_cycle_rejected_before_any_task_runs() {
    let err = PipelineBuilder::new("cyclic")
        .stage("build", &["deploy"], &[("compile", "build")])
        .unwrap()
        .stage("deploy", &["build"], &[("push", "deploy")])
        .unwrap()
        .build()
        .unwrap_err();

    match err {
        DevflowError::CycleDetected(e) => {
            assert_eq!(e.cycle_path, vec!["build", "deploy", "build"]);
            assert_eq!(e.error_info.code, "DEVFLOW-GRAPH-CYCLE");
        }
        other => panic!("expected CycleDetected, got {other:?}"),
    }
}

#[test]
fn test_unknown_dependency_rejected() {
    let err = PipelineBuilder::new("typo")
        .stage("build", &[], &[("compile", "build")])
        .unwrap()
        .stage("deploy", &["biuld"], &[("push", "deploy")])
        .unwrap()
        .build()
        .unwrap_err();

    assert!(
        matches!(err, DevflowError::UnknownDependency(ref e) if e.stage == "deploy" && e.missing == "biuld")
    );
}

#[tokio::test]
async fn test_independent_branch_runs_past_failure() {
    let pipeline = PipelineBuilder::new("branches")
        .stage("a", &[], &[("work", "build")])
        .unwrap()
        .stage("b", &["a"], &[("work", "build")])
        .unwrap()
        .stage("c", &["b"], &[("work", "build")])
        .unwrap()
        .stage("docs", &[], &[("render", "build")])
        .unwrap()
        .build()
        .unwrap();
    let executor = Arc::new(ScriptedExecutor::new().fail("a/work", "disk full"));

    let result = pipeline.run(executor.clone(), RunConfig::default()).await.unwrap();

    assert_stage_status(&result, "a", StageStatus::Failed);
    assert_stage_status(&result, "b", StageStatus::Skipped);
    assert_stage_status(&result, "c", StageStatus::Skipped);
    assert_stage_status(&result, "docs", StageStatus::Succeeded);
    assert_eq!(
        result.stage("c").unwrap().skip_reason,
        Some(SkipReason::DependencySkipped {
            dependency: "b".to_string()
        })
    );
    assert_eq!(executor.call_count("b/work"), 0);
    assert_eq!(executor.call_count("docs/render"), 1);
}

#[tokio::test]
async fn test_diamond_waits_for_every_dependency() {
    let pipeline = PipelineBuilder::new("diamond")
        .stage("build", &[], &[("compile", "build")])
        .unwrap()
        .stage("unit", &["build"], &[("run", "test")])
        .unwrap()
        .stage("integration", &["build"], &[("run", "test")])
        .unwrap()
        .stage("deploy", &["unit", "integration"], &[("push", "deploy")])
        .unwrap()
        .build()
        .unwrap();

    let executor = Arc::new(ScriptedExecutor::new().fail("integration/run", "timeout"));
    let result = pipeline.run(executor, RunConfig::default()).await.unwrap();

    assert_stage_status(&result, "unit", StageStatus::Succeeded);
    assert_stage_status(&result, "integration", StageStatus::Failed);
    assert_eq!(
        result.stage("deploy").unwrap().skip_reason,
        Some(SkipReason::DependencyFailed {
            dependency: "integration".to_string()
        })
    );
}

#[tokio::test]
async fn test_tasks_run_in_declaration_order() {
    let pipeline = PipelineBuilder::new("ordered")
        .stage("s", &[], &[("t1", "build"), ("t2", "build"), ("t3", "build")])
        .unwrap()
        .build()
        .unwrap();
    let executor = Arc::new(ScriptedExecutor::new().with_delay("s/t1", Duration::from_millis(5)));

    pipeline.run(executor.clone(), RunConfig::default()).await.unwrap();

    assert_eq!(executor.call_keys(), vec!["s/t1", "s/t2", "s/t3"]);
    assert_eq!(executor.peak_concurrency(), 1);

    let snapshot = pipeline.snapshot();
    let tasks = &snapshot.stage("s").unwrap().tasks;
    assert!(tasks[0].ended_at <= tasks[1].started_at);
    assert!(tasks[1].ended_at <= tasks[2].started_at);
}

#[tokio::test]
async fn test_middle_task_failure_leaves_rest_pending() {
    let pipeline = PipelineBuilder::new("ordered")
        .stage("s", &[], &[("t1", "build"), ("t2", "build"), ("t3", "build")])
        .unwrap()
        .build()
        .unwrap();
    let executor = Arc::new(ScriptedExecutor::new().fail("s/t2", "exit code 1"));

    let result = pipeline.run(executor.clone(), RunConfig::default()).await.unwrap();

    assert_stage_status(&result, "s", StageStatus::Failed);
    assert_eq!(executor.call_keys(), vec!["s/t1", "s/t2"]);

    let snapshot = pipeline.snapshot();
    assert_task_status(&snapshot, "s", "t1", TaskStatus::Succeeded);
    assert_task_status(&snapshot, "s", "t2", TaskStatus::Failed);
    assert_task_status(&snapshot, "s", "t3", TaskStatus::Pending);
    assert!(snapshot.stage("s").unwrap().task("t3").unwrap().started_at.is_none());
    assert_eq!(
        result.stage("s").unwrap().error.as_deref(),
        Some("task 't2' failed: exit code 1")
    );
}

fn halting_pipeline() -> Pipeline {
    PipelineBuilder::new("halting")
        .stage("lint", &[], &[("clippy", "test")])
        .unwrap()
        .stage("build", &[], &[("compile", "build")])
        .unwrap()
        .stage("deploy", &["build"], &[("push", "deploy")])
        .unwrap()
        .build()
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_halt_on_failure_skips_unlaunched_stages() {
    let pipeline = halting_pipeline();
    let executor = Arc::new(
        ScriptedExecutor::new()
            .fail("lint/clippy", "warnings denied")
            .with_delay("build/compile", Duration::from_millis(50)),
    );

    let result = pipeline
        .run(executor.clone(), RunConfig::new().with_halt_on_failure(true))
        .await
        .unwrap();

    assert!(result.halted);
    assert_stage_status(&result, "lint", StageStatus::Failed);
    // Already in flight when the run halted.
    assert_stage_status(&result, "build", StageStatus::Succeeded);
    assert_stage_status(&result, "deploy", StageStatus::Skipped);
    assert_eq!(result.stage("deploy").unwrap().skip_reason, Some(SkipReason::Halted));
    assert_eq!(executor.call_count("deploy/push"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_without_halt_independent_work_continues() {
    let pipeline = halting_pipeline();
    let executor = Arc::new(
        ScriptedExecutor::new()
            .fail("lint/clippy", "warnings denied")
            .with_delay("build/compile", Duration::from_millis(50)),
    );

    let result = pipeline.run(executor, RunConfig::default()).await.unwrap();

    assert!(!result.halted);
    assert_eq!(result.overall_status, PipelineStatus::Failed);
    assert_stage_status(&result, "deploy", StageStatus::Succeeded);
}

#[tokio::test(start_paused = true)]
async fn test_concurrency_limit_bounds_running_stages() {
    let builder = ["a", "b", "c", "d"].iter().fold(PipelineBuilder::new("wide"), |b, name| {
        b.stage(name, &[], &[("work", "build")]).unwrap()
    });

    let limited = builder.clone().build().unwrap();
    let executor = Arc::new(ScriptedExecutor::new().with_default_delay(Duration::from_millis(10)));
    let result = limited
        .run(executor.clone(), RunConfig::new().with_concurrency_limit(1))
        .await
        .unwrap();
    assert_run_succeeded(&result);
    assert_eq!(executor.peak_concurrency(), 1);
    // With one slot, stages start in insertion order.
    assert_eq!(executor.call_keys(), vec!["a/work", "b/work", "c/work", "d/work"]);

    let unbounded = builder.build().unwrap();
    let executor = Arc::new(ScriptedExecutor::new().with_default_delay(Duration::from_millis(10)));
    unbounded.run(executor.clone(), RunConfig::default()).await.unwrap();
    assert_eq!(executor.peak_concurrency(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_snapshots_stay_consistent_during_run() {
    let pipeline = demo();
    let executor = Arc::new(ScriptedExecutor::new().with_default_delay(Duration::from_millis(10)));

    let observe = async {
        let mut seen_running = false;
        loop {
            let snapshot = pipeline.snapshot();
            assert_snapshot_consistent(&snapshot);
            if snapshot.status == PipelineStatus::Running {
                seen_running = true;
                assert!(snapshot.running_stages().len() <= 1);
            }
            if matches!(snapshot.status, PipelineStatus::Succeeded | PipelineStatus::Failed) {
                return seen_running;
            }
            tokio::time::sleep(Duration::from_millis(3)).await;
        }
    };

    let (result, seen_running) = tokio::join!(pipeline.run(executor, RunConfig::default()), observe);

    assert_run_succeeded(&result.unwrap());
    assert!(seen_running);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_lets_in_flight_stages_finish() {
    let pipeline = PipelineBuilder::new("cancel")
        .stage("build", &[], &[("compile", "build")])
        .unwrap()
        .stage("deploy", &["build"], &[("push", "deploy")])
        .unwrap()
        .build()
        .unwrap();
    let executor = Arc::new(ScriptedExecutor::new().with_delay("build/compile", Duration::from_millis(50)));
    let token = Arc::new(CancellationToken::new());
    let scheduler = PipelineScheduler::new(RunConfig::default()).with_cancellation(token.clone());

    let cancel = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel("user abort");
    };
    let (result, ()) = tokio::join!(scheduler.run(&pipeline, executor.clone()), cancel);
    let result = result.unwrap();

    assert!(result.cancelled);
    assert_eq!(result.cancel_reason.as_deref(), Some("user abort"));
    assert_eq!(result.overall_status, PipelineStatus::Failed);
    assert_stage_status(&result, "build", StageStatus::Succeeded);
    assert_stage_status(&result, "deploy", StageStatus::Skipped);
    assert_eq!(
        result.stage("deploy").unwrap().skip_reason,
        Some(SkipReason::Cancelled {
            reason: "user abort".to_string()
        })
    );
    assert_eq!(executor.call_count("deploy/push"), 0);
}

#[tokio::test]
async fn test_cancelled_before_start_runs_nothing() {
    let pipeline = demo();
    let executor = Arc::new(ScriptedExecutor::new());
    let scheduler = PipelineScheduler::new(RunConfig::default());
    scheduler.cancellation_token().cancel("maintenance window");

    let result = scheduler.run(&pipeline, executor.clone()).await.unwrap();

    assert!(result.cancelled);
    assert!(executor.calls().is_empty());
    assert!(result.stages.iter().all(|s| s.status == StageStatus::Skipped));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_after_last_launch_is_not_reported_as_cancelled() {
    let pipeline = PipelineBuilder::new("single")
        .stage("build", &[], &[("compile", "build")])
        .unwrap()
        .build()
        .unwrap();
    let executor = Arc::new(ScriptedExecutor::new().with_default_delay(Duration::from_millis(50)));
    let token = Arc::new(CancellationToken::new());
    let scheduler = PipelineScheduler::new(RunConfig::default()).with_cancellation(token.clone());

    let cancel = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel("too late");
    };
    let (result, ()) = tokio::join!(scheduler.run(&pipeline, executor), cancel);
    let result = result.unwrap();

    assert_run_succeeded(&result);
    assert!(!result.cancelled);
    assert_eq!(result.cancel_reason, None);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_run_settles_every_stage() {
    let pipeline = demo();
    let executor = Arc::new(ScriptedExecutor::new().with_default_delay(Duration::from_millis(50)));

    let timed_out = tokio::time::timeout(
        Duration::from_millis(10),
        pipeline.run(executor.clone(), RunConfig::default()),
    )
    .await;
    assert!(timed_out.is_err());

    let dropped = pipeline.snapshot();
    assert_eq!(dropped.status, PipelineStatus::Failed);
    assert_eq!(dropped.stage_status("build"), Some(StageStatus::Failed));
    assert_eq!(dropped.stage_status("deploy"), Some(StageStatus::Skipped));
    assert_task_status(&dropped, "build", "compile", TaskStatus::Failed);
    assert_task_status(&dropped, "build", "test", TaskStatus::Pending);
    assert!(matches!(
        dropped.stage("deploy").unwrap().skip_reason,
        Some(SkipReason::Cancelled { .. })
    ));
    assert!(dropped.ended_at.is_some());
    assert_snapshot_consistent(&dropped);

    // The aborted runner must not touch state afterwards.
    tokio::time::sleep(Duration::from_millis(500)).await;
    let later = pipeline.snapshot();
    assert_eq!(later, dropped);
    assert_eq!(executor.call_keys(), vec!["build/compile"]);

    let again = pipeline.run(executor, RunConfig::default()).await;
    assert!(matches!(again, Err(DevflowError::AlreadyExecuted(_))));
}

#[tokio::test]
async fn test_event_ordering() {
    let pipeline = demo();
    let sink = Arc::new(CollectingEventSink::new());
    let scheduler = PipelineScheduler::new(RunConfig::default()).with_event_sink(sink.clone());

    scheduler.run(&pipeline, Arc::new(NoOpExecutor)).await.unwrap();

    let events = sink.events();
    assert_eq!(events.first().map(|e| e.kind), Some(EventKind::PipelineStarted));
    assert_eq!(events.last().map(|e| e.kind), Some(EventKind::PipelineCompleted));
    assert!(
        sink.position(EventKind::StageSucceeded, "build").unwrap()
            < sink.position(EventKind::StageStarted, "deploy").unwrap()
    );

    let task_events: Vec<_> = events
        .iter()
        .filter(|e| e.stage.as_deref() == Some("build") && e.task.is_some())
        .map(|e| (e.kind, e.task.clone().unwrap_or_default()))
        .collect();
    assert_eq!(
        task_events,
        vec![
            (EventKind::TaskStarted, "compile".to_string()),
            (EventKind::TaskSucceeded, "compile".to_string()),
            (EventKind::TaskStarted, "test".to_string()),
            (EventKind::TaskSucceeded, "test".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_skip_events_published() {
    let pipeline = demo();
    let sink = Arc::new(CollectingEventSink::new());
    let executor = Arc::new(ScriptedExecutor::new().fail("build/test", "3 tests failed"));

    PipelineScheduler::new(RunConfig::default())
        .with_event_sink(sink.clone())
        .run(&pipeline, executor)
        .await
        .unwrap();

    assert_eq!(sink.events_of_kind(EventKind::TaskFailed).len(), 1);
    assert!(sink.position(EventKind::StageFailed, "build").is_some());
    assert!(sink.position(EventKind::StageSkipped, "deploy").is_some());
    assert!(sink.position(EventKind::StageStarted, "deploy").is_none());
}

#[tokio::test]
async fn test_retry_exhaustion_fails_task() {
    let pipeline = demo();
    let executor = Arc::new(
        ScriptedExecutor::new()
            .fail("build/test", "flaky")
            .fail("build/test", "flaky")
            .fail("build/test", "still flaky"),
    );

    let result = PipelineScheduler::new(RunConfig::default())
        .with_retry_policy(Arc::new(MaxAttempts::new(3, Duration::ZERO)))
        .run(&pipeline, executor.clone())
        .await
        .unwrap();

    assert_stage_status(&result, "build", StageStatus::Failed);
    let attempts: Vec<u32> = executor.calls().iter().filter(|c| c.task == "test").map(|c| c.attempt).collect();
    assert_eq!(attempts, vec![1, 2, 3]);

    let snapshot = pipeline.snapshot();
    let test = snapshot.stage("build").unwrap().task("test").unwrap();
    assert_eq!(test.attempts, 3);
    assert_eq!(test.error.as_deref(), Some("still flaky"));
}

#[tokio::test]
async fn test_executor_panic_fails_stage() {
    let pipeline = demo();
    let executor = Arc::new(ScriptedExecutor::new().panic_on("build/compile", "executor crashed"));

    let result = pipeline.run(executor, RunConfig::default()).await.unwrap();

    assert_stage_status(&result, "build", StageStatus::Failed);
    assert_stage_status(&result, "deploy", StageStatus::Skipped);
    assert!(result
        .errors
        .iter()
        .any(|e| matches!(e, RunError::StageAborted { stage, detail } if stage == "build" && detail.contains("executor crashed"))));
    assert_eq!(pipeline.status(), PipelineStatus::Failed);

    let snapshot = pipeline.snapshot();
    assert_snapshot_consistent(&snapshot);
    assert_task_status(&snapshot, "build", "compile", TaskStatus::Failed);
    assert_task_status(&snapshot, "build", "test", TaskStatus::Pending);
}

#[tokio::test]
async fn test_artifacts_keyed_by_stage() {
    let mut builder = PipelineBuilder::new("release");
    let build = builder.add_stage("build", Vec::<String>::new()).unwrap();
    builder.add_task(&build, "compile", "build").unwrap();
    builder.with_artifact(&build, "app.tar.gz").unwrap();
    let deploy = builder.add_stage("deploy", ["build"]).unwrap();
    builder.add_task(&deploy, "push", "deploy").unwrap();
    let pipeline = builder.build().unwrap();

    let result = pipeline.run(Arc::new(NoOpExecutor), RunConfig::default()).await.unwrap();

    assert_eq!(result.artifacts.len(), 1);
    assert_eq!(result.artifacts.get("build").map(String::as_str), Some("release/build/app.tar.gz"));
    assert_eq!(pipeline.artifacts(), result.artifacts);
}

#[tokio::test(start_paused = true)]
async fn test_simulated_executor_drives_demo() {
    let pipeline = demo();
    let executor = SimulatedExecutor::new().with_unit(Duration::from_millis(1));

    let result = pipeline.run(Arc::new(executor), RunConfig::default()).await.unwrap();

    assert_run_succeeded(&result);
    assert!(result.duration_ms >= 0.0);
}

#[test]
fn test_run_blocking_outside_runtime() {
    let pipeline = demo();
    let result = pipeline.run_blocking(Arc::new(NoOpExecutor), RunConfig::default()).unwrap();
    assert_run_succeeded(&result);

    let again = pipeline.run_blocking(Arc::new(NoOpExecutor), RunConfig::default());
    assert!(matches!(again, Err(DevflowError::AlreadyExecuted(_))));
}

#[tokio::test]
async fn test_run_blocking_inside_runtime_is_rejected() {
    let pipeline = demo();

    let blocked = pipeline.run_blocking(Arc::new(NoOpExecutor), RunConfig::default());
    assert!(matches!(blocked, Err(DevflowError::Internal(_))));
    assert_eq!(pipeline.status(), PipelineStatus::Pending);

    // The rejected call did not consume the pipeline.
    let result = pipeline.run(Arc::new(NoOpExecutor), RunConfig::default()).await.unwrap();
    assert_run_succeeded(&result);
}

#[test]
fn test_run_result_serializes() {
    let pipeline = demo();
    let result = tokio_test::block_on(pipeline.run(Arc::new(NoOpExecutor), RunConfig::default())).unwrap();

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["overall_status"], "succeeded");
    assert_eq!(json["stages"][1]["name"], "deploy");
    assert_eq!(json["run_id"], result.run_id.to_string());
}

/// Builds a layered pipeline from `rng`: each stage depends on a non-empty
/// random subset of the previous layer, so wide layers form diamonds.
/// Returns the pipeline and an executor scripted with random task failures.
fn random_layered(rng: &mut StdRng) -> (Pipeline, ScriptedExecutor) {
    let mut builder = PipelineBuilder::new("generated");
    let mut executor = ScriptedExecutor::new();
    let mut previous: Vec<String> = Vec::new();

    for layer in 0..rng.gen_range(1..=5) {
        let mut current = Vec::new();
        for i in 0..rng.gen_range(1..=4) {
            let name = format!("l{layer}s{i}");
            let mut deps: Vec<String> = previous.iter().filter(|_| rng.gen_bool(0.5)).cloned().collect();
            if deps.is_empty() && !previous.is_empty() {
                deps.push(previous[rng.gen_range(0..previous.len())].clone());
            }
            let handle = builder.add_stage(&name, deps).unwrap();
            for t in 0..rng.gen_range(0..=3) {
                let task = format!("t{t}");
                builder.add_task(&handle, &task, "build").unwrap();
                let key = format!("{name}/{task}");
                executor = executor.with_delay(&key, Duration::from_millis(rng.gen_range(0..=5)));
                if rng.gen_bool(0.15) {
                    executor = executor.fail(&key, "generated failure");
                }
            }
            current.push(name);
        }
        previous = current;
    }

    (builder.build().unwrap(), executor)
}

#[tokio::test(start_paused = true)]
async fn test_generated_pipelines_always_settle() {
    for seed in 0..64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let (pipeline, executor) = random_layered(&mut rng);
        let halt = rng.gen_bool(0.3);
        let mut config = RunConfig::new().with_halt_on_failure(halt);
        if rng.gen_bool(0.5) {
            config = config.with_concurrency_limit(rng.gen_range(1..=3));
        }

        let result = pipeline.run(Arc::new(executor), config).await.unwrap();
        let snapshot = pipeline.snapshot();

        assert!(
            result.stages.iter().all(|s| s.status.is_terminal()),
            "seed {seed}: unfinished stage in {:?}",
            result.stages
        );
        assert_snapshot_consistent(&snapshot);
        assert_eq!(snapshot.status, result.overall_status, "seed {seed}");
        assert_eq!(
            result.is_success(),
            result.stages.iter().all(|s| s.status == StageStatus::Succeeded),
            "seed {seed}"
        );

        for stage in &snapshot.stages {
            let deps_ok = stage
                .depends_on
                .iter()
                .all(|d| snapshot.stage_status(d) == Some(StageStatus::Succeeded));
            if !deps_ok {
                assert_eq!(stage.status, StageStatus::Skipped, "seed {seed}: stage {}", stage.name);
            } else if !result.halted {
                assert_ne!(stage.status, StageStatus::Skipped, "seed {seed}: stage {}", stage.name);
            }

            if stage.status == StageStatus::Failed {
                let statuses: Vec<TaskStatus> = stage.tasks.iter().map(|t| t.status).collect();
                let failed_at = statuses.iter().position(|s| *s == TaskStatus::Failed);
                let failed_at = failed_at.unwrap_or_else(|| panic!("seed {seed}: {} has no failed task", stage.name));
                assert!(statuses[..failed_at].iter().all(|s| *s == TaskStatus::Succeeded), "seed {seed}");
                assert!(statuses[failed_at + 1..].iter().all(|s| *s == TaskStatus::Pending), "seed {seed}");
            }
        }
    }
}
