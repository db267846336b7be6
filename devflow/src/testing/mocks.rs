//! Scripted task executor for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::core::Task;
use crate::executor::{TaskExecutor, TaskOutcome};

/// A recorded executor call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// Owning stage.
    pub stage: String,
    /// Task name.
    pub task: String,
    /// Attempt number the task was on.
    pub attempt: u32,
}

impl RecordedCall {
    /// Returns the `stage/task` key of the call.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}/{}", self.stage, self.task)
    }
}

#[derive(Debug, Clone)]
enum Step {
    Outcome(TaskOutcome),
    Panic(String),
}

/// An executor whose behavior is scripted per task.
///
/// Tasks are addressed as `"stage/task"`. Each call pops the next scripted
/// step for its task; once the script runs out the task succeeds. Every call
/// is recorded.
///
/// ```rust,ignore
/// let executor = ScriptedExecutor::new()
///     .fail("build/compile", "syntax error")
///     .with_delay("deploy/push", Duration::from_millis(50));
/// ```
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    delays: HashMap<String, Duration>,
    default_delay: Duration,
    calls: Mutex<Vec<RecordedCall>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedExecutor {
    /// Creates an executor that succeeds every task immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a failure for the next call of `key`.
    #[must_use]
    pub fn fail(self, key: &str, detail: impl Into<String>) -> Self {
        self.push(key, Step::Outcome(TaskOutcome::failure(detail)))
    }

    /// Queues a success reporting an artifact locator for the next call of
    /// `key`.
    #[must_use]
    pub fn produce(self, key: &str, locator: impl Into<String>) -> Self {
        self.push(key, Step::Outcome(TaskOutcome::success_with_artifact(locator)))
    }

    /// Queues a panic for the next call of `key`.
    #[must_use]
    pub fn panic_on(self, key: &str, message: impl Into<String>) -> Self {
        self.push(key, Step::Panic(message.into()))
    }

    /// Delays every call of `key`.
    #[must_use]
    pub fn with_delay(mut self, key: &str, delay: Duration) -> Self {
        self.delays.insert(key.to_string(), delay);
        self
    }

    /// Delays every call without a per-task delay.
    #[must_use]
    pub fn with_default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    /// Returns every call made, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Returns the `stage/task` keys of every call made, in order.
    #[must_use]
    pub fn call_keys(&self) -> Vec<String> {
        self.calls.lock().iter().map(RecordedCall::key).collect()
    }

    /// Returns how many times `key` was executed.
    #[must_use]
    pub fn call_count(&self, key: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.key() == key).count()
    }

    /// Returns the highest number of calls that were in progress at once.
    #[must_use]
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn push(self, key: &str, step: Step) -> Self {
        self.scripts
            .lock()
            .entry(key.to_string())
            .or_default()
            .push_back(step);
        self
    }
}

/// Decrements the in-progress counter even if the call panics.
struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl TaskExecutor for ScriptedExecutor {
    async fn execute(&self, stage: &str, task: &Task) -> TaskOutcome {
        let key = format!("{stage}/{}", task.name);
        self.calls.lock().push(RecordedCall {
            stage: stage.to_string(),
            task: task.name.clone(),
            attempt: task.attempts,
        });

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _guard = ActiveGuard(&self.active);

        let delay = self.delays.get(&key).copied().unwrap_or(self.default_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let step = self.scripts.lock().get_mut(&key).and_then(VecDeque::pop_front);
        match step {
            Some(Step::Outcome(outcome)) => outcome,
            Some(Step::Panic(message)) => panic!("{message}"),
            None => TaskOutcome::success(),
        }
    }
}
