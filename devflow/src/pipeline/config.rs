//! Run configuration.

use crate::errors::DevflowError;
use serde::{Deserialize, Serialize};

/// Configuration for a single pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Stop launching stages once any stage fails. In-flight stages still
    /// finish; everything not yet launched is skipped.
    pub halt_on_failure: bool,
    /// Maximum number of stages running at once. `None` is unbounded.
    pub concurrency_limit: Option<usize>,
}

impl RunConfig {
    /// Creates the default configuration: continue past failures, unbounded.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `halt_on_failure`.
    #[must_use]
    pub fn with_halt_on_failure(mut self, halt: bool) -> Self {
        self.halt_on_failure = halt;
        self
    }

    /// Bounds the number of concurrently running stages.
    #[must_use]
    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = Some(limit);
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`DevflowError::InvalidConfig`] for a concurrency limit of zero,
    /// which could never launch a stage.
    pub fn validate(&self) -> Result<(), DevflowError> {
        if self.concurrency_limit == Some(0) {
            return Err(DevflowError::InvalidConfig(
                "concurrency_limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn has_capacity(&self, in_flight: usize) -> bool {
        self.concurrency_limit.map_or(true, |limit| in_flight < limit)
    }
}
