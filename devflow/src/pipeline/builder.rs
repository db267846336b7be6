//! Pipeline builder with validation.

use super::{DependencyGraph, Pipeline};
use crate::core::{Stage, Task};
use crate::errors::{ContractErrorInfo, DevflowError, PipelineValidationError};
use std::collections::HashMap;

/// Opaque reference to a stage added to a [`PipelineBuilder`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StageHandle {
    index: usize,
    name: String,
}

impl StageHandle {
    /// Returns the stage name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Builder for creating validated pipelines.
///
/// Stages may reference dependencies that are added later; dependency
/// validation happens once, in [`PipelineBuilder::build`].
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    name: String,
    stages: Vec<Stage>,
    index: HashMap<String, usize>,
}

impl PipelineBuilder {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Adds a stage.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is blank or already taken.
    pub fn add_stage(
        &mut self,
        name: impl Into<String>,
        depends_on: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<StageHandle, PipelineValidationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(PipelineValidationError::new("Stage name cannot be empty or whitespace-only")
                .with_error_info(ContractErrorInfo::new(
                    "DEVFLOW-BUILD-BLANK_NAME",
                    "Stage names must contain a non-whitespace character",
                )));
        }
        if self.index.contains_key(&name) {
            return Err(PipelineValidationError::duplicate_stage(&name));
        }

        let index = self.stages.len();
        self.stages.push(Stage::new(name.clone(), depends_on));
        self.index.insert(name.clone(), index);
        Ok(StageHandle { index, name })
    }

    /// Appends a task to a stage. Tasks run in the order they are added.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is foreign or the task name is taken
    /// within the stage.
    pub fn add_task(
        &mut self,
        stage: &StageHandle,
        name: impl Into<String>,
        task_type: impl Into<String>,
    ) -> Result<(), PipelineValidationError> {
        self.stage_mut(stage)?.add_task(Task::new(name, task_type))
    }

    /// Declares the artifact a stage produces on success.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is foreign.
    pub fn with_artifact(
        &mut self,
        stage: &StageHandle,
        artifact: impl Into<String>,
    ) -> Result<(), PipelineValidationError> {
        self.stage_mut(stage)?.artifact = Some(artifact.into());
        Ok(())
    }

    /// Adds a stage with its tasks in one call.
    ///
    /// `tasks` is a list of `(name, type)` pairs.
    ///
    /// # Errors
    ///
    /// Returns an error under the same conditions as [`Self::add_stage`] and
    /// [`Self::add_task`].
    pub fn stage(
        mut self,
        name: &str,
        depends_on: &[&str],
        tasks: &[(&str, &str)],
    ) -> Result<Self, PipelineValidationError> {
        let handle = self.add_stage(name, depends_on.iter().copied())?;
        for (task, task_type) in tasks {
            self.add_task(&handle, *task, *task_type)?;
        }
        Ok(self)
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Validates the stage set and builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a blank pipeline name or an empty
    /// pipeline, and the graph errors from [`DependencyGraph::build`].
    pub fn build(self) -> Result<Pipeline, DevflowError> {
        if self.name.trim().is_empty() {
            return Err(PipelineValidationError::new(
                "Pipeline name cannot be empty or whitespace-only",
            )
            .into());
        }
        if self.stages.is_empty() {
            return Err(PipelineValidationError::empty().into());
        }

        let graph = DependencyGraph::build(&self.stages)?;
        tracing::debug!(
            pipeline = %self.name,
            stages = self.stages.len(),
            order = ?graph.topological_order(),
            "Pipeline validated"
        );
        Ok(Pipeline::new(self.name, self.stages, graph))
    }

    fn stage_mut(&mut self, handle: &StageHandle) -> Result<&mut Stage, PipelineValidationError> {
        match self.stages.get_mut(handle.index) {
            Some(stage) if stage.name == handle.name => Ok(stage),
            _ => Err(PipelineValidationError::unknown_handle(&handle.name)),
        }
    }
}
