//! Stage dependency graph.
//!
//! Built once from the pipeline's stages and immutable afterwards. Edges point
//! from a stage to the stages it depends on.

use crate::core::Stage;
use crate::errors::{
    CycleDetectedError, DevflowError, PipelineValidationError, UnknownDependencyError,
};
use std::collections::{BTreeSet, HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Validated, acyclic dependency relation over a pipeline's stages.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    /// Stage names in insertion order.
    names: Vec<String>,
    index: HashMap<String, usize>,
    dependencies: Vec<Vec<usize>>,
    dependents: Vec<Vec<usize>>,
    topological: Vec<usize>,
}

impl DependencyGraph {
    /// Validates the stages and builds the graph.
    ///
    /// # Errors
    ///
    /// - [`DevflowError::UnknownDependency`] if a dependency names no stage.
    /// - [`DevflowError::CycleDetected`] if the dependencies form a cycle
    ///   (including a stage depending on itself).
    /// - [`DevflowError::Validation`] if two stages share a name.
    pub fn build(stages: &[Stage]) -> Result<Self, DevflowError> {
        let mut index = HashMap::with_capacity(stages.len());
        for (i, stage) in stages.iter().enumerate() {
            if index.insert(stage.name.clone(), i).is_some() {
                return Err(PipelineValidationError::duplicate_stage(&stage.name).into());
            }
        }

        let mut dependencies = Vec::with_capacity(stages.len());
        let mut dependents = vec![Vec::new(); stages.len()];
        for (i, stage) in stages.iter().enumerate() {
            let mut deps = Vec::with_capacity(stage.depends_on.len());
            for dep in &stage.depends_on {
                let Some(&d) = index.get(dep) else {
                    return Err(UnknownDependencyError::new(&stage.name, dep).into());
                };
                deps.push(d);
                dependents[d].push(i);
            }
            dependencies.push(deps);
        }

        let names: Vec<String> = stages.iter().map(|s| s.name.clone()).collect();
        if let Some(cycle) = find_cycle(&dependencies) {
            let path = cycle.into_iter().map(|i| names[i].clone()).collect();
            return Err(CycleDetectedError::new(path).into());
        }

        let topological = kahn_order(&dependencies, &dependents);

        Ok(Self {
            names,
            index,
            dependencies,
            dependents,
            topological,
        })
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns true if the graph has no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Returns true if the graph contains `stage`.
    #[must_use]
    pub fn contains(&self, stage: &str) -> bool {
        self.index.contains_key(stage)
    }

    /// True iff every dependency of `stage` is in `completed`.
    ///
    /// Unknown stages are never ready.
    #[must_use]
    pub fn ready(&self, stage: &str, completed: &HashSet<String>) -> bool {
        self.index.get(stage).is_some_and(|&i| {
            self.dependencies[i]
                .iter()
                .all(|&d| completed.contains(&self.names[d]))
        })
    }

    /// Stage names in a dependency-respecting order.
    ///
    /// Among stages whose dependencies are all already listed, the one
    /// declared first comes first.
    #[must_use]
    pub fn topological_order(&self) -> Vec<&str> {
        self.topological
            .iter()
            .map(|&i| self.names[i].as_str())
            .collect()
    }

    /// Direct dependencies of `stage`, in declaration order.
    #[must_use]
    pub fn dependencies(&self, stage: &str) -> Vec<&str> {
        self.neighbours(stage, &self.dependencies)
    }

    /// Stages that directly depend on `stage`, in insertion order.
    #[must_use]
    pub fn dependents(&self, stage: &str) -> Vec<&str> {
        self.neighbours(stage, &self.dependents)
    }

    pub(crate) fn topological_indices(&self) -> &[usize] {
        &self.topological
    }

    pub(crate) fn dependency_indices(&self, stage: usize) -> &[usize] {
        &self.dependencies[stage]
    }

    fn neighbours<'a>(&'a self, stage: &str, edges: &'a [Vec<usize>]) -> Vec<&'a str> {
        self.index
            .get(stage)
            .map(|&i| edges[i].iter().map(|&n| self.names[n].as_str()).collect())
            .unwrap_or_default()
    }
}

/// Depth-first white/gray/black search. A back-edge to a gray node closes a
/// cycle; the returned path repeats its first node at the end.
fn find_cycle(dependencies: &[Vec<usize>]) -> Option<Vec<usize>> {
    fn visit(
        node: usize,
        dependencies: &[Vec<usize>],
        colors: &mut [Color],
        path: &mut Vec<usize>,
    ) -> Option<Vec<usize>> {
        colors[node] = Color::Gray;
        path.push(node);

        for &dep in &dependencies[node] {
            match colors[dep] {
                Color::White => {
                    if let Some(cycle) = visit(dep, dependencies, colors, path) {
                        return Some(cycle);
                    }
                }
                Color::Gray => {
                    let start = path.iter().position(|&n| n == dep).unwrap_or(0);
                    let mut cycle = path[start..].to_vec();
                    cycle.push(dep);
                    return Some(cycle);
                }
                Color::Black => {}
            }
        }

        path.pop();
        colors[node] = Color::Black;
        None
    }

    let mut colors = vec![Color::White; dependencies.len()];
    let mut path = Vec::new();
    for node in 0..dependencies.len() {
        if colors[node] == Color::White {
            if let Some(cycle) = visit(node, dependencies, &mut colors, &mut path) {
                return Some(cycle);
            }
        }
    }
    None
}

/// Kahn's algorithm, always releasing the lowest insertion index first.
fn kahn_order(dependencies: &[Vec<usize>], dependents: &[Vec<usize>]) -> Vec<usize> {
    let mut remaining: Vec<usize> = dependencies.iter().map(Vec::len).collect();
    let mut ready: BTreeSet<usize> = remaining
        .iter()
        .enumerate()
        .filter(|(_, &n)| n == 0)
        .map(|(i, _)| i)
        .collect();

    let mut order = Vec::with_capacity(dependencies.len());
    while let Some(next) = ready.pop_first() {
        order.push(next);
        for &child in &dependents[next] {
            remaining[child] -= 1;
            if remaining[child] == 0 {
                ready.insert(child);
            }
        }
    }
    order
}
