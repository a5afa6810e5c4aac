// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Stage dependency graph and its validation.

use crate::error::GraphError;
use crate::stage::Stage;
use std::collections::{BTreeSet, HashMap};

/// Stages in declaration order.
#[derive(Debug, Clone, Default)]
pub struct PipelineGraph {
    stages: Vec<Stage>,
    positions: HashMap<String, usize>,
}

/// Validated execution order: stages grouped by depth, each level in
/// declaration order. Stages within a level have no dependency on one
/// another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    levels: Vec<Vec<String>>,
}

impl ExecutionPlan {
    #[must_use]
    pub fn levels(&self) -> &[Vec<String>] {
        &self.levels
    }

    /// Flattened topological order.
    pub fn order(&self) -> impl Iterator<Item = &str> {
        self.levels.iter().flatten().map(String::as_str)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

impl PipelineGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_stage(&mut self, stage: Stage) -> Result<&mut Self, GraphError> {
        let name = stage.name().to_string();
        if self.positions.contains_key(&name) {
            return Err(GraphError::DuplicateStage(name));
        }
        self.positions.insert(name, self.stages.len());
        self.stages.push(stage);
        Ok(self)
    }

    /// Builder form of [`PipelineGraph::add_stage`].
    pub fn with_stage(mut self, stage: Stage) -> Result<Self, GraphError> {
        self.add_stage(stage)?;
        Ok(self)
    }

    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.positions.get(name).map(|&i| &self.stages[i])
    }

    #[must_use]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Check dependencies, cycles and watch patterns, then compute the plan.
    pub fn validate(&self) -> Result<ExecutionPlan, GraphError> {
        for stage in &self.stages {
            for dep in stage.dependencies() {
                if !self.positions.contains_key(dep) {
                    return Err(GraphError::MissingDependency {
                        stage: stage.name().to_string(),
                        dependency: dep.clone(),
                    });
                }
            }
            for pattern in stage.watches() {
                if let Err(e) = wax::Glob::new(pattern) {
                    return Err(GraphError::InvalidPattern {
                        stage: stage.name().to_string(),
                        pattern: pattern.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }

        self.detect_cycles()?;

        let depths = self.depths();
        let max_depth = depths.iter().copied().max().unwrap_or(0);
        let mut levels = vec![Vec::new(); if self.stages.is_empty() { 0 } else { max_depth + 1 }];
        for (i, stage) in self.stages.iter().enumerate() {
            levels[depths[i]].push(stage.name().to_string());
        }
        Ok(ExecutionPlan { levels })
    }

    fn detect_cycles(&self) -> Result<(), GraphError> {
        let mut marks = vec![Mark::Unvisited; self.stages.len()];
        let mut path = Vec::new();
        for i in 0..self.stages.len() {
            if marks[i] == Mark::Unvisited {
                self.visit(i, &mut marks, &mut path)?;
            }
        }
        Ok(())
    }

    fn visit(
        &self,
        index: usize,
        marks: &mut [Mark],
        path: &mut Vec<usize>,
    ) -> Result<(), GraphError> {
        marks[index] = Mark::InProgress;
        path.push(index);

        for dep in self.stages[index].dependencies() {
            let dep_index = self.positions[dep];
            match marks[dep_index] {
                Mark::Done => {}
                Mark::Unvisited => self.visit(dep_index, marks, path)?,
                Mark::InProgress => {
                    let start = path.iter().position(|&i| i == dep_index).unwrap_or(0);
                    let mut cycle: Vec<String> = path[start..]
                        .iter()
                        .map(|&i| self.stages[i].name().to_string())
                        .collect();
                    cycle.push(self.stages[dep_index].name().to_string());
                    return Err(GraphError::Cycle { path: cycle });
                }
            }
        }

        path.pop();
        marks[index] = Mark::Done;
        Ok(())
    }

    /// Depth of each stage: 0 for sources, otherwise one more than the
    /// deepest dependency. Only called on acyclic graphs.
    fn depths(&self) -> Vec<usize> {
        fn depth_of(
            graph: &PipelineGraph,
            index: usize,
            memo: &mut [Option<usize>],
        ) -> usize {
            if let Some(depth) = memo[index] {
                return depth;
            }
            let depth = graph.stages[index]
                .dependencies()
                .iter()
                .map(|dep| depth_of(graph, graph.positions[dep], memo) + 1)
                .max()
                .unwrap_or(0);
            memo[index] = Some(depth);
            depth
        }

        let mut memo = vec![None; self.stages.len()];
        (0..self.stages.len())
            .map(|i| depth_of(self, i, &mut memo))
            .collect()
    }

    /// Every stage that depends on `name`, directly or transitively.
    #[must_use]
    pub fn dependents(&self, name: &str) -> BTreeSet<String> {
        let mut found = BTreeSet::new();
        let mut frontier = vec![name.to_string()];
        while let Some(current) = frontier.pop() {
            for stage in &self.stages {
                if stage.dependencies().iter().any(|d| *d == current)
                    && found.insert(stage.name().to_string())
                {
                    frontier.push(stage.name().to_string());
                }
            }
        }
        found
    }

    /// Stages whose documents are materialized by the output writer.
    pub fn output_stages(&self) -> impl Iterator<Item = &Stage> {
        self.stages.iter().filter(|s| s.is_output())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::{StageOutput, transform_fn};

    fn stage(name: &str, deps: &[&str]) -> Stage {
        Stage::new(
            name,
            transform_fn(|_ctx| async { Ok(StageOutput::default()) }),
        )
        .depends_on(deps.iter().copied())
    }

    fn graph(stages: Vec<Stage>) -> PipelineGraph {
        let mut graph = PipelineGraph::new();
        for s in stages {
            graph.add_stage(s).expect("unique stage");
        }
        graph
    }

    #[test]
    fn test_levels_follow_declaration_order() {
        let g = graph(vec![
            stage("read-assets", &[]),
            stage("read-content", &[]),
            stage("markdown", &["read-content"]),
            stage("layout", &["markdown"]),
            stage("output", &["layout", "read-assets"]),
        ]);
        let plan = g.validate().expect("valid graph");
        assert_eq!(
            plan.levels(),
            &[
                vec!["read-assets".to_string(), "read-content".to_string()],
                vec!["markdown".to_string()],
                vec!["layout".to_string()],
                vec!["output".to_string()],
            ]
        );
        let order: Vec<&str> = plan.order().collect();
        assert_eq!(
            order,
            vec!["read-assets", "read-content", "markdown", "layout", "output"]
        );
    }

    #[test]
    fn test_dependency_declared_later_still_runs_first() {
        let g = graph(vec![stage("b", &["a"]), stage("a", &[]), stage("c", &[])]);
        let plan = g.validate().expect("valid graph");
        assert_eq!(
            plan.levels(),
            &[vec!["a".to_string(), "c".to_string()], vec!["b".to_string()]]
        );
    }

    #[test]
    fn test_cycle_is_reported_with_path() {
        let g = graph(vec![
            stage("read", &[]),
            stage("a", &["read", "c"]),
            stage("b", &["a"]),
            stage("c", &["b"]),
        ]);
        match g.validate() {
            Err(GraphError::Cycle { path }) => {
                assert_eq!(path, vec!["a", "c", "b", "a"]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let g = graph(vec![stage("loop", &["loop"])]);
        assert_eq!(
            g.validate(),
            Err(GraphError::Cycle {
                path: vec!["loop".to_string(), "loop".to_string()]
            })
        );
    }

    #[test]
    fn test_missing_dependency() {
        let g = graph(vec![stage("layout", &["markdown"])]);
        assert_eq!(
            g.validate(),
            Err(GraphError::MissingDependency {
                stage: "layout".to_string(),
                dependency: "markdown".to_string(),
            })
        );
    }

    #[test]
    fn test_duplicate_stage_rejected() {
        let mut g = PipelineGraph::new();
        g.add_stage(stage("read", &[])).expect("first");
        assert_eq!(
            g.add_stage(stage("read", &[])).err(),
            Some(GraphError::DuplicateStage("read".to_string()))
        );
    }

    #[test]
    fn test_invalid_watch_pattern() {
        let g = graph(vec![stage("read", &[]).watching("**/{a,")]);
        assert!(matches!(
            g.validate(),
            Err(GraphError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_transitive_dependents() {
        let g = graph(vec![
            stage("read", &[]),
            stage("transform", &["read"]),
            stage("write", &["transform"]),
            stage("other", &[]),
        ]);
        let dependents: Vec<String> = g.dependents("read").into_iter().collect();
        assert_eq!(dependents, vec!["transform", "write"]);
        assert!(g.dependents("other").is_empty());
    }
}
