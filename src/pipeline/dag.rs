// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 flowline contributors

//! DAG (Directed Acyclic Graph) analysis for task dependencies
//!
//! Builds an explicit adjacency structure from the edges recorded via
//! `Pipeline::depends_on`, detects cycles, derives a deterministic
//! topological order, and computes the per-stage concurrency waves the
//! executor and the execution plot use.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use petgraph::algo::{has_path_connecting, tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use crate::errors::{FlowlineError, FlowlineResult};
use crate::pipeline::Pipeline;
use crate::task::TaskId;

/// Dependency graph over the scheduled tasks of a pipeline.
///
/// Only tasks that belong to a stage become nodes; `Pipeline::compile`
/// rejects dependencies on unscheduled tasks before this graph is built.
/// Node insertion follows stage order, then membership order within a
/// stage, which is what makes the topological tie-break deterministic.
#[derive(Debug)]
pub(crate) struct TaskGraph {
    graph: DiGraph<TaskId, ()>,
    index_of: HashMap<TaskId, NodeIndex>,
}

impl TaskGraph {
    /// Build the graph from a pipeline's recorded edges and validate that it
    /// is acyclic.
    pub(crate) fn build(pipeline: &Pipeline) -> FlowlineResult<Self> {
        let mut graph = DiGraph::new();
        let mut index_of = HashMap::new();

        for stage in &pipeline.stages {
            for &id in stage.members() {
                let node = graph.add_node(id);
                index_of.insert(id, node);
            }
        }

        let mut dag = Self { graph, index_of };

        for stage in &pipeline.stages {
            for &id in stage.members() {
                let task_node = dag.index_of[&id];
                for &dep in &pipeline.tasks[id.index()].deps {
                    let dep_node = dag.index_of[&dep];
                    // no parallel edges; self-edges stay for cycle detection
                    if !dag.graph.contains_edge(dep_node, task_node) {
                        dag.graph.add_edge(dep_node, task_node, ());
                    }
                }
            }
        }

        dag.validate_acyclic(pipeline)?;

        Ok(dag)
    }

    /// Validate that the graph is acyclic.
    fn validate_acyclic(&self, pipeline: &Pipeline) -> FlowlineResult<()> {
        match toposort(&self.graph, None) {
            Ok(_) => Ok(()),
            Err(cycle) => Err(FlowlineError::Cycle {
                tasks: self.cycle_members(cycle.node_id(), pipeline),
            }),
        }
    }

    /// Names of the tasks participating in the cycle containing `start`,
    /// falling back to any cycle when `start` sits outside one.
    fn cycle_members(&self, start: NodeIndex, pipeline: &Pipeline) -> Vec<String> {
        let names = |mut scc: Vec<NodeIndex>| {
            scc.sort();
            scc.into_iter()
                .map(|n| pipeline.task_label(self.graph[n]))
                .collect::<Vec<_>>()
        };

        let mut fallback = None;
        for scc in tarjan_scc(&self.graph) {
            let cyclic = scc.len() > 1
                || scc
                    .first()
                    .is_some_and(|&n| self.graph.contains_edge(n, n));
            if !cyclic {
                continue;
            }
            if scc.contains(&start) {
                return names(scc);
            }
            fallback.get_or_insert(scc);
        }

        match fallback {
            Some(scc) => names(scc),
            None => vec![pipeline.task_label(self.graph[start])],
        }
    }

    /// Deterministic topological order over all scheduled tasks.
    ///
    /// Kahn's algorithm with the ready set kept as a min-heap over node
    /// insertion order, so ties resolve to the order tasks were added to
    /// their stages.
    pub(crate) fn topological_order(&self) -> Vec<TaskId> {
        let mut indegree: HashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|n| (n, self.graph.neighbors_directed(n, Direction::Incoming).count()))
            .collect();

        let mut ready: BinaryHeap<Reverse<NodeIndex>> = indegree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(&n, _)| Reverse(n))
            .collect();

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some(Reverse(node)) = ready.pop() {
            order.push(self.graph[node]);
            for next in self.graph.neighbors_directed(node, Direction::Outgoing) {
                let deg = indegree.get_mut(&next).expect("node has an indegree entry");
                *deg -= 1;
                if *deg == 0 {
                    ready.push(Reverse(next));
                }
            }
        }

        debug_assert_eq!(order.len(), self.graph.node_count());
        order
    }

    /// Check that every dependency lives in the same or an earlier stage
    /// than its dependent.
    pub(crate) fn check_stage_order(&self, pipeline: &Pipeline) -> FlowlineResult<()> {
        for edge in self.graph.edge_indices() {
            let (dep_node, task_node) = self
                .graph
                .edge_endpoints(edge)
                .expect("edge index from the graph itself");
            let dep = self.graph[dep_node];
            let task = self.graph[task_node];

            let dep_stage = pipeline.tasks[dep.index()].stage.expect("scheduled");
            let task_stage = pipeline.tasks[task.index()].stage.expect("scheduled");

            if dep_stage > task_stage {
                return Err(FlowlineError::StageOrder {
                    task: pipeline.task_label(task),
                    dependency: pipeline.task_label(dep),
                    task_stage: pipeline.stages[task_stage].name().to_string(),
                    dependency_stage: pipeline.stages[dep_stage].name().to_string(),
                });
            }
        }
        Ok(())
    }

    /// Concurrency waves for one stage: repeatedly strip the members whose
    /// same-stage dependencies are all satisfied. Dependencies in earlier
    /// stages are already complete by the stage barrier.
    pub(crate) fn stage_waves(&self, pipeline: &Pipeline, stage_index: usize) -> Vec<Vec<TaskId>> {
        let members = pipeline.stages[stage_index].members();

        let mut unmet: HashMap<TaskId, usize> = members
            .iter()
            .map(|&id| {
                let same_stage = pipeline.tasks[id.index()]
                    .deps
                    .iter()
                    .filter(|dep| pipeline.tasks[dep.index()].stage == Some(stage_index))
                    .count();
                (id, same_stage)
            })
            .collect();

        let mut waves = Vec::new();
        let mut remaining: Vec<TaskId> = members.to_vec();
        while !remaining.is_empty() {
            let wave: Vec<TaskId> = remaining
                .iter()
                .copied()
                .filter(|id| unmet[id] == 0)
                .collect();
            debug_assert!(!wave.is_empty(), "acyclic stage always has a ready member");

            for &done in &wave {
                for next in self.graph.neighbors_directed(self.index_of[&done], Direction::Outgoing)
                {
                    let dependent = self.graph[next];
                    if let Some(count) = unmet.get_mut(&dependent) {
                        *count = count.saturating_sub(1);
                    }
                }
            }
            remaining.retain(|id| !wave.contains(id));
            waves.push(wave);
        }
        waves
    }

    /// Whether `task` depends on `dependency`, directly or transitively.
    pub(crate) fn depends_transitively(&self, task: TaskId, dependency: TaskId) -> bool {
        let (Some(&task_node), Some(&dep_node)) =
            (self.index_of.get(&task), self.index_of.get(&dependency))
        else {
            return false;
        };
        has_path_connecting(&self.graph, dep_node, task_node, None)
    }

    /// Dependency edges as (dependency, dependent) pairs, for rendering.
    pub(crate) fn edges(&self) -> impl Iterator<Item = (TaskId, TaskId)> + '_ {
        self.graph.edge_indices().map(|edge| {
            let (from, to) = self
                .graph
                .edge_endpoints(edge)
                .expect("edge index from the graph itself");
            (self.graph[from], self.graph[to])
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::{noop, pipeline_of};
    use crate::pipeline::Stage;

    #[test]
    fn linear_chain_orders_by_dependency() {
        let (pipeline, ids) = pipeline_of(&[("a", vec![]), ("b", vec![0]), ("c", vec![1])], &[vec![0, 1, 2]]);
        let dag = TaskGraph::build(&pipeline).unwrap();

        let order = dag.topological_order();
        assert_eq!(order, vec![ids[0], ids[1], ids[2]]);
    }

    #[test]
    fn ties_break_by_stage_insertion_order() {
        // b and c both depend on a only; insertion order is a, c, b.
        let (pipeline, ids) = pipeline_of(
            &[("a", vec![]), ("b", vec![0]), ("c", vec![0])],
            &[vec![0, 2, 1]],
        );
        let dag = TaskGraph::build(&pipeline).unwrap();

        let order = dag.topological_order();
        assert_eq!(order, vec![ids[0], ids[2], ids[1]]);
    }

    #[test]
    fn two_cycle_is_detected_and_names_both_tasks() {
        let (pipeline, _) = pipeline_of(&[("x", vec![1]), ("y", vec![0])], &[vec![0, 1]]);

        let err = TaskGraph::build(&pipeline).unwrap_err();
        match err {
            FlowlineError::Cycle { tasks } => {
                assert!(tasks.iter().any(|t| t.contains('x')));
                assert!(tasks.iter().any(|t| t.contains('y')));
            }
            other => panic!("expected Cycle, got {other:?}"),
        }
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let mut pipeline = Pipeline::new("selfloop");
        let a = pipeline.add_task(noop("a")).unwrap();
        // record the self-edge directly; depends_on would also accept it
        pipeline.tasks[a.index()].deps.push(a);
        let mut stage = Stage::new("only");
        stage.add([a]).unwrap();
        pipeline.add_stage(stage).unwrap();

        assert!(matches!(
            TaskGraph::build(&pipeline),
            Err(FlowlineError::Cycle { .. })
        ));
    }

    #[test]
    fn stage_order_violation_is_reported() {
        // b in stage 0 depends on a in stage 1
        let (pipeline, _) = pipeline_of(&[("a", vec![]), ("b", vec![0])], &[vec![1], vec![0]]);
        let dag = TaskGraph::build(&pipeline).unwrap();

        let err = dag.check_stage_order(&pipeline).unwrap_err();
        match err {
            FlowlineError::StageOrder {
                task, dependency, ..
            } => {
                assert!(task.contains('b'));
                assert!(dependency.contains('a'));
            }
            other => panic!("expected StageOrder, got {other:?}"),
        }
    }

    #[test]
    fn same_stage_dependency_is_legal_and_produces_two_waves() {
        let (pipeline, ids) = pipeline_of(&[("a", vec![]), ("b", vec![0])], &[vec![0, 1]]);
        let dag = TaskGraph::build(&pipeline).unwrap();
        dag.check_stage_order(&pipeline).unwrap();

        let waves = dag.stage_waves(&pipeline, 0);
        assert_eq!(waves, vec![vec![ids[0]], vec![ids[1]]]);
    }

    #[test]
    fn diamond_collapses_into_three_waves() {
        let (pipeline, ids) = pipeline_of(
            &[
                ("a", vec![]),
                ("b", vec![0]),
                ("c", vec![0]),
                ("d", vec![1, 2]),
            ],
            &[vec![0, 1, 2, 3]],
        );
        let dag = TaskGraph::build(&pipeline).unwrap();

        let waves = dag.stage_waves(&pipeline, 0);
        assert_eq!(
            waves,
            vec![vec![ids[0]], vec![ids[1], ids[2]], vec![ids[3]]]
        );
    }

    #[test]
    fn transitive_dependency_query() {
        let (pipeline, ids) = pipeline_of(
            &[("a", vec![]), ("b", vec![0]), ("c", vec![1])],
            &[vec![0, 1, 2]],
        );
        let dag = TaskGraph::build(&pipeline).unwrap();

        assert!(dag.depends_transitively(ids[2], ids[0]));
        assert!(dag.depends_transitively(ids[2], ids[1]));
        assert!(!dag.depends_transitively(ids[0], ids[2]));
    }
}
