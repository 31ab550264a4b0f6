// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 flowline contributors

//! Plot renderings
//!
//! Textual visualizations of a compiled pipeline: the static dependency
//! graph as Graphviz DOT, and the execution schedule as per-stage waves.
//! Purely informational; rendering never changes pipeline state.

use std::collections::HashMap;
use std::fmt::Write as _;

use crate::errors::{FlowlineError, FlowlineResult};
use crate::pipeline::definition::{ExecutionPlan, Pipeline};
use crate::task::TaskId;

/// What [`Pipeline::plot`] renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlotMode {
    /// The static task dependency graph, as Graphviz DOT with one cluster
    /// per stage.
    Task,
    /// The schedule: concurrency waves inside each stage, annotated with
    /// the realized completion order once the pipeline has run.
    Execution,
}

impl Pipeline {
    /// Render a visualization of the compiled pipeline.
    ///
    /// Fails with [`FlowlineError::InvalidState`] before `compile()`.
    pub fn plot(&self, mode: PlotMode) -> FlowlineResult<String> {
        let plan = self
            .plan
            .as_ref()
            .ok_or_else(|| FlowlineError::invalid_state("plot()", self.state))?;

        Ok(match mode {
            PlotMode::Task => self.render_task_graph(plan),
            PlotMode::Execution => self.render_schedule(plan),
        })
    }

    fn render_task_graph(&self, plan: &ExecutionPlan) -> String {
        let mut out = String::from("digraph pipeline {\n");
        out.push_str("    rankdir=TB;\n");
        out.push_str("    node [shape=box, style=rounded];\n\n");

        for (index, stage) in self.stages.iter().enumerate() {
            let _ = writeln!(out, "    subgraph cluster_{index} {{");
            let _ = writeln!(out, "        label=\"{}\";", stage.name());
            for &id in stage.members() {
                let _ = writeln!(out, "        \"{}\";", self.task_label(id));
            }
            out.push_str("    }\n");
        }

        out.push('\n');
        for (dep, task) in plan.graph.edges() {
            let _ = writeln!(
                out,
                "    \"{}\" -> \"{}\";",
                self.task_label(dep),
                self.task_label(task)
            );
        }

        out.push_str("}\n");
        out
    }

    fn render_schedule(&self, plan: &ExecutionPlan) -> String {
        let finished_at: HashMap<TaskId, usize> = self
            .realized
            .iter()
            .enumerate()
            .map(|(position, &id)| (id, position + 1))
            .collect();

        let mut out = format!("execution schedule for '{}'\n", self.name());
        for (index, stage) in self.stages.iter().enumerate() {
            let _ = writeln!(
                out,
                "stage {}/{} '{}'",
                index + 1,
                self.stages.len(),
                stage.name()
            );
            for (wave_index, wave) in plan.stage_waves[index].iter().enumerate() {
                let entries: Vec<String> = wave
                    .iter()
                    .map(|&id| match finished_at.get(&id) {
                        Some(position) => {
                            format!("{} [finished #{position}]", self.task_label(id))
                        }
                        None => self.task_label(id),
                    })
                    .collect();
                let _ = writeln!(out, "  wave {}: {}", wave_index + 1, entries.join(", "));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::pipeline_of;

    #[test]
    fn plot_requires_a_compiled_pipeline() {
        let (pipeline, _) = pipeline_of(&[("a", vec![])], &[vec![0]]);
        assert!(matches!(
            pipeline.plot(PlotMode::Task),
            Err(FlowlineError::InvalidState { .. })
        ));
    }

    #[test]
    fn task_plot_renders_stages_and_edges() {
        let (mut pipeline, _) = pipeline_of(
            &[("a", vec![]), ("b", vec![0]), ("c", vec![0, 1])],
            &[vec![0], vec![1, 2]],
        );
        pipeline.compile().unwrap();

        let dot = pipeline.plot(PlotMode::Task).unwrap();
        assert!(dot.starts_with("digraph pipeline {"));
        assert!(dot.contains("label=\"stage0\";"));
        assert!(dot.contains("label=\"stage1\";"));
        assert!(dot.contains("\"a\" -> \"b\";"));
        assert!(dot.contains("\"a\" -> \"c\";"));
        assert!(dot.contains("\"b\" -> \"c\";"));
    }

    #[test]
    fn execution_plot_shows_waves_per_stage() {
        // b depends on a within the same stage: two waves.
        let (mut pipeline, _) = pipeline_of(&[("a", vec![]), ("b", vec![0])], &[vec![0, 1]]);
        pipeline.compile().unwrap();

        let schedule = pipeline.plot(PlotMode::Execution).unwrap();
        assert!(schedule.contains("stage 1/1 'stage0'"));
        assert!(schedule.contains("wave 1: a"));
        assert!(schedule.contains("wave 2: b"));
        // no run yet, so no realized annotations
        assert!(!schedule.contains("finished"));
    }

    #[tokio::test]
    async fn execution_plot_annotates_realized_order() {
        let (mut pipeline, _) = pipeline_of(&[("a", vec![]), ("b", vec![0])], &[vec![0], vec![1]]);
        pipeline.compile().unwrap();
        pipeline.run().await.unwrap();

        let schedule = pipeline.plot(PlotMode::Execution).unwrap();
        assert!(schedule.contains("a [finished #1]"));
        assert!(schedule.contains("b [finished #2]"));
    }
}
