// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 flowline contributors

//! Pipeline model
//!
//! Stages, the dependency DAG built from recorded edges, the compile-time
//! validators, the concurrent executor, and the plot renderings.

mod dag;
mod definition;
mod executor;
mod plot;

pub use definition::{Pipeline, PipelineState, Stage};
pub use plot::PlotMode;

#[cfg(test)]
pub(crate) mod test_support {
    use async_trait::async_trait;

    use crate::errors::TaskError;
    use crate::pipeline::{Pipeline, Stage};
    use crate::task::{FlowData, Task, TaskContext, TaskId};

    /// Install the env-filtered fmt subscriber for a test. Later calls are
    /// no-ops; output goes through the capture-aware test writer.
    pub(crate) fn trace_init() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .with_test_writer()
            .try_init();
    }

    pub(crate) struct Noop {
        name: String,
    }

    #[async_trait]
    impl Task for Noop {
        fn name(&self) -> &str {
            &self.name
        }

        async fn run(&self, _ctx: TaskContext) -> Result<FlowData, TaskError> {
            Ok(FlowData::Null)
        }
    }

    pub(crate) fn noop(name: &str) -> Noop {
        Noop {
            name: name.to_string(),
        }
    }

    /// Build a pipeline from `(name, dependency indices)` task definitions
    /// and stage membership lists (also by definition index). Dependencies
    /// are recorded but not validated, so cyclic and mis-staged fixtures are
    /// expressible.
    pub(crate) fn pipeline_of(
        definitions: &[(&str, Vec<usize>)],
        stages: &[Vec<usize>],
    ) -> (Pipeline, Vec<TaskId>) {
        let mut pipeline = Pipeline::new("test");
        let ids: Vec<TaskId> = definitions
            .iter()
            .map(|(name, _)| pipeline.add_task(noop(name)).unwrap())
            .collect();

        for (index, (_, deps)) in definitions.iter().enumerate() {
            let deps: Vec<TaskId> = deps.iter().map(|&d| ids[d]).collect();
            pipeline.depends_on(ids[index], &deps).unwrap();
        }

        for (number, members) in stages.iter().enumerate() {
            let mut stage = Stage::new(format!("stage{number}"));
            stage.add(members.iter().map(|&m| ids[m])).unwrap();
            pipeline.add_stage(stage).unwrap();
        }

        (pipeline, ids)
    }
}
