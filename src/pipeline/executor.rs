// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 flowline contributors

//! Pipeline executor
//!
//! Drives a compiled pipeline: stages run in order with a hard barrier
//! between them, and inside a stage every task whose dependencies have
//! completed runs concurrently on the tokio runtime. On the first task
//! failure the executor stops admitting new tasks and lets in-flight ones
//! finish before reporting.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::errors::{FlowlineError, FlowlineResult, TaskError};
use crate::pipeline::definition::{Pipeline, PipelineState};
use crate::task::{DepOutput, FlowData, TaskContext, TaskId};

/// What a run produced, including partial results when a task failed.
struct RunOutcome {
    outputs: HashMap<TaskId, Arc<FlowData>>,
    completion_order: Vec<TaskId>,
    failure: Option<FlowlineError>,
}

impl Pipeline {
    /// Execute every scheduled task exactly once.
    ///
    /// Legal from `Compiled`, and from `Completed` for a re-run (previous
    /// outputs are cleared; whether re-running is safe is the tasks'
    /// concern, the engine does not enforce idempotence). A task never
    /// starts before all of its dependencies have completed. The first task
    /// failure halts admission, drains in-flight tasks, moves the pipeline
    /// to `Failed`, and surfaces [`FlowlineError::TaskFailed`] naming the
    /// task.
    pub async fn run(&mut self) -> FlowlineResult<()> {
        match self.state {
            PipelineState::Compiled => {}
            PipelineState::Completed => {
                for node in &mut self.tasks {
                    node.output = None;
                }
                self.realized.clear();
            }
            other => return Err(FlowlineError::invalid_state("run()", other)),
        }

        self.state = PipelineState::Running;
        let started = Instant::now();
        info!(pipeline = %self.name(), stages = self.stages.len(), "pipeline run started");

        let outcome = self.execute_stages().await;

        for (id, data) in outcome.outputs {
            self.tasks[id.index()].output = Some(data);
        }
        self.realized = outcome.completion_order;

        match outcome.failure {
            None => {
                self.state = PipelineState::Completed;
                info!(
                    pipeline = %self.name(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "pipeline completed"
                );
                Ok(())
            }
            Some(err) => {
                self.state = PipelineState::Failed;
                warn!(
                    pipeline = %self.name(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "pipeline failed"
                );
                Err(err)
            }
        }
    }

    async fn execute_stages(&self) -> RunOutcome {
        let mut outputs = HashMap::new();
        let mut completion_order = Vec::new();

        for (index, stage) in self.stages.iter().enumerate() {
            debug!(stage = stage.name(), members = stage.len(), "stage started");
            let failure = self
                .run_stage(index, &mut outputs, &mut completion_order)
                .await;
            debug!(stage = stage.name(), "stage drained");

            if failure.is_some() {
                return RunOutcome {
                    outputs,
                    completion_order,
                    failure,
                };
            }
        }

        RunOutcome {
            outputs,
            completion_order,
            failure: None,
        }
    }

    /// Run one stage to completion. Returns the first failure, after every
    /// already-started member has finished.
    async fn run_stage(
        &self,
        stage_index: usize,
        outputs: &mut HashMap<TaskId, Arc<FlowData>>,
        completion_order: &mut Vec<TaskId>,
    ) -> Option<FlowlineError> {
        let stage = &self.stages[stage_index];

        // Same-stage dependency bookkeeping; earlier-stage dependencies are
        // already satisfied by the barrier.
        let mut unmet: HashMap<TaskId, usize> = HashMap::new();
        let mut dependents: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
        for &id in stage.members() {
            let same_stage: Vec<TaskId> = self.tasks[id.index()]
                .deps
                .iter()
                .copied()
                .filter(|dep| self.tasks[dep.index()].stage == Some(stage_index))
                .collect();
            unmet.insert(id, same_stage.len());
            for dep in same_stage {
                dependents.entry(dep).or_default().push(id);
            }
        }

        let mut ready: VecDeque<TaskId> = stage
            .members()
            .iter()
            .copied()
            .filter(|id| unmet[id] == 0)
            .collect();

        let mut in_flight: JoinSet<(TaskId, Result<FlowData, TaskError>)> = JoinSet::new();
        let mut running: HashMap<tokio::task::Id, TaskId> = HashMap::new();
        let mut failure: Option<FlowlineError> = None;

        loop {
            if failure.is_none() {
                while let Some(id) = ready.pop_front() {
                    let node = &self.tasks[id.index()];
                    let inputs: Vec<DepOutput> = node
                        .deps
                        .iter()
                        .map(|&dep| DepOutput {
                            id: dep,
                            producer: self.task_label(dep),
                            data: Arc::clone(&outputs[&dep]),
                        })
                        .collect();
                    let ctx = TaskContext::new(node.args.clone(), inputs);
                    let task = Arc::clone(&node.task);

                    debug!(task = task.name(), %id, "task started");
                    let handle = in_flight.spawn(async move { (id, task.run(ctx).await) });
                    running.insert(handle.id(), id);
                }
            }

            let Some(joined) = in_flight.join_next_with_id().await else {
                break;
            };

            match joined {
                Ok((join_id, (id, Ok(data)))) => {
                    running.remove(&join_id);
                    debug!(task = %self.task_label(id), %id, "task completed");
                    outputs.insert(id, Arc::new(data));
                    completion_order.push(id);

                    if failure.is_none() {
                        for &dependent in dependents.get(&id).map(Vec::as_slice).unwrap_or(&[]) {
                            let count = unmet
                                .get_mut(&dependent)
                                .expect("stage member has an unmet entry");
                            *count -= 1;
                            if *count == 0 {
                                ready.push_back(dependent);
                            }
                        }
                    }
                }
                Ok((join_id, (id, Err(source)))) => {
                    running.remove(&join_id);
                    let name = self.task_label(id);
                    warn!(task = %name, %id, "task failed; draining in-flight tasks");
                    if failure.is_none() {
                        failure = Some(FlowlineError::task_failed(name, source));
                    }
                    ready.clear();
                }
                Err(join_error) => {
                    // A panic inside a work function surfaces as a JoinError.
                    let name = running
                        .remove(&join_error.id())
                        .map(|id| self.task_label(id))
                        .unwrap_or_else(|| "<unknown>".to_string());
                    warn!(task = %name, "task panicked; draining in-flight tasks");
                    if failure.is_none() {
                        failure = Some(FlowlineError::task_failed(name, Box::new(join_error)));
                    }
                    ready.clear();
                }
            }
        }

        debug_assert!(running.is_empty(), "every joined task was unregistered");
        failure
    }
}
