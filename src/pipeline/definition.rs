// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 flowline contributors

//! Pipeline and stage definition structures
//!
//! A [`Pipeline`] owns the task arena and an ordered list of [`Stage`]s.
//! Structure is mutable only while the pipeline is `Uncompiled`;
//! [`Pipeline::compile`] freezes it, validates the dependency graph, and
//! caches the execution plan the runner and the plots consume.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::errors::{FlowlineError, FlowlineResult};
use crate::pipeline::dag::TaskGraph;
use crate::task::{Args, FlowData, Task, TaskId};

/// Lifecycle of a pipeline.
///
/// `Uncompiled → Compiled → Running → Completed`, with `Failed` reachable
/// from `Running`. A `Completed` pipeline may be run again; a `Failed` one
/// may not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Uncompiled,
    Compiled,
    Running,
    Completed,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Uncompiled => "uncompiled",
            Self::Compiled => "compiled",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One registered task with its engine-side bookkeeping: recorded dependency
/// edges, the bound argument bundle, the write-once output slot, and the
/// owning stage once assigned.
pub(crate) struct TaskNode {
    pub(crate) task: Arc<dyn Task>,
    pub(crate) deps: Vec<TaskId>,
    pub(crate) args: Args,
    pub(crate) output: Option<Arc<FlowData>>,
    pub(crate) stage: Option<usize>,
}

/// Compile artifacts: the validated graph, the deterministic topological
/// order, and the concurrency waves of each stage.
pub(crate) struct ExecutionPlan {
    pub(crate) graph: TaskGraph,
    pub(crate) order: Vec<TaskId>,
    pub(crate) stage_waves: Vec<Vec<Vec<TaskId>>>,
}

/// A named, ordered group of tasks executed as one batch.
///
/// Membership order is preserved; it is the tie-breaker for scheduling
/// decisions. Stages impose a hard barrier: a stage fully drains before the
/// next one starts.
#[derive(Debug, Clone)]
pub struct Stage {
    name: String,
    members: Vec<TaskId>,
}

impl Stage {
    /// Create an empty stage.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: Vec::new(),
        }
    }

    /// Append tasks, preserving insertion order.
    ///
    /// Fails with [`FlowlineError::DuplicateTask`] when a task is already a
    /// member of this stage; membership overlap with *other* stages is
    /// rejected by [`Pipeline::add_stage`].
    pub fn add(&mut self, tasks: impl IntoIterator<Item = TaskId>) -> FlowlineResult<()> {
        for id in tasks {
            if self.members.contains(&id) {
                return Err(FlowlineError::DuplicateTask {
                    task: id,
                    first_stage: self.name.clone(),
                    second_stage: self.name.clone(),
                });
            }
            self.members.push(id);
        }
        Ok(())
    }

    /// Stage name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Member tasks in insertion order.
    pub fn members(&self) -> &[TaskId] {
        &self.members
    }

    /// Number of member tasks.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// True when the stage has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// The top-level pipeline: task arena, ordered stages, and the state machine
/// driving `compile()` and `run()`.
pub struct Pipeline {
    name: String,
    pub(crate) tasks: Vec<TaskNode>,
    pub(crate) stages: Vec<Stage>,
    pub(crate) state: PipelineState,
    pub(crate) plan: Option<ExecutionPlan>,
    /// Completion order of the most recent run, for the execution plot.
    pub(crate) realized: Vec<TaskId>,
}

impl Pipeline {
    /// Create an empty, uncompiled pipeline.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tasks: Vec::new(),
            stages: Vec::new(),
            state: PipelineState::Uncompiled,
            plan: None,
            realized: Vec::new(),
        }
    }

    /// Pipeline name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Register a work unit and issue its id.
    ///
    /// Only legal before `compile()`.
    pub fn add_task(&mut self, task: impl Task + 'static) -> FlowlineResult<TaskId> {
        self.ensure_uncompiled("add_task")?;
        let id = TaskId(self.tasks.len());
        debug!(task = task.name(), %id, "task registered");
        self.tasks.push(TaskNode {
            task: Arc::new(task),
            deps: Vec::new(),
            args: Args::new(),
            output: None,
            stage: None,
        });
        Ok(id)
    }

    /// Record dependency edges: `task` will not start until every entry in
    /// `dependencies` has completed, and it will see their flow data.
    ///
    /// This call only records edges; cycle detection is deferred to
    /// `compile()`. Repeated edges are ignored.
    pub fn depends_on(&mut self, task: TaskId, dependencies: &[TaskId]) -> FlowlineResult<()> {
        self.ensure_uncompiled("depends_on")?;
        self.ensure_known(task)?;
        for &dep in dependencies {
            self.ensure_known(dep)?;
        }
        let node = &mut self.tasks[task.index()];
        for &dep in dependencies {
            if !node.deps.contains(&dep) {
                node.deps.push(dep);
            }
        }
        Ok(())
    }

    /// Bind a deferred argument bundle for `task`'s work function.
    ///
    /// The bundle is checked against the task's [`crate::task::Signature`]
    /// at `compile()` time. Binding again replaces the previous bundle.
    pub fn bind_args(&mut self, task: TaskId, args: Args) -> FlowlineResult<()> {
        self.ensure_uncompiled("bind_args")?;
        self.ensure_known(task)?;
        self.tasks[task.index()].args = args;
        Ok(())
    }

    /// Append a stage in execution order.
    ///
    /// Fails with [`FlowlineError::DuplicateTask`] when a member already
    /// belongs to a previously added stage.
    pub fn add_stage(&mut self, stage: Stage) -> FlowlineResult<()> {
        self.ensure_uncompiled("add_stage")?;
        for &id in stage.members() {
            self.ensure_known(id)?;
        }
        for &id in stage.members() {
            if let Some(existing) = self.tasks[id.index()].stage {
                return Err(FlowlineError::DuplicateTask {
                    task: id,
                    first_stage: self.stages[existing].name().to_string(),
                    second_stage: stage.name().to_string(),
                });
            }
        }

        let stage_index = self.stages.len();
        for &id in stage.members() {
            self.tasks[id.index()].stage = Some(stage_index);
        }
        debug!(stage = stage.name(), members = stage.len(), "stage added");
        self.stages.push(stage);
        Ok(())
    }

    /// Freeze structure and validate the whole graph.
    ///
    /// Checks, in order: bound arguments against declared signatures, that
    /// every dependency of a scheduled task is itself scheduled, that the
    /// dependency graph is acyclic, and that no dependency lives in a later
    /// stage than its dependent. On success the execution plan is cached and
    /// the pipeline transitions to `Compiled`; on failure it stays
    /// `Uncompiled`. Calling `compile()` again on a compiled pipeline is a
    /// no-op.
    pub fn compile(&mut self) -> FlowlineResult<()> {
        match self.state {
            PipelineState::Uncompiled => {}
            PipelineState::Compiled => return Ok(()),
            other => return Err(FlowlineError::invalid_state("compile()", other)),
        }

        for node in &self.tasks {
            if let Err(reason) = node.task.signature().check(&node.args) {
                return Err(FlowlineError::ArgumentMismatch {
                    task: node.task.name().to_string(),
                    reason,
                });
            }
        }

        for node in &self.tasks {
            if node.stage.is_none() {
                continue;
            }
            for &dep in &node.deps {
                if self.tasks[dep.index()].stage.is_none() {
                    return Err(FlowlineError::UnscheduledTask {
                        task: self.task_label(dep),
                        dependent: node.task.name().to_string(),
                    });
                }
            }
        }

        let graph = TaskGraph::build(self)?;
        graph.check_stage_order(self)?;

        let order = graph.topological_order();
        let stage_waves = (0..self.stages.len())
            .map(|index| graph.stage_waves(self, index))
            .collect();

        self.plan = Some(ExecutionPlan {
            graph,
            order,
            stage_waves,
        });
        self.state = PipelineState::Compiled;
        info!(
            pipeline = %self.name,
            tasks = self.stages.iter().map(Stage::len).sum::<usize>(),
            stages = self.stages.len(),
            "pipeline compiled"
        );
        Ok(())
    }

    /// Flow data produced by `task` in the most recent run, if any.
    pub fn output_of(&self, task: TaskId) -> Option<&FlowData> {
        self.tasks.get(task.index()).and_then(|node| node.output.as_deref())
    }

    /// Planned topological execution order, available once compiled.
    ///
    /// Ties are broken by the order tasks were added to their stages.
    pub fn execution_order(&self) -> Option<&[TaskId]> {
        self.plan.as_ref().map(|plan| plan.order.as_slice())
    }

    /// Completion order of the most recent run (empty before the first run).
    pub fn completion_order(&self) -> &[TaskId] {
        &self.realized
    }

    /// Whether `task` depends on `dependency`, directly or transitively.
    ///
    /// Answers from the compiled graph; always `false` before `compile()`.
    pub fn depends_transitively(&self, task: TaskId, dependency: TaskId) -> bool {
        self.plan
            .as_ref()
            .is_some_and(|plan| plan.graph.depends_transitively(task, dependency))
    }

    /// Look up a stage by name.
    pub fn get_stage(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|stage| stage.name == name)
    }

    /// All stage names in execution order.
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|stage| stage.name.as_str()).collect()
    }

    /// Name of a registered task.
    pub fn task_name(&self, task: TaskId) -> Option<&str> {
        self.tasks.get(task.index()).map(|node| node.task.name())
    }

    pub(crate) fn task_label(&self, task: TaskId) -> String {
        self.tasks[task.index()].task.name().to_string()
    }

    fn ensure_uncompiled(&self, operation: &str) -> FlowlineResult<()> {
        if self.state == PipelineState::Uncompiled {
            Ok(())
        } else {
            Err(FlowlineError::invalid_state(operation, self.state))
        }
    }

    fn ensure_known(&self, id: TaskId) -> FlowlineResult<()> {
        if id.index() < self.tasks.len() {
            Ok(())
        } else {
            Err(FlowlineError::UnknownTask { id })
        }
    }
}
