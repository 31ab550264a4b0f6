// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 flowline contributors

//! Error types for pipeline construction, validation, and execution
//!
//! Structural errors (cycles, stage ordering, duplicates, argument
//! mismatches) are surfaced synchronously by the mutating call or by
//! `Pipeline::compile()`, before any task executes. `TaskFailed` is the only
//! variant `Pipeline::run()` can produce.

use miette::Diagnostic;
use thiserror::Error;

use crate::task::TaskId;

/// Result type for flowline operations
pub type FlowlineResult<T> = Result<T, FlowlineError>;

/// Error type a task's work function may return; the engine wraps it in
/// [`FlowlineError::TaskFailed`] together with the task's name.
pub type TaskError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for flowline
#[derive(Error, Debug, Diagnostic)]
pub enum FlowlineError {
    // ─────────────────────────────────────────────────────────────────────────
    // Graph Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("circular dependency detected: {}", .tasks.join(" -> "))]
    #[diagnostic(
        code(flowline::cycle),
        help("Review task dependencies to remove the cycle")
    )]
    Cycle { tasks: Vec<String> },

    #[error(
        "task '{task}' in stage '{task_stage}' depends on '{dependency}', \
         which is scheduled in the later stage '{dependency_stage}'"
    )]
    #[diagnostic(
        code(flowline::stage_order),
        help("Move '{dependency}' into the same stage as '{task}' or an earlier one")
    )]
    StageOrder {
        task: String,
        dependency: String,
        task_stage: String,
        dependency_stage: String,
    },

    #[error("task '{dependent}' depends on '{task}', which is not scheduled in any stage")]
    #[diagnostic(
        code(flowline::unscheduled_task),
        help("Add '{task}' to a stage before compiling")
    )]
    UnscheduledTask { task: String, dependent: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Structure Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("cannot add task {task} to stage '{second_stage}': already a member of stage '{first_stage}'")]
    #[diagnostic(
        code(flowline::duplicate_task),
        help("A task may belong to exactly one stage")
    )]
    DuplicateTask {
        task: TaskId,
        first_stage: String,
        second_stage: String,
    },

    #[error("{operation} is not allowed while the pipeline is {state}")]
    #[diagnostic(
        code(flowline::invalid_state),
        help("Structure may only change before compile(); run() requires a compiled pipeline")
    )]
    InvalidState { operation: String, state: String },

    #[error("unknown task {id}")]
    #[diagnostic(
        code(flowline::unknown_task),
        help("Task ids are issued by Pipeline::add_task; use the handle it returned")
    )]
    UnknownTask { id: TaskId },

    // ─────────────────────────────────────────────────────────────────────────
    // Argument Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("arguments bound to task '{task}' do not match its signature: {reason}")]
    #[diagnostic(
        code(flowline::argument_mismatch),
        help("Compare Pipeline::bind_args with the task's Signature declaration")
    )]
    ArgumentMismatch { task: String, reason: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Execution Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("task '{task}' failed")]
    #[diagnostic(code(flowline::task_failed))]
    TaskFailed {
        task: String,
        #[source]
        source: TaskError,
    },
}

impl FlowlineError {
    /// Wrap a work function's own error with the identity of the failing task.
    pub(crate) fn task_failed(task: impl Into<String>, source: TaskError) -> Self {
        Self::TaskFailed {
            task: task.into(),
            source,
        }
    }

    /// Structural mutation or run attempted in the wrong pipeline state.
    pub(crate) fn invalid_state(operation: &str, state: impl std::fmt::Display) -> Self {
        Self::InvalidState {
            operation: operation.to_string(),
            state: state.to_string(),
        }
    }
}
