// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 flowline contributors

//! # flowline - Staged Task Pipeline Engine
//!
//! `flowline` executes dependency-driven task graphs in ordered stages.
//!
//! ## Features
//!
//! - **Polymorphic work units** - any [`Task`] implementation can join a pipeline
//! - **Explicit dependency graph** - edges recorded up front, validated at `compile()`
//! - **Staged, concurrent execution** - stages are hard barriers; inside a
//!   stage, tasks run concurrently as their dependencies complete
//! - **Deferred arguments** - bind a work function's arguments before the run
//! - **Fail-fast with cooperative drain** - a task failure stops admission but
//!   lets in-flight tasks finish
//!
//! ## Quick start
//!
//! ```no_run
//! use async_trait::async_trait;
//! use flowline::{FlowData, Pipeline, Stage, Task, TaskContext, TaskError};
//!
//! struct Hello;
//!
//! #[async_trait]
//! impl Task for Hello {
//!     fn name(&self) -> &str {
//!         "hello"
//!     }
//!
//!     async fn run(&self, _ctx: TaskContext) -> Result<FlowData, TaskError> {
//!         Ok(FlowData::String("hi".into()))
//!     }
//! }
//!
//! # async fn demo() -> Result<(), flowline::FlowlineError> {
//! let mut pipeline = Pipeline::new("demo");
//! let hello = pipeline.add_task(Hello)?;
//!
//! let mut stage = Stage::new("greet");
//! stage.add([hello])?;
//! pipeline.add_stage(stage)?;
//!
//! pipeline.compile()?;
//! pipeline.run().await?;
//! assert!(pipeline.output_of(hello).is_some());
//! # Ok(())
//! # }
//! ```

pub mod errors;
pub mod pipeline;
pub mod task;

// Re-export commonly used types
pub use errors::{FlowlineError, FlowlineResult, TaskError};
pub use pipeline::{Pipeline, PipelineState, PlotMode, Stage};
pub use task::{Args, DepOutput, FlowData, Signature, Task, TaskContext, TaskId};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
