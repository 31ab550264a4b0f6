// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 flowline contributors

//! Task model
//!
//! A task is a polymorphic unit of work: anything implementing [`Task`] can
//! be registered with a pipeline, wired to upstream dependencies, and given a
//! deferred argument bundle. Its `run` produces one flow-data value that
//! every declared dependent can read.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::TaskError;

/// The output value a task produces ("flow data"), visible to its dependents.
///
/// `Value::Null` is the legal "task set no output" case, not an error.
pub type FlowData = Value;

/// Engine-issued task identifier.
///
/// Issued by `Pipeline::add_task`; all graph bookkeeping, duplicate
/// detection, and error reporting key off this id rather than reference
/// identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub(crate) usize);

impl TaskId {
    pub(crate) fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Declared arity of a task's work function.
///
/// Checked at `Pipeline::compile()` against the [`Args`] bundle bound via
/// `Pipeline::bind_args`. The default signature accepts no arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Signature {
    positional: usize,
    keywords: Vec<String>,
}

impl Signature {
    /// A signature taking no arguments.
    pub fn new() -> Self {
        Self::default()
    }

    /// A signature taking exactly `count` positional arguments.
    pub fn positional(count: usize) -> Self {
        Self {
            positional: count,
            keywords: Vec::new(),
        }
    }

    /// Accept an optional keyword argument with the given name.
    pub fn keyword(mut self, name: impl Into<String>) -> Self {
        self.keywords.push(name.into());
        self
    }

    /// Check a bound argument bundle against this signature.
    pub(crate) fn check(&self, args: &Args) -> Result<(), String> {
        if args.positional.len() != self.positional {
            return Err(format!(
                "expected {} positional argument(s), {} bound",
                self.positional,
                args.positional.len()
            ));
        }
        for name in args.keyword.keys() {
            if !self.keywords.iter().any(|k| k == name) {
                return Err(format!("unexpected keyword argument '{name}'"));
            }
        }
        Ok(())
    }
}

/// Immutable deferred-argument bundle.
///
/// Captured at `Pipeline::bind_args` time and handed to the work function by
/// the engine when the task runs. Explicit capture (rather than closures)
/// keeps argument state out of concurrently executing futures.
#[derive(Debug, Clone, Default)]
pub struct Args {
    positional: Vec<Value>,
    keyword: BTreeMap<String, Value>,
}

impl Args {
    /// An empty bundle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional argument.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Set a keyword argument.
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.keyword.insert(name.into(), value.into());
        self
    }

    /// Positional argument by index.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.positional.get(index)
    }

    /// Keyword argument by name.
    pub fn get_kwarg(&self, name: &str) -> Option<&Value> {
        self.keyword.get(name)
    }

    /// Number of positional arguments.
    pub fn len(&self) -> usize {
        self.positional.len()
    }

    /// True when neither positional nor keyword arguments are bound.
    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keyword.is_empty()
    }
}

/// One dependency's output, as seen by a running dependent.
#[derive(Debug, Clone)]
pub struct DepOutput {
    pub(crate) id: TaskId,
    pub(crate) producer: String,
    pub(crate) data: Arc<FlowData>,
}

impl DepOutput {
    /// Id of the task that produced this value.
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Name of the task that produced this value.
    pub fn producer(&self) -> &str {
        &self.producer
    }

    /// The flow data itself.
    pub fn data(&self) -> &FlowData {
        &self.data
    }
}

/// Read-only context handed to [`Task::run`].
///
/// Carries the bound argument bundle and each dependency's flow data, in
/// dependency-declaration order. Owned (not borrowed) so the engine can move
/// it into a spawned future.
#[derive(Debug, Clone)]
pub struct TaskContext {
    args: Args,
    inputs: Vec<DepOutput>,
}

impl TaskContext {
    pub(crate) fn new(args: Args, inputs: Vec<DepOutput>) -> Self {
        Self { args, inputs }
    }

    /// The argument bundle bound via `Pipeline::bind_args` (empty if none).
    pub fn args(&self) -> &Args {
        &self.args
    }

    /// All dependency outputs, in declaration order.
    pub fn inputs(&self) -> &[DepOutput] {
        &self.inputs
    }

    /// Flow data of the `index`-th declared dependency.
    pub fn input(&self, index: usize) -> Option<&FlowData> {
        self.inputs.get(index).map(DepOutput::data)
    }

    /// Flow data of the dependency with the given task name.
    pub fn input_from(&self, producer: &str) -> Option<&FlowData> {
        self.inputs
            .iter()
            .find(|dep| dep.producer == producer)
            .map(DepOutput::data)
    }
}

/// A polymorphic unit of work.
///
/// Implementors supply the work function; the engine guarantees it is
/// invoked at most once per pipeline execution, only after every declared
/// dependency has completed.
#[async_trait]
pub trait Task: Send + Sync {
    /// Human-readable name, used in plots and error reporting.
    fn name(&self) -> &str;

    /// Declared arity of the work function. Defaults to "no arguments".
    fn signature(&self) -> Signature {
        Signature::default()
    }

    /// The work function. Returns this task's flow data; return
    /// `FlowData::Null` to signal "no output", which is legal.
    async fn run(&self, ctx: TaskContext) -> Result<FlowData, TaskError>;
}
