//! Workflow engine: a directed dataflow graph of typed executors.
//!
//! A workflow is built once from `Executor`s connected by `Edge`s, with one
//! start executor and a set of output-designated executors. Each run routes
//! typed messages along edges whose predicates hold, runs independent
//! executors concurrently, and reports progress as a stream of
//! `WorkflowEvent`s that closes when the run drains or is cancelled.

pub mod builder;
pub mod context;
pub mod edge;
pub mod event;
pub mod executor;
pub mod input;
pub mod payload;
pub mod run;

pub use builder::{Workflow, WorkflowBuilder};
pub use context::ExecutionContext;
pub use edge::Edge;
pub use event::{EventStream, WorkflowEvent};
pub use executor::{from_fn, Executor, FnExecutor};
pub use input::InputStream;
pub use payload::{MessageType, Payload};
pub use run::{InvocationRecord, RunOptions, RunSummary, WorkflowRun};

pub use ferry_core::config::FailurePolicy;
