//! Flowline Runtime
//!
//! Evaluates a workflow's transform nodes in dependency order. A
//! [`Runtime`] owns a workflow definition and its configuration; each call
//! to [`Runtime::invoke`] validates the graph, records the caller's
//! [`Seeds`] for non-transform nodes, and runs every transform whose
//! upstreams have settled, independent nodes concurrently.
//!
//! Progress can be observed through an [`ExecutionNotifier`].

mod config;
mod events;
mod result;
mod run;
mod runtime;
mod seeds;

pub use config::RuntimeConfig;
pub use events::{ChannelNotifier, ExecutionEvent, ExecutionNotifier, NoopNotifier};
pub use flowline_transform::{EvalError, NodeOutcome};
pub use result::{RunResult, RunStatus};
pub use runtime::Runtime;
pub use seeds::Seeds;
