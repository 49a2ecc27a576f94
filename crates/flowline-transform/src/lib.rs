//! Flowline Transform
//!
//! Evaluation of a single transform node against the outputs of its
//! upstream nodes:
//!
//! - `extract` resolves a path against the one upstream output
//! - `template` renders `{{ ... }}` placeholders against it
//! - `code` runs a sandboxed script with it bound as `input`
//! - `combine` assembles an object from named fields of several upstreams
//!
//! Every failure is recorded as an [`EvalError`] scoped to the node; misses
//! degrade to null or the empty string.

mod combine;
mod error;
mod evaluator;
mod template;

pub use combine::combine;
pub use error::{EvalError, NodeOutcome};
pub use evaluator::{TransformEvaluator, TransformInput, TransformOptions};
pub use template::{TemplateError, TemplateRenderer};
