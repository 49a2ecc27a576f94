//! Flowline Config
//!
//! This crate contains the serializable workflow configuration types for
//! flowline. These types represent workflow definitions as the
//! workflow-definition service hands them over, before they are validated and
//! locked by `flowline-workflow`.
//!
//! Configuration is plain JSON:
//!
//! ```json
//! {
//!   "workflow_id": "wf-1",
//!   "name": "Greeting",
//!   "nodes": [
//!     { "node_id": "trigger", "type": "trigger" },
//!     { "node_id": "greet", "type": "transform",
//!       "transform_type": "template", "template": "Hello {{ input.name }}" }
//!   ],
//!   "edges": [{ "from": "trigger", "to": "greet" }]
//! }
//! ```

mod edge;
mod enums;
mod node;
mod transform;
mod workflow;

pub use edge::Edge;
pub use enums::CombineFailurePolicy;
pub use node::{NodeDef, NodeType};
pub use transform::{CombineField, TransformConfig};
pub use workflow::WorkflowDef;
