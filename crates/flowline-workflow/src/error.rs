use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
  #[error("duplicate node id: {0}")]
  DuplicateNode(String),

  #[error("edge references unknown node: from={from}, to={to}")]
  InvalidEdge { from: String, to: String },

  #[error("workflow graph contains a cycle: {}", .cycle.join(" -> "))]
  Cycle { cycle: Vec<String> },

  #[error("node '{node_id}' is missing a required upstream edge")]
  MissingUpstream {
    node_id: String,
    /// The upstream the node names but is not connected to, if any.
    source_node_id: Option<String>,
  },

  #[error("invalid configuration for node '{node_id}': {message}")]
  InvalidNode { node_id: String, message: String },
}
