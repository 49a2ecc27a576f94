//! Evaluation errors.

use flowline_value::Value;
use flowline_workflow::WorkflowError;
use serde::{Deserialize, Serialize};

/// The recorded result of one node.
pub type NodeOutcome = Result<Value, EvalError>;

/// Errors produced while evaluating a workflow.
///
/// `CyclicGraph`, `MissingUpstream` and `InvalidConfig` are structural: they
/// reject the whole run before any node executes. The rest are scoped to a
/// single node and recorded as that node's result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind")]
pub enum EvalError {
  #[error("workflow graph contains a cycle: {}", .cycle.join(" -> "))]
  CyclicGraph { cycle: Vec<String> },

  #[error("{}", missing_upstream_message(.node_id, .source_node_id.as_deref()))]
  MissingUpstream {
    node_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source_node_id: Option<String>,
  },

  #[error("node '{node_id}' was not evaluated because upstream '{upstream_id}' failed")]
  UpstreamFailed {
    node_id: String,
    upstream_id: String,
  },

  #[error("script in node '{node_id}' failed: {message}")]
  ScriptError { node_id: String, message: String },

  #[error(
    "combine node '{node_id}' field '{field_name}': source '{source_node_id}' failed"
  )]
  CombineSourceFailed {
    node_id: String,
    field_name: String,
    source_node_id: String,
  },

  #[error("template in node '{node_id}' failed: {message}")]
  TemplateError { node_id: String, message: String },

  #[error("invalid configuration for node '{node_id}': {message}")]
  InvalidConfig { node_id: String, message: String },

  #[error("node '{node_id}' failed externally: {message}")]
  ExternalFailure { node_id: String, message: String },

  #[error("internal error in node '{node_id}': {message}")]
  Internal { node_id: String, message: String },
}

fn missing_upstream_message(node_id: &str, source_node_id: Option<&str>) -> String {
  match source_node_id {
    Some(source) => format!(
      "node '{}' reads from '{}' but no edge connects them",
      node_id, source
    ),
    None => format!("node '{}' has no upstream node", node_id),
  }
}

impl EvalError {
  /// The stable kind string, matching the serialized `kind` tag.
  pub fn kind(&self) -> &'static str {
    match self {
      EvalError::CyclicGraph { .. } => "CyclicGraph",
      EvalError::MissingUpstream { .. } => "MissingUpstream",
      EvalError::UpstreamFailed { .. } => "UpstreamFailed",
      EvalError::ScriptError { .. } => "ScriptError",
      EvalError::CombineSourceFailed { .. } => "CombineSourceFailed",
      EvalError::TemplateError { .. } => "TemplateError",
      EvalError::InvalidConfig { .. } => "InvalidConfig",
      EvalError::ExternalFailure { .. } => "ExternalFailure",
      EvalError::Internal { .. } => "Internal",
    }
  }

  /// The node this error is scoped to. A cycle reports its first node.
  pub fn node_id(&self) -> Option<&str> {
    match self {
      EvalError::CyclicGraph { cycle } => cycle.first().map(String::as_str),
      EvalError::MissingUpstream { node_id, .. }
      | EvalError::UpstreamFailed { node_id, .. }
      | EvalError::ScriptError { node_id, .. }
      | EvalError::CombineSourceFailed { node_id, .. }
      | EvalError::TemplateError { node_id, .. }
      | EvalError::InvalidConfig { node_id, .. }
      | EvalError::ExternalFailure { node_id, .. }
      | EvalError::Internal { node_id, .. } => Some(node_id),
    }
  }

  /// Whether this error rejects a whole run rather than one node.
  pub fn is_structural(&self) -> bool {
    matches!(
      self,
      EvalError::CyclicGraph { .. }
        | EvalError::MissingUpstream { .. }
        | EvalError::InvalidConfig { .. }
    )
  }
}

impl From<WorkflowError> for EvalError {
  fn from(error: WorkflowError) -> Self {
    match error {
      WorkflowError::Cycle { cycle } => EvalError::CyclicGraph { cycle },
      WorkflowError::MissingUpstream {
        node_id,
        source_node_id,
      } => EvalError::MissingUpstream {
        node_id,
        source_node_id,
      },
      WorkflowError::DuplicateNode(node_id) => EvalError::InvalidConfig {
        message: format!("duplicate node id '{}'", node_id),
        node_id,
      },
      WorkflowError::InvalidEdge { from, to } => EvalError::InvalidConfig {
        message: format!("edge '{}' -> '{}' references an unknown node", from, to),
        node_id: from,
      },
      WorkflowError::InvalidNode { node_id, message } => {
        EvalError::InvalidConfig { node_id, message }
      }
    }
  }
}
