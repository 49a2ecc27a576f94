use serde::{Deserialize, Serialize};

use crate::transform::TransformConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDef {
  pub node_id: String,
  #[serde(flatten)]
  pub node_type: NodeType,
  /// Script timeout override for code transforms.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub timeout_ms: Option<u64>,
}

impl NodeDef {
  pub fn new(node_id: impl Into<String>, node_type: NodeType) -> Self {
    Self {
      node_id: node_id.into(),
      node_type,
      timeout_ms: None,
    }
  }

  pub fn trigger(node_id: impl Into<String>) -> Self {
    Self::new(node_id, NodeType::Trigger)
  }

  pub fn transform(node_id: impl Into<String>, transform: TransformConfig) -> Self {
    Self::new(node_id, NodeType::Transform { transform })
  }

  /// The transform configuration, if this is a transform node.
  pub fn transform_config(&self) -> Option<&TransformConfig> {
    match &self.node_type {
      NodeType::Transform { transform } => Some(transform),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeType {
  /// A trigger node that starts the workflow. Its output is seeded.
  Trigger,
  /// A call to an external resource. Its output is seeded.
  ResourceCall { resource: String },
  /// A transform evaluated by the engine.
  Transform {
    #[serde(flatten)]
    transform: TransformConfig,
  },
}
