use serde::{Deserialize, Serialize};

/// Configuration of a transform node.
///
/// Each variant carries only the fields its strategy needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "transform_type", rename_all = "snake_case")]
pub enum TransformConfig {
  /// Pull one field out of the single upstream output.
  Extract { path: String },
  /// Render a `{{ input... }}` template against the single upstream output.
  Template { template: String },
  /// Run a sandboxed script body with the single upstream output bound as `input`.
  Code { code: String },
  /// Assemble an object from fields of several upstream outputs.
  Combine { fields: Vec<CombineField> },
}

impl TransformConfig {
  /// Stable name of the transform kind.
  pub fn kind(&self) -> &'static str {
    match self {
      TransformConfig::Extract { .. } => "extract",
      TransformConfig::Template { .. } => "template",
      TransformConfig::Code { .. } => "code",
      TransformConfig::Combine { .. } => "combine",
    }
  }

  /// Whether the transform reads exactly one upstream node.
  pub fn has_single_upstream(&self) -> bool {
    !matches!(self, TransformConfig::Combine { .. })
  }
}

/// One output field of a combine transform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombineField {
  /// Key of the field in the combined object.
  pub field_name: String,
  /// Node whose output the field is read from.
  pub source_node_id: String,
  /// Path into the source output. Empty means the whole output.
  #[serde(default)]
  pub source_path: String,
}

impl CombineField {
  pub fn new(
    field_name: impl Into<String>,
    source_node_id: impl Into<String>,
    source_path: impl Into<String>,
  ) -> Self {
    Self {
      field_name: field_name.into(),
      source_node_id: source_node_id.into(),
      source_path: source_path.into(),
    }
  }
}
