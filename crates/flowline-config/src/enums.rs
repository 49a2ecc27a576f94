use serde::{Deserialize, Serialize};

/// How a combine transform treats a source node whose result is a failure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombineFailurePolicy {
  /// The whole combine fails with `CombineSourceFailed`.
  #[default]
  Fail,
  /// The affected field becomes null and the combine succeeds.
  Null,
}
