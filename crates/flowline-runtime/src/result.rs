//! Run result types.

use std::collections::{BTreeMap, HashMap};

use flowline_transform::{EvalError, NodeOutcome};
use flowline_value::Value;
use serde::{Deserialize, Serialize, Serializer};

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
  /// Every node that could become ready was evaluated.
  Completed,
  /// The caller cancelled the run.
  Cancelled,
  /// The run exceeded `run_timeout_ms`.
  TimedOut,
}

/// Result of one run.
///
/// `outputs` holds a result for every seeded node and every transform node
/// that was evaluated or short-circuited. Nodes that never became ready, or
/// that had not finished when the run was cancelled, are absent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunResult {
  /// Unique run ID.
  pub run_id: String,
  pub status: RunStatus,
  /// Results keyed by node_id, serialized as `{"ok": value}` or
  /// `{"error": {...}}`.
  #[serde(serialize_with = "serialize_outputs")]
  pub outputs: HashMap<String, NodeOutcome>,
}

impl RunResult {
  pub fn output(&self, node_id: &str) -> Option<&NodeOutcome> {
    self.outputs.get(node_id)
  }

  /// The successful value of a node, if it has one.
  pub fn value(&self, node_id: &str) -> Option<&Value> {
    self.outputs.get(node_id).and_then(|outcome| outcome.as_ref().ok())
  }

  /// The failure of a node, if it failed.
  pub fn error(&self, node_id: &str) -> Option<&EvalError> {
    self.outputs.get(node_id).and_then(|outcome| outcome.as_ref().err())
  }

  pub fn is_completed(&self) -> bool {
    self.status == RunStatus::Completed
  }
}

#[derive(Serialize)]
#[serde(rename_all = "snake_case")]
enum OutcomeRepr<'a> {
  Ok(&'a Value),
  Error(&'a EvalError),
}

impl<'a> From<&'a NodeOutcome> for OutcomeRepr<'a> {
  fn from(outcome: &'a NodeOutcome) -> Self {
    match outcome {
      Ok(value) => OutcomeRepr::Ok(value),
      Err(error) => OutcomeRepr::Error(error),
    }
  }
}

fn serialize_outputs<S: Serializer>(
  outputs: &HashMap<String, NodeOutcome>,
  serializer: S,
) -> Result<S::Ok, S::Error> {
  // Sorted for stable output.
  let sorted: BTreeMap<&str, OutcomeRepr<'_>> = outputs
    .iter()
    .map(|(id, outcome)| (id.as_str(), OutcomeRepr::from(outcome)))
    .collect();
  sorted.serialize(serializer)
}
