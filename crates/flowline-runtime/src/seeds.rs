use std::collections::HashMap;

use flowline_transform::{EvalError, NodeOutcome};
use flowline_value::Value;

/// Outputs of non-transform nodes, supplied by the caller.
///
/// A seed is either a value or the failure message of a node that failed
/// before the engine ran (recorded as [`EvalError::ExternalFailure`]).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Seeds {
  entries: HashMap<String, NodeOutcome>,
}

impl Seeds {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_output(mut self, node_id: impl Into<String>, value: impl Into<Value>) -> Self {
    self.insert_output(node_id, value);
    self
  }

  pub fn with_failure(mut self, node_id: impl Into<String>, message: impl Into<String>) -> Self {
    self.insert_failure(node_id, message);
    self
  }

  pub fn insert_output(&mut self, node_id: impl Into<String>, value: impl Into<Value>) {
    self.entries.insert(node_id.into(), Ok(value.into()));
  }

  pub fn insert_failure(&mut self, node_id: impl Into<String>, message: impl Into<String>) {
    let node_id = node_id.into();
    let error = EvalError::ExternalFailure {
      node_id: node_id.clone(),
      message: message.into(),
    };
    self.entries.insert(node_id, Err(error));
  }

  pub fn get(&self, node_id: &str) -> Option<&NodeOutcome> {
    self.entries.get(node_id)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn node_ids(&self) -> impl Iterator<Item = &str> {
    self.entries.keys().map(String::as_str)
  }
}

impl IntoIterator for Seeds {
  type Item = (String, NodeOutcome);
  type IntoIter = std::collections::hash_map::IntoIter<String, NodeOutcome>;

  fn into_iter(self) -> Self::IntoIter {
    self.entries.into_iter()
  }
}

impl FromIterator<(String, Value)> for Seeds {
  fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
    Self {
      entries: iter
        .into_iter()
        .map(|(node_id, value)| (node_id, Ok(value)))
        .collect(),
    }
  }
}
