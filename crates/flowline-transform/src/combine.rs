use std::collections::HashMap;

use flowline_config::{CombineFailurePolicy, CombineField};
use flowline_value::{Object, Value, resolve_or_null};

use crate::error::{EvalError, NodeOutcome};

/// Assemble an object from fields of several upstream outputs.
///
/// Fields appear in declared order. A path miss on a healthy source is a
/// null field. A failed or absent source fails the whole node under
/// [`CombineFailurePolicy::Fail`] and becomes a null field under
/// [`CombineFailurePolicy::Null`].
pub fn combine(
  node_id: &str,
  fields: &[CombineField],
  outputs: &HashMap<String, NodeOutcome>,
  policy: CombineFailurePolicy,
) -> NodeOutcome {
  let mut object = Object::with_capacity(fields.len());

  for field in fields {
    let value = match outputs.get(&field.source_node_id) {
      Some(Ok(source)) => resolve_or_null(source, &field.source_path),
      _ => match policy {
        CombineFailurePolicy::Fail => {
          return Err(EvalError::CombineSourceFailed {
            node_id: node_id.to_string(),
            field_name: field.field_name.clone(),
            source_node_id: field.source_node_id.clone(),
          });
        }
        CombineFailurePolicy::Null => Value::Null,
      },
    };
    object.insert(field.field_name.clone(), value);
  }

  Ok(Value::Object(object))
}
