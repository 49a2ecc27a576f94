//! Value model.
//!
//! Numbers carry `f64` semantics only: there is no integer/float distinction,
//! so `1` and `1.0` are the same value and render identically. Objects keep
//! insertion order for serialization, but equality ignores order.

use std::fmt;

use indexmap::IndexMap;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Largest integer magnitude that `f64` represents exactly (2^53 - 1).
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// A JSON-like value.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
  #[default]
  Null,
  Bool(bool),
  Number(f64),
  String(String),
  Array(Vec<Value>),
  Object(Object),
}

/// An insertion-ordered string-keyed map of values.
///
/// Equality compares entries regardless of order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Object {
  entries: IndexMap<String, Value>,
}

impl Object {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_capacity(capacity: usize) -> Self {
    Self {
      entries: IndexMap::with_capacity(capacity),
    }
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn get(&self, key: &str) -> Option<&Value> {
    self.entries.get(key)
  }

  pub fn contains_key(&self, key: &str) -> bool {
    self.entries.contains_key(key)
  }

  /// Insert a value, returning the previous value for the key.
  ///
  /// Replacing an existing key keeps its original position.
  pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
    self.entries.insert(key.into(), value)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
    self.entries.iter().map(|(k, v)| (k.as_str(), v))
  }

  pub fn keys(&self) -> impl Iterator<Item = &str> {
    self.entries.keys().map(String::as_str)
  }
}

impl FromIterator<(String, Value)> for Object {
  fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
    Self {
      entries: iter.into_iter().collect(),
    }
  }
}

impl IntoIterator for Object {
  type Item = (String, Value);
  type IntoIter = indexmap::map::IntoIter<String, Value>;

  fn into_iter(self) -> Self::IntoIter {
    self.entries.into_iter()
  }
}

impl Value {
  pub fn is_null(&self) -> bool {
    matches!(self, Value::Null)
  }

  pub fn as_bool(&self) -> Option<bool> {
    match self {
      Value::Bool(b) => Some(*b),
      _ => None,
    }
  }

  pub fn as_f64(&self) -> Option<f64> {
    match self {
      Value::Number(n) => Some(*n),
      _ => None,
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      Value::String(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_array(&self) -> Option<&[Value]> {
    match self {
      Value::Array(items) => Some(items),
      _ => None,
    }
  }

  pub fn as_object(&self) -> Option<&Object> {
    match self {
      Value::Object(object) => Some(object),
      _ => None,
    }
  }

  /// Look up an object key. Non-objects have no keys.
  pub fn get(&self, key: &str) -> Option<&Value> {
    self.as_object().and_then(|o| o.get(key))
  }

  /// Look up an array element. Non-arrays have no elements.
  pub fn get_index(&self, index: usize) -> Option<&Value> {
    self.as_array().and_then(|items| items.get(index))
  }

  /// Name of the variant, for diagnostics.
  pub fn type_name(&self) -> &'static str {
    match self {
      Value::Null => "null",
      Value::Bool(_) => "bool",
      Value::Number(_) => "number",
      Value::String(_) => "string",
      Value::Array(_) => "array",
      Value::Object(_) => "object",
    }
  }

  /// Render the value as template text.
  ///
  /// Strings render without quotes, null renders as an empty string, and
  /// arrays and objects render as compact JSON.
  pub fn to_text(&self) -> String {
    match self {
      Value::Null => String::new(),
      Value::Bool(b) => b.to_string(),
      Value::Number(n) => format_number(*n),
      Value::String(s) => s.clone(),
      Value::Array(_) | Value::Object(_) => self.to_json_string(),
    }
  }

  /// Compact JSON text.
  pub fn to_json_string(&self) -> String {
    serde_json::to_string(self).unwrap_or_else(|_| "null".to_string())
  }

  /// Convert into a `serde_json::Value`.
  ///
  /// Integral numbers become JSON integers; non-finite numbers become null.
  pub fn to_json(&self) -> serde_json::Value {
    match self {
      Value::Null => serde_json::Value::Null,
      Value::Bool(b) => serde_json::Value::Bool(*b),
      Value::Number(n) => number_to_json(*n),
      Value::String(s) => serde_json::Value::String(s.clone()),
      Value::Array(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
      Value::Object(object) => serde_json::Value::Object(
        object
          .iter()
          .map(|(k, v)| (k.to_string(), v.to_json()))
          .collect(),
      ),
    }
  }
}

/// Canonical decimal rendering of a number.
///
/// Integral values within the exactly-representable range drop the fractional
/// part (`5`, not `5.0`); everything else uses the shortest round-trip form.
pub fn format_number(n: f64) -> String {
  if n.is_nan() {
    "NaN".to_string()
  } else if n.is_infinite() {
    let sign = if n > 0.0 { "" } else { "-" };
    format!("{}Infinity", sign)
  } else if is_safe_integer(n) {
    (n as i64).to_string()
  } else {
    n.to_string()
  }
}

fn is_safe_integer(n: f64) -> bool {
  n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER
}

fn number_to_json(n: f64) -> serde_json::Value {
  if is_safe_integer(n) {
    serde_json::Value::Number((n as i64).into())
  } else {
    serde_json::Number::from_f64(n)
      .map(serde_json::Value::Number)
      .unwrap_or(serde_json::Value::Null)
  }
}

impl fmt::Display for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.to_json_string())
  }
}

impl Serialize for Value {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    match self {
      Value::Null => serializer.serialize_unit(),
      Value::Bool(b) => serializer.serialize_bool(*b),
      Value::Number(n) if is_safe_integer(*n) => serializer.serialize_i64(*n as i64),
      Value::Number(n) if n.is_finite() => serializer.serialize_f64(*n),
      Value::Number(_) => serializer.serialize_unit(),
      Value::String(s) => serializer.serialize_str(s),
      Value::Array(items) => {
        let mut seq = serializer.serialize_seq(Some(items.len()))?;
        for item in items {
          seq.serialize_element(item)?;
        }
        seq.end()
      }
      Value::Object(object) => {
        let mut map = serializer.serialize_map(Some(object.len()))?;
        for (k, v) in object.iter() {
          map.serialize_entry(k, v)?;
        }
        map.end()
      }
    }
  }
}

impl<'de> Deserialize<'de> for Value {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    serde_json::Value::deserialize(deserializer).map(Value::from)
  }
}

impl From<serde_json::Value> for Value {
  fn from(value: serde_json::Value) -> Self {
    match value {
      serde_json::Value::Null => Value::Null,
      serde_json::Value::Bool(b) => Value::Bool(b),
      serde_json::Value::Number(n) => n.as_f64().map(Value::Number).unwrap_or(Value::Null),
      serde_json::Value::String(s) => Value::String(s),
      serde_json::Value::Array(items) => Value::Array(items.into_iter().map(Value::from).collect()),
      serde_json::Value::Object(map) => {
        Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
      }
    }
  }
}

impl From<Value> for serde_json::Value {
  fn from(value: Value) -> Self {
    value.to_json()
  }
}

impl From<bool> for Value {
  fn from(b: bool) -> Self {
    Value::Bool(b)
  }
}

impl From<f64> for Value {
  fn from(n: f64) -> Self {
    Value::Number(n)
  }
}

impl From<i32> for Value {
  fn from(n: i32) -> Self {
    Value::Number(f64::from(n))
  }
}

impl From<i64> for Value {
  fn from(n: i64) -> Self {
    Value::Number(n as f64)
  }
}

impl From<&str> for Value {
  fn from(s: &str) -> Self {
    Value::String(s.to_string())
  }
}

impl From<String> for Value {
  fn from(s: String) -> Self {
    Value::String(s)
  }
}

impl From<Vec<Value>> for Value {
  fn from(items: Vec<Value>) -> Self {
    Value::Array(items)
  }
}

impl From<Object> for Value {
  fn from(object: Object) -> Self {
    Value::Object(object)
  }
}
