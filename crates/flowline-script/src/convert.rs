//! Marshalling between flowline values and Lua values.
//!
//! Arrays become 1-based sequence tables and objects become string-keyed
//! tables. Integral numbers enter Lua as integers so indexing and string
//! formatting behave naturally inside scripts.
//!
//! Lua has no null, so a null array element is a nil hole. Arrays passed in
//! carry a metatable recording their length, and a table with that marker
//! comes back as an array of at least that length, holes as null.
//!
//! Any other table whose keys are exactly `1..n` is an array; the rest are
//! objects with their keys sorted. An empty unmarked table is an empty
//! object.

use flowline_value::{Object, Value};
use mlua::{Lua, Table, Value as LuaValue};

use crate::error::ScriptError;

/// Deepest nesting accepted in a returned value. Cyclic tables hit this.
pub(crate) const MAX_DEPTH: usize = 64;

/// Most values accepted in a returned value.
pub(crate) const MAX_VALUES: usize = 1_000_000;

/// Metatable field holding the length of an array passed into Lua.
const ARRAY_LEN_KEY: &str = "__flowline_array_len";

/// Largest integer magnitude passed into Lua as an integer (2^53 - 1).
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

pub(crate) fn to_lua(lua: &Lua, value: &Value) -> mlua::Result<LuaValue> {
  Ok(match value {
    Value::Null => LuaValue::Nil,
    Value::Bool(b) => LuaValue::Boolean(*b),
    Value::Number(n) if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER => {
      LuaValue::Integer(*n as i64)
    }
    Value::Number(n) => LuaValue::Number(*n),
    Value::String(s) => LuaValue::String(lua.create_string(s)?),
    Value::Array(items) => {
      let table = lua.create_table()?;
      for (i, item) in items.iter().enumerate() {
        table.raw_set(i + 1, to_lua(lua, item)?)?;
      }
      let meta = lua.create_table()?;
      meta.raw_set(ARRAY_LEN_KEY, items.len())?;
      let _ = table.set_metatable(Some(meta));
      LuaValue::Table(table)
    }
    Value::Object(object) => {
      let table = lua.create_table()?;
      for (key, item) in object.iter() {
        table.raw_set(key, to_lua(lua, item)?)?;
      }
      LuaValue::Table(table)
    }
  })
}

/// Converts a returned Lua value, bounded in depth and total size.
pub(crate) struct Marshaller {
  remaining: usize,
}

impl Marshaller {
  pub(crate) fn new() -> Self {
    Self {
      remaining: MAX_VALUES,
    }
  }

  pub(crate) fn from_lua(&mut self, value: &LuaValue) -> Result<Value, ScriptError> {
    self.convert(value, 0)
  }

  fn convert(&mut self, value: &LuaValue, depth: usize) -> Result<Value, ScriptError> {
    if depth > MAX_DEPTH {
      return Err(unrepresentable(format!(
        "value is nested deeper than {} levels (cyclic table?)",
        MAX_DEPTH
      )));
    }
    if self.remaining == 0 {
      return Err(unrepresentable(format!(
        "value contains more than {} elements",
        MAX_VALUES
      )));
    }
    self.remaining -= 1;

    match value {
      LuaValue::Nil => Ok(Value::Null),
      LuaValue::Boolean(b) => Ok(Value::Bool(*b)),
      LuaValue::Integer(i) => Ok(Value::Number(*i as f64)),
      LuaValue::Number(n) if n.is_finite() => Ok(Value::Number(*n)),
      LuaValue::Number(n) => Err(unrepresentable(format!("non-finite number {}", n))),
      LuaValue::String(s) => lua_string(s).map(Value::String),
      LuaValue::Table(table) => self.convert_table(table, depth),
      other => Err(unrepresentable(format!(
        "{} values cannot be returned",
        other.type_name()
      ))),
    }
  }

  fn convert_table(&mut self, table: &Table, depth: usize) -> Result<Value, ScriptError> {
    let mut entries: Vec<(LuaValue, LuaValue)> = Vec::new();
    for pair in table.clone().pairs::<LuaValue, LuaValue>() {
      entries.push(pair.map_err(lua_error)?);
    }

    let marked_len = match table.metatable() {
      Some(meta) => meta.raw_get::<Option<usize>>(ARRAY_LEN_KEY).map_err(lua_error)?,
      None => None,
    };

    let len = entries.len();
    let mut max_index = 0usize;
    let all_indices = entries.iter().all(|(k, _)| match k {
      LuaValue::Integer(i) if *i >= 1 => {
        max_index = max_index.max(*i as usize);
        true
      }
      _ => false,
    });

    let array_len = match marked_len {
      Some(marked) if all_indices => Some(marked.max(max_index)),
      None if all_indices && len > 0 && max_index == len => Some(len),
      _ => None,
    };

    if let Some(array_len) = array_len {
      if array_len > self.remaining {
        return Err(unrepresentable(format!(
          "array of length {} exceeds {} elements",
          array_len, MAX_VALUES
        )));
      }
      let mut items = vec![Value::Null; array_len];
      for (key, item) in &entries {
        if let LuaValue::Integer(i) = key {
          items[*i as usize - 1] = self.convert(item, depth + 1)?;
        }
      }
      return Ok(Value::Array(items));
    }

    let mut fields: Vec<(String, Value)> = Vec::with_capacity(len);
    for (key, item) in &entries {
      let key = match key {
        LuaValue::String(s) => lua_string(s)?,
        LuaValue::Integer(i) => i.to_string(),
        other => {
          return Err(unrepresentable(format!(
            "{} table keys are not supported",
            other.type_name()
          )));
        }
      };
      fields.push((key, self.convert(item, depth + 1)?));
    }
    fields.sort_by(|a, b| a.0.cmp(&b.0));

    Ok(Value::Object(fields.into_iter().collect::<Object>()))
  }
}

fn lua_string(s: &mlua::String) -> Result<String, ScriptError> {
  s.to_str()
    .map(|s| s.to_string())
    .map_err(|_| unrepresentable("string is not valid UTF-8".to_string()))
}

fn lua_error(error: mlua::Error) -> ScriptError {
  ScriptError::Runtime {
    message: error.to_string(),
  }
}

fn unrepresentable(message: String) -> ScriptError {
  ScriptError::Unrepresentable { message }
}
