//! Path resolution.
//!
//! A path addresses a field inside a [`Value`]:
//!
//! ```text
//! data.items[0].name     object key, array index, object key
//! .data                  leading dot is allowed
//! ["key.with.dots"]      quoted bracket key
//! items.0                numeric key indexes an array
//! ```
//!
//! Resolution never fails loudly. A missing key, an out-of-range or
//! non-numeric index, indexing into a scalar, and a malformed path all
//! resolve to "not found".

use crate::value::Value;

/// One step of a parsed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
  Key(String),
  Index(usize),
}

/// Parse a path into segments.
///
/// Returns `None` for malformed paths (unterminated brackets, empty keys,
/// non-numeric unquoted indices). The empty path parses to no segments.
pub fn parse_path(path: &str) -> Option<Vec<Segment>> {
  let mut segments = Vec::new();
  let mut rest = path;
  let mut at_start = true;

  while !rest.is_empty() {
    if let Some(after) = rest.strip_prefix('[') {
      let close = after.find(']')?;
      segments.push(parse_bracket(&after[..close])?);
      rest = &after[close + 1..];
    } else {
      let body = match rest.strip_prefix('.') {
        Some(after) => after,
        None if at_start => rest,
        // e.g. `a[0]b`
        None => return None,
      };
      let end = body.find(['.', '[']).unwrap_or(body.len());
      let key = &body[..end];
      if key.is_empty() || key.contains(']') {
        return None;
      }
      segments.push(Segment::Key(key.to_string()));
      rest = &body[end..];
    }
    at_start = false;
  }

  Some(segments)
}

fn parse_bracket(inner: &str) -> Option<Segment> {
  let quoted = inner.len() >= 2
    && ((inner.starts_with('"') && inner.ends_with('"'))
      || (inner.starts_with('\'') && inner.ends_with('\'')));

  if quoted {
    Some(Segment::Key(inner[1..inner.len() - 1].to_string()))
  } else {
    parse_index(inner).map(Segment::Index)
  }
}

fn parse_index(s: &str) -> Option<usize> {
  if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
    return None;
  }
  s.parse().ok()
}

/// Resolve `path` against `root`.
///
/// The empty path resolves to `root` itself.
pub fn resolve<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
  let segments = parse_path(path)?;
  segments.iter().try_fold(root, step)
}

/// Resolve `path` against `root`, yielding an owned value or `Null` on a miss.
pub fn resolve_or_null(root: &Value, path: &str) -> Value {
  resolve(root, path).cloned().unwrap_or(Value::Null)
}

fn step<'a>(value: &'a Value, segment: &Segment) -> Option<&'a Value> {
  match (value, segment) {
    (Value::Object(object), Segment::Key(key)) => object.get(key),
    (Value::Object(object), Segment::Index(index)) => object.get(&index.to_string()),
    (Value::Array(items), Segment::Index(index)) => items.get(*index),
    (Value::Array(items), Segment::Key(key)) => parse_index(key).and_then(|i| items.get(i)),
    _ => None,
  }
}
