//! Template rendering for template transforms.
//!
//! A template is literal text with `{{ ... }}` placeholders evaluated against
//! the upstream output, bound as `input`:
//!
//! ```text
//! Hello {{ input.user.name }}, you have {{ input.items | length }} items
//! ```
//!
//! Plain references (`input`, `input.a.b`, `input[0].c`) go through the path
//! resolver. Anything else is evaluated as a minijinja expression. Misses in
//! either form render as the empty string; only expressions that fail to
//! compile or evaluate are errors.

use flowline_value::{Value, resolve};
use minijinja::{Environment, UndefinedBehavior, context};

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Characters that mark a placeholder body as an expression rather than a
/// path reference.
const EXPRESSION_CHARS: &[char] = &[
  '|', '(', ')', '~', '\'', '"', '+', '*', '/', '%', '<', '>', '=', '!',
];

/// Errors raised by a placeholder expression.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TemplateError {
  #[error("invalid expression '{expression}': {message}")]
  Syntax { expression: String, message: String },

  #[error("failed to evaluate '{expression}': {message}")]
  Evaluation { expression: String, message: String },
}

/// Renders `{{ ... }}` templates against a single input value.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateRenderer;

impl TemplateRenderer {
  pub fn new() -> Self {
    Self
  }

  /// Render `template` with `input` bound.
  ///
  /// An unterminated or stray `{{` is kept as literal text, and an empty
  /// placeholder renders as nothing.
  pub fn render(&self, template: &str, input: &Value) -> Result<String, TemplateError> {
    let mut env = None;
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find(OPEN) {
      let after_open = &rest[start + OPEN.len()..];
      let Some(end) = after_open.find(CLOSE) else {
        break;
      };

      let body = &after_open[..end];

      // A stray `{{` is literal text; scanning resumes at the inner one.
      if let Some(inner) = body.find(OPEN) {
        out.push_str(&rest[..start + OPEN.len() + inner]);
        rest = &after_open[inner..];
        continue;
      }

      out.push_str(&rest[..start]);
      let body = body.trim();
      if !body.is_empty() {
        match input_path(body) {
          Some(path) => out.push_str(&resolve(input, path).map(Value::to_text).unwrap_or_default()),
          None => {
            let env = env.get_or_insert_with(expression_env);
            out.push_str(&evaluate_expression(env, body, input)?);
          }
        }
      }
      rest = &after_open[end + CLOSE.len()..];
    }

    out.push_str(rest);
    Ok(out)
  }
}

fn expression_env<'source>() -> Environment<'source> {
  let mut env = Environment::new();
  env.set_undefined_behavior(UndefinedBehavior::Chainable);
  env
}

fn evaluate_expression<'source>(
  env: &Environment<'source>,
  body: &'source str,
  input: &Value,
) -> Result<String, TemplateError> {
  let expr = env
    .compile_expression(body)
    .map_err(|e| TemplateError::Syntax {
      expression: body.to_string(),
      message: e.to_string(),
    })?;

  let result = expr
    .eval(context! { input => minijinja::Value::from_serialize(input) })
    .map_err(|e| TemplateError::Evaluation {
      expression: body.to_string(),
      message: e.to_string(),
    })?;

  if result.is_undefined() || result.is_none() {
    return Ok(String::new());
  }
  if let Some(s) = result.as_str() {
    return Ok(s.to_string());
  }

  let json = serde_json::to_value(&result).map_err(|e| TemplateError::Evaluation {
    expression: body.to_string(),
    message: e.to_string(),
  })?;
  Ok(Value::from(json).to_text())
}

/// The path part of a plain `input` reference, or `None` for anything that
/// needs the expression engine.
fn input_path(body: &str) -> Option<&str> {
  let path = body.strip_prefix("input")?;
  if !(path.is_empty() || path.starts_with('.') || path.starts_with('[')) {
    return None;
  }
  if path
    .chars()
    .any(|c| c.is_whitespace() || EXPRESSION_CHARS.contains(&c))
  {
    return None;
  }
  Some(path)
}
