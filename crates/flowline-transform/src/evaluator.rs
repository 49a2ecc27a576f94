//! Transform node evaluation.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use flowline_config::{CombineFailurePolicy, TransformConfig};
use flowline_script::ScriptEvaluator;
use flowline_value::{Value, resolve_or_null};
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument};

use crate::combine::combine;
use crate::error::{EvalError, NodeOutcome};
use crate::template::TemplateRenderer;

/// Knobs shared by every transform evaluation in a run.
#[derive(Debug, Clone)]
pub struct TransformOptions {
  /// What a combine node does when one of its sources failed.
  pub combine_failure: CombineFailurePolicy,
  /// Script timeout for code nodes without their own `timeout_ms`.
  pub script_timeout: Duration,
}

impl Default for TransformOptions {
  fn default() -> Self {
    Self {
      combine_failure: CombineFailurePolicy::Fail,
      script_timeout: Duration::from_secs(5),
    }
  }
}

/// Everything needed to evaluate one transform node.
#[derive(Debug, Clone, Copy)]
pub struct TransformInput<'a> {
  pub node_id: &'a str,
  pub config: &'a TransformConfig,
  /// Upstream node ids, in edge order.
  pub upstream: &'a [String],
  /// Recorded outcomes, at least for every upstream node.
  pub outputs: &'a HashMap<String, NodeOutcome>,
  /// Per-node script timeout override.
  pub timeout_ms: Option<u64>,
}

/// Evaluates transform nodes against upstream outcomes.
#[derive(Clone)]
pub struct TransformEvaluator {
  script: Arc<dyn ScriptEvaluator>,
  templates: TemplateRenderer,
  options: TransformOptions,
}

impl TransformEvaluator {
  pub fn new(script: Arc<dyn ScriptEvaluator>, options: TransformOptions) -> Self {
    Self {
      script,
      templates: TemplateRenderer::new(),
      options,
    }
  }

  pub fn options(&self) -> &TransformOptions {
    &self.options
  }

  /// The failure recorded without evaluating, when a single-upstream
  /// transform's upstream failed. Combine nodes never short-circuit.
  pub fn short_circuit(input: &TransformInput<'_>) -> Option<EvalError> {
    if !input.config.has_single_upstream() {
      return None;
    }
    let upstream_id = input.upstream.first()?;
    match input.outputs.get(upstream_id) {
      Some(Ok(_)) => None,
      _ => Some(EvalError::UpstreamFailed {
        node_id: input.node_id.to_string(),
        upstream_id: upstream_id.clone(),
      }),
    }
  }

  /// Evaluate one node. Never panics; a panic inside evaluation is recorded
  /// as [`EvalError::Internal`].
  #[instrument(
    name = "transform_evaluate",
    skip(self, input, cancel),
    fields(node_id = %input.node_id, transform = input.config.kind())
  )]
  pub async fn evaluate(&self, input: TransformInput<'_>, cancel: &CancellationToken) -> NodeOutcome {
    if let Some(error) = Self::short_circuit(&input) {
      debug!(error = %error, "transform short-circuited");
      return Err(error);
    }

    match AssertUnwindSafe(self.dispatch(&input, cancel))
      .catch_unwind()
      .await
    {
      Ok(outcome) => outcome,
      Err(panic) => {
        let message = panic_message(&*panic);
        error!(node_id = %input.node_id, message = %message, "transform panicked");
        Err(EvalError::Internal {
          node_id: input.node_id.to_string(),
          message,
        })
      }
    }
  }

  async fn dispatch(&self, input: &TransformInput<'_>, cancel: &CancellationToken) -> NodeOutcome {
    let node_id = input.node_id;

    match input.config {
      TransformConfig::Extract { path } => {
        let upstream = single_upstream(input)?;
        Ok(resolve_or_null(upstream, path))
      }
      TransformConfig::Template { template } => {
        let upstream = single_upstream(input)?;
        self
          .templates
          .render(template, upstream)
          .map(Value::String)
          .map_err(|e| EvalError::TemplateError {
            node_id: node_id.to_string(),
            message: e.to_string(),
          })
      }
      TransformConfig::Code { code } => {
        let upstream = single_upstream(input)?;
        let timeout = input
          .timeout_ms
          .map(Duration::from_millis)
          .unwrap_or(self.options.script_timeout);
        self
          .script
          .evaluate(code, upstream, timeout, cancel)
          .await
          .map_err(|e| EvalError::ScriptError {
            node_id: node_id.to_string(),
            message: e.to_string(),
          })
      }
      TransformConfig::Combine { fields } => combine(
        node_id,
        fields,
        input.outputs,
        self.options.combine_failure,
      ),
    }
  }
}

fn single_upstream<'a>(input: &TransformInput<'a>) -> Result<&'a Value, EvalError> {
  let Some(upstream_id) = input.upstream.first() else {
    return Err(EvalError::MissingUpstream {
      node_id: input.node_id.to_string(),
      source_node_id: None,
    });
  };

  match input.outputs.get(upstream_id) {
    Some(Ok(value)) => Ok(value),
    _ => Err(EvalError::UpstreamFailed {
      node_id: input.node_id.to_string(),
      upstream_id: upstream_id.clone(),
    }),
  }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
  if let Some(s) = panic.downcast_ref::<&str>() {
    s.to_string()
  } else if let Some(s) = panic.downcast_ref::<String>() {
    s.clone()
  } else {
    "transform evaluation panicked".to_string()
  }
}
