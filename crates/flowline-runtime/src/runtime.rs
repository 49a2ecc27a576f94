//! Workflow runtime.
//!
//! The [`Runtime`] struct is the main entry point for evaluating workflows.
//! It owns a workflow definition, its configuration and the script
//! evaluator, and provides `invoke(seeds, cancel)` to run the whole graph.

use std::collections::HashMap;
use std::sync::Arc;

use flowline_config::WorkflowDef;
use flowline_script::{LuaEvaluator, ScriptEvaluator};
use flowline_transform::{EvalError, NodeOutcome, TransformEvaluator, TransformInput};
use flowline_workflow::Workflow;
use tokio_util::sync::CancellationToken;
use tracing::{Span, error, field, info, instrument};

use crate::config::RuntimeConfig;
use crate::events::{ExecutionNotifier, NoopNotifier};
use crate::result::RunResult;
use crate::run::Run;
use crate::seeds::Seeds;

/// The workflow runtime.
///
/// A runtime can be invoked any number of times; every invocation is an
/// independent run with no state carried over.
pub struct Runtime {
  definition: WorkflowDef,
  config: RuntimeConfig,
  evaluator: TransformEvaluator,
  notifier: Arc<dyn ExecutionNotifier>,
}

impl Runtime {
  /// Create a runtime evaluating code transforms with a sandboxed Lua
  /// interpreter.
  pub fn new(definition: WorkflowDef, config: RuntimeConfig) -> Self {
    let script = Arc::new(LuaEvaluator::new(config.lua_config()));
    Self::with_script_evaluator(definition, config, script)
  }

  /// Create a runtime with a custom script evaluator.
  pub fn with_script_evaluator(
    definition: WorkflowDef,
    config: RuntimeConfig,
    script: Arc<dyn ScriptEvaluator>,
  ) -> Self {
    let evaluator = TransformEvaluator::new(script, config.transform_options());
    Self {
      definition,
      config,
      evaluator,
      notifier: Arc::new(NoopNotifier),
    }
  }

  /// Send execution events to `notifier`.
  pub fn with_notifier(mut self, notifier: Arc<dyn ExecutionNotifier>) -> Self {
    self.notifier = notifier;
    self
  }

  pub fn definition(&self) -> &WorkflowDef {
    &self.definition
  }

  pub fn config(&self) -> &RuntimeConfig {
    &self.config
  }

  /// Validate the workflow graph and lock it.
  pub fn validate(&self) -> Result<Workflow, EvalError> {
    Workflow::lock(self.definition.clone()).map_err(EvalError::from)
  }

  /// Evaluate every transform node reachable from the seeded nodes.
  ///
  /// Structural problems (a cycle, a missing upstream edge, a malformed
  /// node, a seed for a transform or unknown node) are returned as `Err`
  /// before anything runs. Everything else is recorded per node in the
  /// returned [`RunResult`].
  #[instrument(
    name = "runtime_invoke",
    skip(self, seeds, cancel),
    fields(
      workflow_id = %self.definition.workflow_id,
      run_id = field::Empty,
    )
  )]
  pub async fn invoke(&self, seeds: Seeds, cancel: CancellationToken) -> Result<RunResult, EvalError> {
    let workflow = self.validate().and_then(|workflow| {
      validate_seeds(&workflow, &seeds)?;
      Ok(workflow)
    });
    let workflow = match workflow {
      Ok(workflow) => workflow,
      Err(e) => {
        error!(kind = e.kind(), error = %e, "run_rejected");
        return Err(e);
      }
    };

    let run = Run::new(
      Arc::new(workflow),
      self.evaluator.clone(),
      self.notifier.clone(),
      self.config.clone(),
      &cancel,
    );
    Span::current().record("run_id", run.run_id());

    Ok(run.execute(seeds).await)
  }

  /// Evaluate a single transform node in isolation.
  ///
  /// This is for debugging: `upstream` supplies the outputs of the node's
  /// upstream nodes directly and the rest of the graph is not run. Every
  /// upstream of the node must be seeded.
  #[instrument(
    name = "runtime_invoke_node",
    skip(self, upstream, cancel),
    fields(
      workflow_id = %self.definition.workflow_id,
      node_id = %node_id,
    )
  )]
  pub async fn invoke_node(
    &self,
    node_id: &str,
    upstream: Seeds,
    cancel: CancellationToken,
  ) -> Result<NodeOutcome, EvalError> {
    let workflow = self.validate()?;

    let node = workflow
      .get_node(node_id)
      .ok_or_else(|| invalid_config(node_id, "node not found in workflow".to_string()))?;
    let config = node.transform_config().ok_or_else(|| {
      invalid_config(
        node_id,
        "only transform nodes can be evaluated; other nodes are seeded".to_string(),
      )
    })?;

    let upstream_ids = workflow.graph().upstream(node_id);
    let mut outputs: HashMap<String, NodeOutcome> = HashMap::with_capacity(upstream_ids.len());
    for up in upstream_ids {
      let outcome = upstream.get(up).cloned().ok_or_else(|| {
        invalid_config(node_id, format!("no seed for upstream node '{}'", up))
      })?;
      outputs.insert(up.clone(), outcome);
    }

    info!(node_id = %node_id, transform = config.kind(), "invoke_node_started");

    let input = TransformInput {
      node_id,
      config,
      upstream: upstream_ids,
      outputs: &outputs,
      timeout_ms: node.timeout_ms,
    };
    let outcome = self.evaluator.evaluate(input, &cancel).await;

    match &outcome {
      Ok(output) => info!(node_id = %node_id, output = %output, "invoke_node_completed"),
      Err(e) => error!(node_id = %node_id, error = %e, "invoke_node_failed"),
    }

    Ok(outcome)
  }
}

/// Seeds may only name existing non-transform nodes.
fn validate_seeds(workflow: &Workflow, seeds: &Seeds) -> Result<(), EvalError> {
  for node_id in seeds.node_ids() {
    match workflow.get_node(node_id) {
      None => {
        return Err(invalid_config(node_id, "seed for unknown node".to_string()));
      }
      Some(node) if node.transform_config().is_some() => {
        return Err(invalid_config(
          node_id,
          "transform nodes are computed and cannot be seeded".to_string(),
        ));
      }
      Some(_) => {}
    }
  }
  Ok(())
}

fn invalid_config(node_id: &str, message: String) -> EvalError {
  EvalError::InvalidConfig {
    node_id: node_id.to_string(),
    message,
  }
}
