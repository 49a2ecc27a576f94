//! A single evaluation pass over a locked workflow.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use flowline_transform::{EvalError, NodeOutcome, TransformEvaluator, TransformInput};
use flowline_workflow::Workflow;
use tokio::task::{Id, JoinError, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, warn};

use crate::config::RuntimeConfig;
use crate::events::{ExecutionEvent, ExecutionNotifier};
use crate::result::{RunResult, RunStatus};
use crate::seeds::Seeds;

type NodeTasks = JoinSet<(String, NodeOutcome)>;
type Joined = Result<(Id, (String, NodeOutcome)), JoinError>;

/// One run: created, executed once, discarded.
///
/// The run loop is the only writer of `outputs`. Spawned node tasks get an
/// owned snapshot of their upstream results and hand back their own result
/// through the join set.
pub(crate) struct Run {
  run_id: String,
  workflow: Arc<Workflow>,
  evaluator: TransformEvaluator,
  notifier: Arc<dyn ExecutionNotifier>,
  cancel: CancellationToken,
  config: RuntimeConfig,
  outputs: HashMap<String, NodeOutcome>,
  in_flight: HashSet<String>,
  task_nodes: HashMap<Id, String>,
}

impl Run {
  /// `cancel` is the caller's token; the run works under a child of it.
  pub(crate) fn new(
    workflow: Arc<Workflow>,
    evaluator: TransformEvaluator,
    notifier: Arc<dyn ExecutionNotifier>,
    config: RuntimeConfig,
    cancel: &CancellationToken,
  ) -> Self {
    Self {
      run_id: uuid::Uuid::new_v4().to_string(),
      workflow,
      evaluator,
      notifier,
      cancel: cancel.child_token(),
      config,
      outputs: HashMap::new(),
      in_flight: HashSet::new(),
      task_nodes: HashMap::new(),
    }
  }

  pub(crate) fn run_id(&self) -> &str {
    &self.run_id
  }

  pub(crate) async fn execute(mut self, seeds: Seeds) -> RunResult {
    info!(
      run_id = %self.run_id,
      workflow_id = %self.workflow.workflow_id,
      seeds = seeds.len(),
      "run_started"
    );
    self.notifier.notify(ExecutionEvent::RunStarted {
      run_id: self.run_id.clone(),
      workflow_id: self.workflow.workflow_id.clone(),
    });

    self.outputs.extend(seeds);

    let deadline = self
      .config
      .run_timeout()
      .and_then(|t| Instant::now().checked_add(t));
    let cancel = self.cancel.clone();
    let mut tasks = NodeTasks::new();

    let status = loop {
      if cancel.is_cancelled() {
        break RunStatus::Cancelled;
      }
      if deadline.is_some_and(|d| Instant::now() >= d) {
        break RunStatus::TimedOut;
      }

      self.schedule_ready(&mut tasks);
      if tasks.is_empty() {
        break RunStatus::Completed;
      }

      tokio::select! {
        biased;

        _ = cancel.cancelled() => break RunStatus::Cancelled,
        _ = expire(deadline) => break RunStatus::TimedOut,
        joined = tasks.join_next_with_id() => {
          if let Some(joined) = joined {
            self.settle(joined);
          }
        }
      }
    };

    match status {
      RunStatus::Completed => {
        info!(
          run_id = %self.run_id,
          results = self.outputs.len(),
          "run_completed"
        );
        self.notifier.notify(ExecutionEvent::RunCompleted {
          run_id: self.run_id.clone(),
        });
      }
      RunStatus::Cancelled | RunStatus::TimedOut => {
        // Stop in-flight scripts and drop whatever they would have written.
        self.cancel.cancel();
        tasks.abort_all();
        warn!(
          run_id = %self.run_id,
          status = ?status,
          abandoned = ?self.in_flight,
          "run_cancelled"
        );
        self.notifier.notify(ExecutionEvent::RunCancelled {
          run_id: self.run_id.clone(),
          status,
        });
      }
    }

    RunResult {
      run_id: self.run_id,
      status,
      outputs: self.outputs,
    }
  }

  /// Start every transform whose upstreams have all settled, up to the
  /// concurrency limit. Short-circuited nodes are recorded without a task,
  /// which can make further nodes ready, so this repeats until stable.
  fn schedule_ready(&mut self, tasks: &mut NodeTasks) {
    let limit = self.config.concurrency_limit();

    loop {
      let mut recorded = false;

      for node_id in self.find_ready_nodes() {
        let workflow = self.workflow.clone();
        let Some(node) = workflow.get_node(&node_id) else {
          continue;
        };
        let Some(config) = node.transform_config() else {
          continue;
        };
        let upstream = workflow.graph().upstream(&node_id);

        let input = TransformInput {
          node_id: &node_id,
          config,
          upstream,
          outputs: &self.outputs,
          timeout_ms: node.timeout_ms,
        };
        if let Some(error) = TransformEvaluator::short_circuit(&input) {
          self.record(node_id, Err(error));
          recorded = true;
          continue;
        }

        if tasks.len() >= limit {
          continue;
        }
        self.spawn_node(tasks, node_id);
      }

      if !recorded {
        break;
      }
    }
  }

  /// Transform nodes without a result, not in flight, whose upstreams all
  /// have results. In topological order.
  fn find_ready_nodes(&self) -> Vec<String> {
    let graph = self.workflow.graph();

    self
      .workflow
      .transform_nodes()
      .map(|(node, _)| &node.node_id)
      .filter(|id| !self.outputs.contains_key(*id) && !self.in_flight.contains(*id))
      .filter(|id| {
        graph
          .upstream(id)
          .iter()
          .all(|up| self.outputs.contains_key(up))
      })
      .cloned()
      .collect()
  }

  fn spawn_node(&mut self, tasks: &mut NodeTasks, node_id: String) {
    let Some(node) = self.workflow.get_node(&node_id) else {
      return;
    };
    let Some(config) = node.transform_config().cloned() else {
      return;
    };
    let timeout_ms = node.timeout_ms;
    let upstream: Vec<String> = self.workflow.graph().upstream(&node_id).to_vec();
    let snapshot: HashMap<String, NodeOutcome> = upstream
      .iter()
      .filter_map(|id| self.outputs.get(id).map(|o| (id.clone(), o.clone())))
      .collect();

    info!(
      run_id = %self.run_id,
      node_id = %node_id,
      transform = config.kind(),
      "node_started"
    );
    self.notifier.notify(ExecutionEvent::NodeStarted {
      run_id: self.run_id.clone(),
      node_id: node_id.clone(),
    });
    self.in_flight.insert(node_id.clone());

    let evaluator = self.evaluator.clone();
    let cancel = self.cancel.clone();
    let span = info_span!("node", run_id = %self.run_id, node_id = %node_id);
    let task_node_id = node_id.clone();

    let handle = tasks.spawn(
      async move {
        let input = TransformInput {
          node_id: &node_id,
          config: &config,
          upstream: &upstream,
          outputs: &snapshot,
          timeout_ms,
        };
        let outcome = evaluator.evaluate(input, &cancel).await;
        (node_id, outcome)
      }
      .instrument(span),
    );
    self.task_nodes.insert(handle.id(), task_node_id);
  }

  /// Record a finished node task. A task that died without returning is
  /// recorded as an internal failure of its node.
  fn settle(&mut self, joined: Joined) {
    match joined {
      Ok((id, (node_id, outcome))) => {
        self.task_nodes.remove(&id);
        self.in_flight.remove(&node_id);
        self.record(node_id, outcome);
      }
      Err(e) => {
        let Some(node_id) = self.task_nodes.remove(&e.id()) else {
          error!(run_id = %self.run_id, error = %e, "unknown node task failed to join");
          return;
        };
        error!(run_id = %self.run_id, node_id = %node_id, error = %e, "node task failed to join");
        self.in_flight.remove(&node_id);
        let error = EvalError::Internal {
          node_id: node_id.clone(),
          message: format!("node task failed: {}", e),
        };
        self.record(node_id, Err(error));
      }
    }
  }

  /// Record a node's result. Each node is written at most once.
  fn record(&mut self, node_id: String, outcome: NodeOutcome) {
    if self.outputs.contains_key(&node_id) {
      warn!(run_id = %self.run_id, node_id = %node_id, "duplicate result discarded");
      return;
    }

    match &outcome {
      Ok(output) => {
        info!(run_id = %self.run_id, node_id = %node_id, output = %output, "node_completed");
        self.notifier.notify(ExecutionEvent::NodeCompleted {
          run_id: self.run_id.clone(),
          node_id: node_id.clone(),
          output: output.clone(),
        });
      }
      Err(e) => {
        error!(
          run_id = %self.run_id,
          node_id = %node_id,
          kind = e.kind(),
          error = %e,
          "node_failed"
        );
        self.notifier.notify(ExecutionEvent::NodeFailed {
          run_id: self.run_id.clone(),
          node_id: node_id.clone(),
          error: e.clone(),
        });
      }
    }

    self.outputs.insert(node_id, outcome);
  }
}

async fn expire(deadline: Option<Instant>) {
  match deadline {
    Some(deadline) => tokio::time::sleep_until(deadline).await,
    None => std::future::pending().await,
  }
}
