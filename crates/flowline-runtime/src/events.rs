//! Execution events and notifiers for observability.
//!
//! Events are emitted by the run loop as nodes start and settle, so callers
//! can stream progress or assert dependency order in tests.

use flowline_transform::EvalError;
use flowline_value::Value;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::result::RunStatus;

/// Events emitted during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExecutionEvent {
  /// The run passed validation and is about to schedule nodes.
  RunStarted { run_id: String, workflow_id: String },

  /// A transform node was handed to an evaluator.
  NodeStarted { run_id: String, node_id: String },

  /// A transform node produced a value.
  NodeCompleted {
    run_id: String,
    node_id: String,
    output: Value,
  },

  /// A transform node failed or was short-circuited.
  NodeFailed {
    run_id: String,
    node_id: String,
    error: EvalError,
  },

  /// Every reachable node has settled.
  RunCompleted { run_id: String },

  /// The run was cancelled or timed out before settling.
  RunCancelled { run_id: String, status: RunStatus },
}

/// Receives execution events.
///
/// The run loop calls `notify` for each event; implementations decide what
/// to do with them.
pub trait ExecutionNotifier: Send + Sync {
  fn notify(&self, event: ExecutionEvent);
}

/// Discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _event: ExecutionEvent) {}
}

/// Sends events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  sender: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
    Self { sender }
  }

  /// A notifier paired with the receiving end of its channel.
  pub fn channel() -> (Self, mpsc::UnboundedReceiver<ExecutionEvent>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (Self::new(sender), receiver)
  }
}

impl ExecutionNotifier for ChannelNotifier {
  fn notify(&self, event: ExecutionEvent) {
    // Receiver may have been dropped
    let _ = self.sender.send(event);
  }
}
