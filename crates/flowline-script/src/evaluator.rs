use std::time::Duration;

use async_trait::async_trait;
use flowline_value::Value;
use tokio_util::sync::CancellationToken;

use crate::error::ScriptError;

/// Evaluates a script body against an input value.
///
/// Implementations must not give scripts access to the host (filesystem,
/// network, processes), must stop within `timeout` or promptly after
/// `cancel` fires, and must report every fault as a [`ScriptError`].
#[async_trait]
pub trait ScriptEvaluator: Send + Sync {
  async fn evaluate(
    &self,
    code: &str,
    input: &Value,
    timeout: Duration,
    cancel: &CancellationToken,
  ) -> Result<Value, ScriptError>;
}
