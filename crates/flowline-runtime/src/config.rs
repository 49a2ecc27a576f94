use std::time::Duration;

use flowline_config::CombineFailurePolicy;
use flowline_script::LuaConfig;
use flowline_transform::TransformOptions;
use serde::{Deserialize, Serialize};

/// Configuration for the runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
  /// Script timeout for code nodes without their own `timeout_ms`.
  pub script_timeout_ms: u64,
  /// Memory ceiling for one script evaluation, in bytes.
  pub script_memory_limit: usize,
  /// Wall-clock limit for a whole run.
  pub run_timeout_ms: Option<u64>,
  /// What a combine node does when one of its sources failed.
  pub combine_failure: CombineFailurePolicy,
  /// Maximum number of node evaluations in flight at once.
  pub max_concurrency: Option<usize>,
}

impl Default for RuntimeConfig {
  fn default() -> Self {
    Self {
      script_timeout_ms: 5_000,
      script_memory_limit: 16 * 1024 * 1024,
      run_timeout_ms: None,
      combine_failure: CombineFailurePolicy::Fail,
      max_concurrency: None,
    }
  }
}

impl RuntimeConfig {
  pub fn run_timeout(&self) -> Option<Duration> {
    self.run_timeout_ms.map(Duration::from_millis)
  }

  /// Concurrency limit, at least one.
  pub(crate) fn concurrency_limit(&self) -> usize {
    self.max_concurrency.map(|n| n.max(1)).unwrap_or(usize::MAX)
  }

  pub(crate) fn transform_options(&self) -> TransformOptions {
    TransformOptions {
      combine_failure: self.combine_failure,
      script_timeout: Duration::from_millis(self.script_timeout_ms),
    }
  }

  pub(crate) fn lua_config(&self) -> LuaConfig {
    LuaConfig {
      memory_limit: self.script_memory_limit,
      ..LuaConfig::default()
    }
  }
}
