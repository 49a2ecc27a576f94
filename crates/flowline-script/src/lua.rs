use std::time::{Duration, Instant};

use async_trait::async_trait;
use flowline_value::Value;
use mlua::{HookTriggers, Lua, LuaOptions, MultiValue, StdLib, VmState};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::convert::{Marshaller, to_lua};
use crate::error::ScriptError;
use crate::evaluator::ScriptEvaluator;

/// Base library globals removed before user code runs.
const BLOCKED_GLOBALS: &[&str] = &[
  "print",
  "load",
  "loadfile",
  "dofile",
  "collectgarbage",
  "pcall",
  "xpcall",
  "require",
];

/// Extra wait past the script timeout before the caller gives up on the
/// blocking thread.
const TIMEOUT_GRACE: Duration = Duration::from_millis(250);

/// Resource limits for the Lua sandbox.
#[derive(Debug, Clone)]
pub struct LuaConfig {
  /// Memory ceiling for one Lua state, in bytes.
  pub memory_limit: usize,
  /// Number of VM instructions between deadline/cancellation checks.
  pub instruction_interval: u32,
}

impl Default for LuaConfig {
  fn default() -> Self {
    Self {
      memory_limit: 16 * 1024 * 1024,
      instruction_interval: 1000,
    }
  }
}

/// Script evaluator backed by a fresh Lua 5.4 state per evaluation.
///
/// Only the `table`, `string`, `math` and `utf8` libraries are loaded, so
/// scripts have no io, os, package or debug access.
#[derive(Debug, Clone, Default)]
pub struct LuaEvaluator {
  config: LuaConfig,
}

impl LuaEvaluator {
  pub fn new(config: LuaConfig) -> Self {
    Self { config }
  }

  pub fn config(&self) -> &LuaConfig {
    &self.config
  }
}

#[async_trait]
impl ScriptEvaluator for LuaEvaluator {
  #[instrument(
    name = "script_evaluate",
    skip(self, code, input, cancel),
    fields(timeout_ms = timeout.as_millis() as u64)
  )]
  async fn evaluate(
    &self,
    code: &str,
    input: &Value,
    timeout: Duration,
    cancel: &CancellationToken,
  ) -> Result<Value, ScriptError> {
    if cancel.is_cancelled() {
      return Err(ScriptError::Cancelled);
    }

    let timeout_ms = timeout.as_millis() as u64;
    let job = SandboxJob {
      code: code.to_string(),
      input: input.clone(),
      config: self.config.clone(),
      deadline: Instant::now().checked_add(timeout),
      timeout_ms,
      cancel: cancel.clone(),
    };

    let handle = tokio::task::spawn_blocking(move || job.run());

    tokio::select! {
      joined = handle => match joined {
        Ok(result) => {
          debug!(ok = result.is_ok(), "script_finished");
          result
        }
        Err(e) => Err(ScriptError::Runtime {
          message: format!("script thread failed: {}", e),
        }),
      },
      _ = tokio::time::sleep(timeout.saturating_add(TIMEOUT_GRACE)) => {
        warn!(timeout_ms, "script did not yield after its deadline");
        Err(ScriptError::Timeout { timeout_ms })
      }
      _ = cancel.cancelled() => Err(ScriptError::Cancelled),
    }
  }
}

/// One evaluation, moved onto a blocking thread.
struct SandboxJob {
  code: String,
  input: Value,
  config: LuaConfig,
  deadline: Option<Instant>,
  timeout_ms: u64,
  cancel: CancellationToken,
}

impl SandboxJob {
  fn run(self) -> Result<Value, ScriptError> {
    let lua = create_sandbox(&self.config)?;

    let hook_cancel = self.cancel.clone();
    let deadline = self.deadline;
    let _ = lua.set_hook(
      HookTriggers::new().every_nth_instruction(self.config.instruction_interval.max(1)),
      move |_lua, _debug| {
        if hook_cancel.is_cancelled() {
          return Err(mlua::Error::runtime("script cancelled"));
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
          return Err(mlua::Error::runtime("script timed out"));
        }
        Ok(VmState::Continue)
      },
    );

    let input = to_lua(&lua, &self.input).map_err(|e| self.classify(e))?;
    lua
      .globals()
      .set("input", input)
      .map_err(|e| self.classify(e))?;

    let returned: MultiValue = lua
      .load(self.code.as_str())
      .set_name("transform")
      .call(())
      .map_err(|e| self.classify(e))?;

    match returned.into_iter().next() {
      Some(value) => Marshaller::new().from_lua(&value),
      None => Err(ScriptError::NoReturn),
    }
  }

  /// Map a Lua failure onto the error the caller should see. Interruptions
  /// raised by the hook surface as runtime errors, so the token and the
  /// deadline are checked first.
  fn classify(&self, error: mlua::Error) -> ScriptError {
    if self.cancel.is_cancelled() {
      return ScriptError::Cancelled;
    }
    if self.deadline.is_some_and(|d| Instant::now() >= d) {
      return ScriptError::Timeout {
        timeout_ms: self.timeout_ms,
      };
    }
    match error {
      mlua::Error::MemoryError(_) => ScriptError::MemoryLimit {
        limit: self.config.memory_limit,
      },
      other => ScriptError::Runtime {
        message: first_line(&other.to_string()),
      },
    }
  }
}

fn create_sandbox(config: &LuaConfig) -> Result<Lua, ScriptError> {
  let libs = StdLib::TABLE | StdLib::STRING | StdLib::MATH | StdLib::UTF8;
  let lua = Lua::new_with(libs, LuaOptions::new()).map_err(sandbox_error)?;
  lua
    .set_memory_limit(config.memory_limit)
    .map_err(sandbox_error)?;

  {
    let globals = lua.globals();
    for name in BLOCKED_GLOBALS {
      globals
        .raw_set(*name, mlua::Value::Nil)
        .map_err(sandbox_error)?;
    }
  }

  Ok(lua)
}

fn sandbox_error(error: mlua::Error) -> ScriptError {
  ScriptError::Sandbox {
    message: error.to_string(),
  }
}

/// Lua error strings carry a stack traceback after the first line.
fn first_line(message: &str) -> String {
  message.lines().next().unwrap_or_default().trim().to_string()
}
