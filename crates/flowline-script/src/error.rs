//! Script error types.

/// Errors that can occur while evaluating a script.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScriptError {
  /// The script raised an error or failed to compile.
  #[error("script failed: {message}")]
  Runtime { message: String },

  /// The script ran past its deadline.
  #[error("script timed out after {timeout_ms}ms")]
  Timeout { timeout_ms: u64 },

  /// The evaluation was cancelled by its owner.
  #[error("script cancelled")]
  Cancelled,

  /// The script exceeded its memory ceiling.
  #[error("script exceeded memory limit of {limit} bytes")]
  MemoryLimit { limit: usize },

  /// The script finished without returning a value.
  #[error("script did not return a value")]
  NoReturn,

  /// The returned value has no JSON representation.
  #[error("script returned an unrepresentable value: {message}")]
  Unrepresentable { message: String },

  /// The sandbox could not be set up.
  #[error("failed to initialize script sandbox: {message}")]
  Sandbox { message: String },
}
