//! Integration tests for the Lua script evaluator.

use std::time::{Duration, Instant};

use flowline_script::{LuaConfig, LuaEvaluator, ScriptError, ScriptEvaluator};
use flowline_value::Value;
use serde_json::json;
use tokio_util::sync::CancellationToken;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

fn create_evaluator() -> LuaEvaluator {
  LuaEvaluator::new(LuaConfig::default())
}

async fn evaluate(code: &str, input: serde_json::Value) -> Result<Value, ScriptError> {
  create_evaluator()
    .evaluate(
      code,
      &Value::from(input),
      DEFAULT_TIMEOUT,
      &CancellationToken::new(),
    )
    .await
}

#[tokio::test]
async fn test_returns_object_built_from_input() {
  let result = evaluate(
    "return { greeting = 'Hi ' .. input.name, next = input.age + 1 }",
    json!({ "name": "Ada", "age": 36 }),
  )
  .await
  .expect("script failed");

  assert_eq!(
    result,
    Value::from(json!({ "greeting": "Hi Ada", "next": 37 }))
  );
}

#[tokio::test]
async fn test_maps_over_input_array() {
  let code = r#"
    local names = {}
    for i, user in ipairs(input.users) do
      names[i] = string.upper(user.name)
    end
    return names
  "#;
  let result = evaluate(
    code,
    json!({ "users": [{ "name": "ada" }, { "name": "grace" }] }),
  )
  .await
  .expect("script failed");

  assert_eq!(result, Value::from(json!(["ADA", "GRACE"])));
}

#[tokio::test]
async fn test_object_keys_are_sorted() {
  let result = evaluate("return { b = 1, a = 2, c = 3 }", json!(null))
    .await
    .expect("script failed");

  assert_eq!(result.to_json_string(), r#"{"a":2,"b":1,"c":3}"#);
}

#[tokio::test]
async fn test_empty_table_is_empty_object() {
  let result = evaluate("return {}", json!(null)).await.expect("script failed");
  assert_eq!(result, Value::from(json!({})));
}

#[tokio::test]
async fn test_sparse_table_is_object_with_string_keys() {
  let result = evaluate("return { [1] = 'a', [3] = 'c' }", json!(null))
    .await
    .expect("script failed");
  assert_eq!(result, Value::from(json!({ "1": "a", "3": "c" })));
}

#[tokio::test]
async fn test_identity_keeps_arrays_with_nulls() {
  let input = json!({
    "items": [1, null, 3],
    "trailing": ["a", null],
    "one": [null],
    "empty": []
  });
  let result = evaluate("return input", input.clone())
    .await
    .expect("script failed");

  assert_eq!(result, Value::from(input));
}

#[tokio::test]
async fn test_growing_an_input_array_keeps_it_an_array() {
  let result = evaluate(
    "input.items[#input.items + 1] = 4 return input.items",
    json!({ "items": [1, 2, 3] }),
  )
  .await
  .expect("script failed");

  assert_eq!(result, Value::from(json!([1, 2, 3, 4])));
}

#[tokio::test]
async fn test_nil_return_is_null() {
  let result = evaluate("return nil", json!({})).await.expect("script failed");
  assert_eq!(result, Value::Null);
}

#[tokio::test]
async fn test_scalar_input_and_return() {
  let result = evaluate("return input * 2", json!(21)).await.expect("script failed");
  assert_eq!(result, Value::Number(42.0));
}

#[tokio::test]
async fn test_missing_return_is_error() {
  let result = evaluate("local x = 1", json!({})).await;
  assert_eq!(result, Err(ScriptError::NoReturn));
}

#[tokio::test]
async fn test_thrown_error_is_runtime_error() {
  let result = evaluate("error('boom')", json!({})).await;
  match result {
    Err(ScriptError::Runtime { message }) => assert!(message.contains("boom"), "{}", message),
    other => panic!("expected runtime error, got {:?}", other),
  }
}

#[tokio::test]
async fn test_syntax_error_is_runtime_error() {
  let result = evaluate("return {", json!({})).await;
  assert!(matches!(result, Err(ScriptError::Runtime { .. })));
}

#[tokio::test]
async fn test_indexing_nil_is_runtime_error() {
  let result = evaluate("return input.missing.deeper", json!({})).await;
  assert!(matches!(result, Err(ScriptError::Runtime { .. })));
}

#[tokio::test]
async fn test_host_libraries_are_unavailable() {
  let result = evaluate(
    "return os == nil and io == nil and load == nil and require == nil and package == nil and debug == nil",
    json!({}),
  )
  .await
  .expect("script failed");
  assert_eq!(result, Value::Bool(true));

  let result = evaluate("return os.execute('ls')", json!({})).await;
  assert!(matches!(result, Err(ScriptError::Runtime { .. })));

  let result = evaluate("return pcall(error, 'x')", json!({})).await;
  assert!(matches!(result, Err(ScriptError::Runtime { .. })));
}

#[tokio::test]
async fn test_function_return_is_unrepresentable() {
  let result = evaluate("return function() end", json!({})).await;
  assert!(matches!(result, Err(ScriptError::Unrepresentable { .. })));
}

#[tokio::test]
async fn test_cyclic_table_is_unrepresentable() {
  let result = evaluate("local t = {} t.self = t return t", json!({})).await;
  assert!(matches!(result, Err(ScriptError::Unrepresentable { .. })));
}

#[tokio::test]
async fn test_non_finite_number_is_unrepresentable() {
  let result = evaluate("return 0 / 0", json!({})).await;
  assert!(matches!(result, Err(ScriptError::Unrepresentable { .. })));
}

#[tokio::test]
async fn test_infinite_loop_times_out() {
  let start = Instant::now();
  let result = create_evaluator()
    .evaluate(
      "while true do end",
      &Value::Null,
      Duration::from_millis(100),
      &CancellationToken::new(),
    )
    .await;

  assert_eq!(result, Err(ScriptError::Timeout { timeout_ms: 100 }));
  assert!(start.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_memory_limit() {
  let evaluator = LuaEvaluator::new(LuaConfig {
    memory_limit: 1024 * 1024,
    ..LuaConfig::default()
  });
  let result = evaluator
    .evaluate(
      "return string.rep('x', 8 * 1024 * 1024)",
      &Value::Null,
      DEFAULT_TIMEOUT,
      &CancellationToken::new(),
    )
    .await;

  assert_eq!(
    result,
    Err(ScriptError::MemoryLimit {
      limit: 1024 * 1024
    })
  );
}

#[tokio::test]
async fn test_unbounded_recursion_fails() {
  let result = evaluate(
    "local function f(n) return f(n + 1) + 1 end return f(1)",
    json!({}),
  )
  .await;
  assert!(matches!(
    result,
    Err(ScriptError::Runtime { .. }) | Err(ScriptError::MemoryLimit { .. })
  ));
}

#[tokio::test]
async fn test_cancellation_stops_running_script() {
  let cancel = CancellationToken::new();
  let trigger = cancel.clone();
  tokio::spawn(async move {
    tokio::time::sleep(Duration::from_millis(50)).await;
    trigger.cancel();
  });

  let start = Instant::now();
  let result = create_evaluator()
    .evaluate("while true do end", &Value::Null, DEFAULT_TIMEOUT, &cancel)
    .await;

  assert_eq!(result, Err(ScriptError::Cancelled));
  assert!(start.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_already_cancelled_token() {
  let cancel = CancellationToken::new();
  cancel.cancel();
  let result = create_evaluator()
    .evaluate("return 1", &Value::Null, DEFAULT_TIMEOUT, &cancel)
    .await;
  assert_eq!(result, Err(ScriptError::Cancelled));
}

#[tokio::test]
async fn test_evaluations_are_isolated() {
  let evaluator = create_evaluator();
  let cancel = CancellationToken::new();

  evaluator
    .evaluate("leaked = 1 return 0", &Value::Null, DEFAULT_TIMEOUT, &cancel)
    .await
    .expect("script failed");
  let result = evaluator
    .evaluate("return leaked == nil", &Value::Null, DEFAULT_TIMEOUT, &cancel)
    .await
    .expect("script failed");

  assert_eq!(result, Value::Bool(true));
}
