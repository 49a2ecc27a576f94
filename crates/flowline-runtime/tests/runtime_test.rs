//! Integration tests for Runtime::invoke and Runtime::invoke_node.

use std::sync::Arc;
use std::time::{Duration, Instant};

use flowline_config::{CombineFailurePolicy, CombineField, Edge, NodeDef, NodeType, TransformConfig, WorkflowDef};
use flowline_runtime::{
  ChannelNotifier, EvalError, ExecutionEvent, RunStatus, Runtime, RuntimeConfig, Seeds,
};
use flowline_value::Value;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn create_extract(node_id: &str, path: &str) -> NodeDef {
  NodeDef::transform(
    node_id,
    TransformConfig::Extract {
      path: path.to_string(),
    },
  )
}

fn create_template(node_id: &str, template: &str) -> NodeDef {
  NodeDef::transform(
    node_id,
    TransformConfig::Template {
      template: template.to_string(),
    },
  )
}

fn create_code(node_id: &str, code: &str) -> NodeDef {
  NodeDef::transform(
    node_id,
    TransformConfig::Code {
      code: code.to_string(),
    },
  )
}

fn create_combine(node_id: &str, fields: Vec<CombineField>) -> NodeDef {
  NodeDef::transform(node_id, TransformConfig::Combine { fields })
}

fn create_resource(node_id: &str) -> NodeDef {
  NodeDef::new(
    node_id,
    NodeType::ResourceCall {
      resource: "test/resource".to_string(),
    },
  )
}

fn create_workflow(nodes: Vec<NodeDef>, edges: &[(&str, &str)]) -> WorkflowDef {
  WorkflowDef {
    workflow_id: "test-workflow".to_string(),
    name: "Test Workflow".to_string(),
    nodes,
    edges: edges.iter().map(|(from, to)| Edge::new(*from, *to)).collect(),
  }
}

fn seeds(entries: &[(&str, serde_json::Value)]) -> Seeds {
  entries
    .iter()
    .map(|(id, value)| (id.to_string(), Value::from(value.clone())))
    .collect()
}

fn drain(receiver: &mut mpsc::UnboundedReceiver<ExecutionEvent>) -> Vec<ExecutionEvent> {
  let mut events = Vec::new();
  while let Ok(event) = receiver.try_recv() {
    events.push(event);
  }
  events
}

fn position(events: &[ExecutionEvent], matches: impl Fn(&ExecutionEvent) -> bool) -> usize {
  events
    .iter()
    .position(matches)
    .expect("event not emitted")
}

fn started(node: &str) -> impl Fn(&ExecutionEvent) -> bool + '_ {
  move |event: &ExecutionEvent| matches!(event, ExecutionEvent::NodeStarted { node_id, .. } if node_id == node)
}

fn settled(node: &str) -> impl Fn(&ExecutionEvent) -> bool + '_ {
  move |event: &ExecutionEvent| {
    matches!(
      event,
      ExecutionEvent::NodeCompleted { node_id, .. } | ExecutionEvent::NodeFailed { node_id, .. }
        if node_id == node
    )
  }
}

#[tokio::test]
async fn test_trigger_to_extract() {
  let workflow = create_workflow(
    vec![NodeDef::trigger("trigger"), create_extract("name", "name")],
    &[("trigger", "name")],
  );
  let runtime = Runtime::new(workflow, RuntimeConfig::default());

  let result = runtime
    .invoke(seeds(&[("trigger", json!({ "name": "Ada" }))]), CancellationToken::new())
    .await
    .expect("invoke failed");

  assert_eq!(result.status, RunStatus::Completed);
  assert_eq!(result.output("name"), Some(&Ok(Value::from("Ada"))));
  assert_eq!(result.outputs.len(), 2);
}

#[tokio::test]
async fn test_combine_two_sources() {
  let workflow = create_workflow(
    vec![
      NodeDef::trigger("a"),
      NodeDef::trigger("b"),
      create_combine(
        "combine",
        vec![CombineField::new("x", "a", "x"), CombineField::new("y", "b", "y")],
      ),
    ],
    &[("a", "combine"), ("b", "combine")],
  );
  let runtime = Runtime::new(workflow, RuntimeConfig::default());

  let result = runtime
    .invoke(
      seeds(&[("a", json!({ "x": 1 })), ("b", json!({ "y": 2 }))]),
      CancellationToken::new(),
    )
    .await
    .expect("invoke failed");

  assert_eq!(
    result.value("combine"),
    Some(&Value::from(json!({ "x": 1, "y": 2 })))
  );
}

#[tokio::test]
async fn test_chain_runs_in_dependency_order() {
  let workflow = create_workflow(
    vec![
      create_extract("c", "value"),
      create_code("b", "return { value = input.n * 2 }"),
      NodeDef::trigger("a"),
    ],
    &[("a", "b"), ("b", "c")],
  );
  let (notifier, mut receiver) = ChannelNotifier::channel();
  let runtime = Runtime::new(workflow, RuntimeConfig::default()).with_notifier(Arc::new(notifier));

  let result = runtime
    .invoke(seeds(&[("a", json!({ "n": 21 }))]), CancellationToken::new())
    .await
    .expect("invoke failed");
  assert_eq!(result.value("c"), Some(&Value::Number(42.0)));

  let events = drain(&mut receiver);
  assert!(matches!(events.first(), Some(ExecutionEvent::RunStarted { .. })));
  assert!(matches!(events.last(), Some(ExecutionEvent::RunCompleted { .. })));
  assert!(position(&events, settled("b")) < position(&events, started("c")));
  assert!(position(&events, started("b")) < position(&events, settled("b")));
}

#[tokio::test]
async fn test_cycle_rejects_run() {
  let workflow = create_workflow(
    vec![
      NodeDef::trigger("t"),
      create_extract("a", "x"),
      create_extract("b", "x"),
    ],
    &[("t", "a"), ("a", "b"), ("b", "a")],
  );
  let (notifier, mut receiver) = ChannelNotifier::channel();
  let runtime = Runtime::new(workflow, RuntimeConfig::default()).with_notifier(Arc::new(notifier));

  let result = runtime
    .invoke(seeds(&[("t", json!({}))]), CancellationToken::new())
    .await;

  match result {
    Err(EvalError::CyclicGraph { cycle }) => {
      assert!(cycle.contains(&"a".to_string()));
      assert!(cycle.contains(&"b".to_string()));
    }
    other => panic!("expected cyclic graph error, got {:?}", other),
  }
  assert!(drain(&mut receiver).is_empty());
}

#[tokio::test]
async fn test_missing_upstream_rejects_run() {
  let workflow = create_workflow(vec![create_extract("lonely", "x")], &[]);
  let runtime = Runtime::new(workflow, RuntimeConfig::default());

  let result = runtime.invoke(Seeds::new(), CancellationToken::new()).await;
  assert_eq!(
    result,
    Err(EvalError::MissingUpstream {
      node_id: "lonely".to_string(),
      source_node_id: None,
    })
  );
}

#[tokio::test]
async fn test_seeding_transform_is_invalid() {
  let workflow = create_workflow(
    vec![NodeDef::trigger("t"), create_extract("pick", "x")],
    &[("t", "pick")],
  );
  let runtime = Runtime::new(workflow, RuntimeConfig::default());

  let result = runtime
    .invoke(
      seeds(&[("t", json!({})), ("pick", json!(1))]),
      CancellationToken::new(),
    )
    .await;
  assert!(matches!(result, Err(EvalError::InvalidConfig { node_id, .. }) if node_id == "pick"));

  let result = runtime
    .invoke(seeds(&[("ghost", json!(1))]), CancellationToken::new())
    .await;
  assert!(matches!(result, Err(EvalError::InvalidConfig { node_id, .. }) if node_id == "ghost"));
}

#[tokio::test]
async fn test_repeated_runs_are_identical() {
  let workflow = create_workflow(
    vec![
      NodeDef::trigger("t"),
      create_template("greeting", "Hello {{ input.name }}"),
      create_code("shout", "return string.upper(input)"),
    ],
    &[("t", "greeting"), ("greeting", "shout")],
  );
  let runtime = Runtime::new(workflow, RuntimeConfig::default());
  let input = seeds(&[("t", json!({ "name": "Ada" }))]);

  let first = runtime
    .invoke(input.clone(), CancellationToken::new())
    .await
    .expect("invoke failed");
  let second = runtime
    .invoke(input, CancellationToken::new())
    .await
    .expect("invoke failed");

  assert_eq!(first.outputs, second.outputs);
  assert_ne!(first.run_id, second.run_id);
  assert_eq!(first.value("shout"), Some(&Value::from("HELLO ADA")));
}

#[tokio::test]
async fn test_failed_upstream_vs_null_upstream() {
  let workflow = create_workflow(
    vec![
      create_resource("failing"),
      create_resource("empty"),
      create_extract("from_failing", "x"),
      create_extract("from_empty", "x"),
      create_extract("downstream", "y"),
    ],
    &[
      ("failing", "from_failing"),
      ("empty", "from_empty"),
      ("from_failing", "downstream"),
    ],
  );
  let runtime = Runtime::new(workflow, RuntimeConfig::default());
  let seeds = Seeds::new()
    .with_failure("failing", "timeout calling resource")
    .with_output("empty", Value::Null);

  let result = runtime
    .invoke(seeds, CancellationToken::new())
    .await
    .expect("invoke failed");

  assert_eq!(
    result.error("from_failing"),
    Some(&EvalError::UpstreamFailed {
      node_id: "from_failing".to_string(),
      upstream_id: "failing".to_string(),
    })
  );
  assert_eq!(
    result.error("downstream"),
    Some(&EvalError::UpstreamFailed {
      node_id: "downstream".to_string(),
      upstream_id: "from_failing".to_string(),
    })
  );
  assert_eq!(result.output("from_empty"), Some(&Ok(Value::Null)));
}

#[tokio::test]
async fn test_script_failure_does_not_abort_siblings() {
  let workflow = create_workflow(
    vec![
      NodeDef::trigger("t"),
      create_code("broken", "error('nope')"),
      create_extract("fine", "v"),
    ],
    &[("t", "broken"), ("t", "fine")],
  );
  let runtime = Runtime::new(workflow, RuntimeConfig::default());

  let result = runtime
    .invoke(seeds(&[("t", json!({ "v": true }))]), CancellationToken::new())
    .await
    .expect("invoke failed");

  assert!(matches!(result.error("broken"), Some(EvalError::ScriptError { .. })));
  assert_eq!(result.value("fine"), Some(&Value::Bool(true)));
}

#[tokio::test]
async fn test_combine_failure_policies() {
  let workflow = create_workflow(
    vec![
      NodeDef::trigger("a"),
      create_resource("b"),
      create_combine(
        "merge",
        vec![CombineField::new("x", "a", "x"), CombineField::new("y", "b", "y")],
      ),
    ],
    &[("a", "merge"), ("b", "merge")],
  );
  let seeds = Seeds::new()
    .with_output("a", Value::from(json!({ "x": 1 })))
    .with_failure("b", "down");

  let strict = Runtime::new(workflow.clone(), RuntimeConfig::default());
  let result = strict
    .invoke(seeds.clone(), CancellationToken::new())
    .await
    .expect("invoke failed");
  assert_eq!(
    result.error("merge"),
    Some(&EvalError::CombineSourceFailed {
      node_id: "merge".to_string(),
      field_name: "y".to_string(),
      source_node_id: "b".to_string(),
    })
  );

  let lenient = Runtime::new(
    workflow,
    RuntimeConfig {
      combine_failure: CombineFailurePolicy::Null,
      ..RuntimeConfig::default()
    },
  );
  let result = lenient
    .invoke(seeds, CancellationToken::new())
    .await
    .expect("invoke failed");
  assert_eq!(
    result.value("merge"),
    Some(&Value::from(json!({ "x": 1, "y": null })))
  );
}

#[tokio::test]
async fn test_unseeded_node_blocks_dependents() {
  let workflow = create_workflow(
    vec![
      NodeDef::trigger("t"),
      create_resource("never"),
      create_extract("blocked", "x"),
      create_extract("runs", "x"),
    ],
    &[("never", "blocked"), ("t", "runs")],
  );
  let runtime = Runtime::new(workflow, RuntimeConfig::default());

  let result = runtime
    .invoke(seeds(&[("t", json!({ "x": 1 }))]), CancellationToken::new())
    .await
    .expect("invoke failed");

  assert_eq!(result.status, RunStatus::Completed);
  assert!(result.output("blocked").is_none());
  assert!(result.output("never").is_none());
  assert_eq!(result.value("runs"), Some(&Value::Number(1.0)));
}

#[tokio::test]
async fn test_cancelled_before_start_records_nothing() {
  let workflow = create_workflow(
    vec![NodeDef::trigger("t"), create_extract("pick", "x")],
    &[("t", "pick")],
  );
  let runtime = Runtime::new(workflow, RuntimeConfig::default());
  let cancel = CancellationToken::new();
  cancel.cancel();

  let result = runtime
    .invoke(seeds(&[("t", json!({ "x": 1 }))]), cancel)
    .await
    .expect("invoke failed");

  assert_eq!(result.status, RunStatus::Cancelled);
  assert!(result.output("pick").is_none());
}

#[tokio::test]
async fn test_cancel_during_run_discards_in_flight() {
  let workflow = create_workflow(
    vec![
      NodeDef::trigger("t"),
      create_code("spin", "while true do end"),
      create_extract("after", "x"),
    ],
    &[("t", "spin"), ("spin", "after")],
  );
  let (notifier, mut receiver) = ChannelNotifier::channel();
  let runtime = Runtime::new(
    workflow,
    RuntimeConfig {
      script_timeout_ms: 30_000,
      ..RuntimeConfig::default()
    },
  )
  .with_notifier(Arc::new(notifier));

  let cancel = CancellationToken::new();
  let trigger = cancel.clone();
  tokio::spawn(async move {
    tokio::time::sleep(Duration::from_millis(100)).await;
    trigger.cancel();
  });

  let start = Instant::now();
  let result = runtime
    .invoke(seeds(&[("t", json!({}))]), cancel)
    .await
    .expect("invoke failed");

  assert_eq!(result.status, RunStatus::Cancelled);
  assert!(result.output("spin").is_none());
  assert!(result.output("after").is_none());
  assert!(start.elapsed() < Duration::from_secs(5));

  let events = drain(&mut receiver);
  assert!(matches!(
    events.last(),
    Some(ExecutionEvent::RunCancelled {
      status: RunStatus::Cancelled,
      ..
    })
  ));
}

#[tokio::test]
async fn test_run_timeout() {
  let workflow = create_workflow(
    vec![
      NodeDef::trigger("t"),
      create_code("spin", "while true do end"),
      create_extract("quick", "x"),
    ],
    &[("t", "spin"), ("t", "quick")],
  );
  let runtime = Runtime::new(
    workflow,
    RuntimeConfig {
      script_timeout_ms: 30_000,
      run_timeout_ms: Some(150),
      ..RuntimeConfig::default()
    },
  );

  let result = runtime
    .invoke(seeds(&[("t", json!({ "x": "done" }))]), CancellationToken::new())
    .await
    .expect("invoke failed");

  assert_eq!(result.status, RunStatus::TimedOut);
  assert!(result.output("spin").is_none());
  assert_eq!(result.value("quick"), Some(&Value::from("done")));
}

#[tokio::test]
async fn test_max_concurrency_one_completes_diamond() {
  let workflow = create_workflow(
    vec![
      NodeDef::trigger("t"),
      create_code("left", "return input.n + 1"),
      create_code("right", "return input.n + 2"),
      create_combine(
        "join",
        vec![CombineField::new("l", "left", ""), CombineField::new("r", "right", "")],
      ),
    ],
    &[("t", "left"), ("t", "right"), ("left", "join"), ("right", "join")],
  );
  let (notifier, mut receiver) = ChannelNotifier::channel();
  let runtime = Runtime::new(
    workflow,
    RuntimeConfig {
      max_concurrency: Some(1),
      ..RuntimeConfig::default()
    },
  )
  .with_notifier(Arc::new(notifier));

  let result = runtime
    .invoke(seeds(&[("t", json!({ "n": 1 }))]), CancellationToken::new())
    .await
    .expect("invoke failed");

  assert_eq!(
    result.value("join"),
    Some(&Value::from(json!({ "l": 2, "r": 3 })))
  );

  // With one slot, a node never starts while another is unsettled.
  let events = drain(&mut receiver);
  let left_started = position(&events, started("left"));
  let right_started = position(&events, started("right"));
  let (first, second) = if left_started < right_started {
    ("left", "right")
  } else {
    ("right", "left")
  };
  assert!(position(&events, settled(first)) < position(&events, started(second)));
}

#[tokio::test]
async fn test_node_timeout_override() {
  let mut spin = create_code("spin", "while true do end");
  spin.timeout_ms = Some(100);
  let workflow = create_workflow(vec![NodeDef::trigger("t"), spin], &[("t", "spin")]);
  let runtime = Runtime::new(workflow, RuntimeConfig::default());

  let start = Instant::now();
  let result = runtime
    .invoke(seeds(&[("t", json!({}))]), CancellationToken::new())
    .await
    .expect("invoke failed");

  match result.error("spin") {
    Some(EvalError::ScriptError { message, .. }) => assert!(message.contains("timed out"), "{}", message),
    other => panic!("expected script timeout, got {:?}", other),
  }
  assert!(start.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn test_invoke_node() {
  let workflow = create_workflow(
    vec![
      NodeDef::trigger("a"),
      NodeDef::trigger("b"),
      create_combine(
        "merge",
        vec![CombineField::new("x", "a", "x"), CombineField::new("y", "b", "")],
      ),
    ],
    &[("a", "merge"), ("b", "merge")],
  );
  let runtime = Runtime::new(workflow, RuntimeConfig::default());

  let outcome = runtime
    .invoke_node(
      "merge",
      seeds(&[("a", json!({ "x": "one" })), ("b", json!([2]))]),
      CancellationToken::new(),
    )
    .await
    .expect("invoke_node failed");
  assert_eq!(outcome, Ok(Value::from(json!({ "x": "one", "y": [2] }))));

  let missing = runtime
    .invoke_node("merge", seeds(&[("a", json!({}))]), CancellationToken::new())
    .await;
  assert!(matches!(missing, Err(EvalError::InvalidConfig { .. })));

  let not_transform = runtime
    .invoke_node("a", Seeds::new(), CancellationToken::new())
    .await;
  assert!(matches!(not_transform, Err(EvalError::InvalidConfig { .. })));
}
