use std::collections::HashMap;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use flowline_config::{CombineFailurePolicy, WorkflowDef};
use flowline_runtime::{NodeOutcome, Runtime, RuntimeConfig, Seeds};
use flowline_value::Value;

/// Flowline - data-flow resolution for workflow transform nodes
#[derive(Parser)]
#[command(name = "flowline")]
#[command(version, about, long_about = None)]
struct Cli {
  #[command(flatten)]
  runtime: RuntimeArgs,

  #[command(subcommand)]
  command: Option<Commands>,
}

/// Runtime settings. Flags override values from `--config`.
#[derive(Args)]
struct RuntimeArgs {
  /// Path to a runtime config file (JSON)
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  /// Default script timeout for code transforms, in milliseconds
  #[arg(long, global = true)]
  script_timeout_ms: Option<u64>,

  /// Wall-clock limit for a whole run, in milliseconds
  #[arg(long, global = true)]
  run_timeout_ms: Option<u64>,

  /// How combine transforms treat a failed source node
  #[arg(long, global = true, value_enum)]
  combine_failure: Option<CombineFailureArg>,

  /// Maximum number of node evaluations in flight
  #[arg(long, global = true)]
  max_concurrency: Option<usize>,
}

#[derive(Clone, Copy, ValueEnum)]
enum CombineFailureArg {
  Fail,
  Null,
}

impl From<CombineFailureArg> for CombineFailurePolicy {
  fn from(arg: CombineFailureArg) -> Self {
    match arg {
      CombineFailureArg::Fail => CombineFailurePolicy::Fail,
      CombineFailureArg::Null => CombineFailurePolicy::Null,
    }
  }
}

#[derive(Subcommand)]
enum Commands {
  /// Run a workflow or a single node
  Run {
    #[command(subcommand)]
    target: RunTarget,
  },

  /// Validate a workflow and print its evaluation order
  Validate {
    /// Path to the workflow file (JSON)
    workflow_file: PathBuf,
  },
}

#[derive(Subcommand)]
enum RunTarget {
  /// Run an entire workflow
  Workflow {
    /// Path to the workflow file (JSON)
    workflow_file: PathBuf,

    /// Seed outputs as a JSON object of node_id -> value (default: stdin)
    #[arg(long)]
    seeds: Option<PathBuf>,
  },

  /// Run a single transform node from a workflow
  Node {
    /// Path to the workflow file (JSON)
    workflow_file: PathBuf,

    /// The node ID to evaluate
    #[arg(long)]
    node: String,
  },
}

fn main() -> Result<()> {
  init_tracing();

  let cli = Cli::parse();

  match cli.command {
    Some(Commands::Run { target }) => {
      let config = load_runtime_config(&cli.runtime)?;
      let rt = tokio::runtime::Runtime::new()?;
      match target {
        RunTarget::Workflow {
          workflow_file,
          seeds,
        } => rt.block_on(run_workflow(workflow_file, seeds, config))?,
        RunTarget::Node {
          workflow_file,
          node,
        } => rt.block_on(run_node(workflow_file, node, config))?,
      }
    }
    Some(Commands::Validate { workflow_file }) => validate(workflow_file)?,
    None => {
      println!("flowline - use --help to see available commands");
    }
  }

  Ok(())
}

fn init_tracing() {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

  tracing_subscriber::registry()
    .with(filter)
    .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
    .init();
}

fn load_runtime_config(args: &RuntimeArgs) -> Result<RuntimeConfig> {
  let mut config = match &args.config {
    Some(path) => {
      let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
      serde_json::from_str(&content)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?
    }
    None => RuntimeConfig::default(),
  };

  if let Some(ms) = args.script_timeout_ms {
    config.script_timeout_ms = ms;
  }
  if let Some(ms) = args.run_timeout_ms {
    config.run_timeout_ms = Some(ms);
  }
  if let Some(policy) = args.combine_failure {
    config.combine_failure = policy.into();
  }
  if let Some(n) = args.max_concurrency {
    config.max_concurrency = Some(n);
  }

  Ok(config)
}

fn read_workflow(workflow_file: &Path) -> Result<WorkflowDef> {
  let content = std::fs::read_to_string(workflow_file)
    .with_context(|| format!("failed to read workflow file: {}", workflow_file.display()))?;

  serde_json::from_str(&content)
    .with_context(|| format!("failed to parse workflow file: {}", workflow_file.display()))
}

async fn run_workflow(
  workflow_file: PathBuf,
  seeds_file: Option<PathBuf>,
  config: RuntimeConfig,
) -> Result<()> {
  let workflow_def = read_workflow(&workflow_file)?;
  eprintln!("Loaded workflow: {}", workflow_def.name);

  let payload = match seeds_file {
    Some(path) => {
      let content = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read seeds file: {}", path.display()))?;
      serde_json::from_str(&content)
        .with_context(|| format!("failed to parse seeds file: {}", path.display()))?
    }
    None => read_payload_from_stdin()?,
  };
  let seeds: Seeds = parse_seed_object(payload)?.into_iter().collect();

  let runtime = Runtime::new(workflow_def, config);
  let result = runtime
    .invoke(seeds, shutdown_token())
    .await
    .context("workflow rejected")?;

  eprintln!("Run {}: {:?}", result.run_id, result.status);
  eprintln!("Nodes recorded: {}", result.outputs.len());

  let json = serde_json::to_value(&result)?;
  println!("{}", serde_json::to_string_pretty(&json["outputs"])?);

  Ok(())
}

async fn run_node(workflow_file: PathBuf, node_id: String, config: RuntimeConfig) -> Result<()> {
  let workflow_def = read_workflow(&workflow_file)?;
  let runtime = Runtime::new(workflow_def, config);
  let workflow = runtime.validate().context("workflow rejected")?;

  let upstream = workflow.graph().upstream(&node_id).to_vec();
  eprintln!("Running node: {} (upstream: {})", node_id, upstream.join(", "));

  // A single upstream takes the payload as-is; several expect an object
  // keyed by upstream node id.
  let payload = Value::from(read_payload_from_stdin()?);
  let seeds: Seeds = match upstream.as_slice() {
    [only] => Seeds::new().with_output(only.clone(), payload),
    _ => parse_seed_object(payload.to_json())?.into_iter().collect(),
  };

  let outcome = runtime
    .invoke_node(&node_id, seeds, shutdown_token())
    .await
    .context("node rejected")?;

  println!("{}", serde_json::to_string_pretty(&outcome_json(&outcome)?)?);

  Ok(())
}

fn validate(workflow_file: PathBuf) -> Result<()> {
  let workflow_def = read_workflow(&workflow_file)?;
  let runtime = Runtime::new(workflow_def, RuntimeConfig::default());
  let workflow = runtime.validate().context("workflow is invalid")?;

  eprintln!("Workflow '{}' is valid", workflow.name);
  for node_id in workflow.topological_order() {
    println!("{}", node_id);
  }

  Ok(())
}

fn parse_seed_object(payload: serde_json::Value) -> Result<HashMap<String, Value>> {
  match payload {
    serde_json::Value::Object(map) => Ok(
      map
        .into_iter()
        .map(|(node_id, value)| (node_id, Value::from(value)))
        .collect(),
    ),
    other => bail!("seeds must be a JSON object of node_id -> value, got {}", other),
  }
}

fn outcome_json(outcome: &NodeOutcome) -> Result<serde_json::Value> {
  Ok(match outcome {
    Ok(value) => serde_json::json!({ "ok": value.to_json() }),
    Err(error) => serde_json::json!({ "error": serde_json::to_value(error)? }),
  })
}

/// A token cancelled on Ctrl-C.
fn shutdown_token() -> CancellationToken {
  let cancel = CancellationToken::new();
  let on_signal = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      tracing::warn!("interrupted, cancelling run");
      on_signal.cancel();
    }
  });
  cancel
}

fn read_payload_from_stdin() -> Result<serde_json::Value> {
  use std::io::IsTerminal;

  if io::stdin().is_terminal() {
    // No stdin pipe, use empty object
    Ok(serde_json::json!({}))
  } else {
    let mut input = String::new();
    io::stdin()
      .read_to_string(&mut input)
      .context("failed to read payload from stdin")?;

    if input.trim().is_empty() {
      Ok(serde_json::json!({}))
    } else {
      serde_json::from_str(&input).context("failed to parse payload JSON from stdin")
    }
  }
}
