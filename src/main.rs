use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use taskweave_config::{EngineConfig, ExecutionPlan};
use taskweave_engine::{ExecutionEngine, ExecutionEvent, ExecutionNotifier};
use taskweave_runtime::{CommandWorker, LocalProvisioner};

mod commands;

/// Taskweave - a task and pipeline orchestration engine
#[derive(Parser)]
#[command(name = "taskweave")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.taskweave)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  /// Engine configuration file (default: <data-dir>/config.json when present)
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Execute a plan and print its result as JSON
  Run {
    /// Path to the plan file (JSON)
    plan_file: PathBuf,

    /// Override the per-execution task concurrency
    #[arg(long)]
    max_concurrency: Option<usize>,

    /// Memoize completed task results
    #[arg(long)]
    cache: bool,
  },

  /// Check a plan for errors without running it
  Validate {
    /// Path to the plan file (JSON)
    plan_file: PathBuf,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_target(false)
    .with_writer(std::io::stderr)
    .init();

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".taskweave"),
  };

  match cli.command {
    Some(Commands::Run {
      plan_file,
      max_concurrency,
      cache,
    }) => {
      let mut config = load_config(cli.config.as_deref(), &data_dir)?;
      if let Some(max_concurrency) = max_concurrency {
        config.max_concurrency = max_concurrency;
      }
      if cache {
        config.cache_enabled = true;
      }
      run_plan(plan_file, config, data_dir)?;
    }
    Some(Commands::Validate { plan_file }) => {
      validate_plan(&plan_file)?;
    }
    None => {
      println!("taskweave - use --help to see available commands");
    }
  }

  Ok(())
}

fn load_config(path: Option<&Path>, data_dir: &Path) -> Result<EngineConfig> {
  let path = match path {
    Some(path) => path.to_path_buf(),
    None => {
      let default = data_dir.join("config.json");
      if !default.exists() {
        return Ok(EngineConfig::default());
      }
      default
    }
  };

  let content = std::fs::read_to_string(&path)
    .with_context(|| format!("failed to read config file: {}", path.display()))?;
  serde_json::from_str(&content)
    .with_context(|| format!("failed to parse config file: {}", path.display()))
}

fn read_plan(plan_file: &Path) -> Result<ExecutionPlan> {
  let content = std::fs::read_to_string(plan_file)
    .with_context(|| format!("failed to read plan file: {}", plan_file.display()))?;
  serde_json::from_str(&content)
    .with_context(|| format!("failed to parse plan file: {}", plan_file.display()))
}

fn validate_plan(plan_file: &Path) -> Result<()> {
  let plan = read_plan(plan_file)?;
  plan
    .validate()
    .with_context(|| format!("plan '{}' is invalid", plan.id))?;

  println!(
    "plan '{}' is valid ({} strategy, {} units)",
    plan.id,
    plan.strategy.name(),
    plan.total_units()
  );
  Ok(())
}

fn run_plan(plan_file: PathBuf, config: EngineConfig, data_dir: PathBuf) -> Result<()> {
  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async { run_plan_async(plan_file, config, data_dir).await })
}

async fn run_plan_async(plan_file: PathBuf, config: EngineConfig, data_dir: PathBuf) -> Result<()> {
  let plan = read_plan(&plan_file)?;
  info!(plan_id = %plan.id, strategy = plan.strategy.name(), "plan_loaded");

  let worker = Arc::new(CommandWorker::new(commands::builtin_registry()));
  let provisioner = Arc::new(LocalProvisioner::new(data_dir.join("environments")));
  let engine = ExecutionEngine::with_notifier(config, worker, provisioner, LogNotifier);

  let result = engine
    .execute(&plan)
    .await
    .context("plan execution rejected")?;

  println!("{}", serde_json::to_string_pretty(&result)?);

  if !result.success {
    anyhow::bail!(
      "execution {} finished {:?}",
      result.execution_id,
      result.metadata.final_status
    );
  }
  Ok(())
}

/// Writes every execution event to the log.
struct LogNotifier;

impl ExecutionNotifier for LogNotifier {
  fn notify(&self, event: ExecutionEvent) {
    match event {
      ExecutionEvent::ExecutionStarted {
        execution_id,
        strategy,
        ..
      } => info!(%execution_id, %strategy, "execution_started"),
      ExecutionEvent::TaskCompleted {
        execution_id,
        result,
      } => info!(%execution_id, task_id = %result.task_id, attempts = result.attempts, "task_completed"),
      ExecutionEvent::TaskFailed {
        execution_id,
        result,
      } => warn!(
        %execution_id,
        task_id = %result.task_id,
        status = ?result.status,
        error = ?result.error.as_ref().map(ToString::to_string),
        "task_failed"
      ),
      ExecutionEvent::StageCompleted {
        execution_id,
        result,
      } => info!(%execution_id, stage_id = %result.stage_id, status = ?result.status, "stage_completed"),
      ExecutionEvent::ExecutionCompleted {
        execution_id,
        duration_ms,
        ..
      } => info!(%execution_id, duration_ms, "execution_completed"),
      ExecutionEvent::ExecutionFailed {
        execution_id,
        final_status,
        error,
      } => warn!(%execution_id, ?final_status, %error, "execution_failed"),
      ExecutionEvent::ExecutionCancelled { execution_id } => {
        warn!(%execution_id, "execution_cancelled")
      }
    }
  }
}
