//! Pipeline runner.
//!
//! Stages run strictly in order. Each stage becomes one or more tasks on the
//! [`TaskExecutor`], bounded by the stage timeout and the run's cancel token.
//! What happens after a failure is decided by the stage's [`ErrorStrategy`].

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use taskweave_config::{EngineConfig, ErrorStrategy, Pipeline, Stage, StageKind, Task};
use taskweave_runtime::{Clock, IdGenerator, UuidGenerator};
use taskweave_task_executor::{TaskExecutor, TaskResult};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::condition;
use crate::context::PipelineExecutionContext;
use crate::error::{PipelineError, StageError};
use crate::hooks::{NoopHooks, StageHooks};
use crate::result::{PipelineResult, StageResult, StageStatus};

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
  /// Used when a stage has no `timeout_ms` of its own.
  pub default_stage_timeout: Duration,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self::from(&EngineConfig::default())
  }
}

impl From<&EngineConfig> for PipelineConfig {
  fn from(config: &EngineConfig) -> Self {
    Self {
      default_stage_timeout: Duration::from_millis(config.default_stage_timeout_ms),
    }
  }
}

/// Per-run inputs.
pub struct PipelineOptions<'a> {
  /// Exposed to conditions and generic stages as `variables`.
  pub variables: Value,
  pub cancel: CancellationToken,
  pub hooks: &'a dyn StageHooks,
}

impl Default for PipelineOptions<'_> {
  fn default() -> Self {
    Self {
      variables: json!({}),
      cancel: CancellationToken::new(),
      hooks: &NoopHooks,
    }
  }
}

impl<'a> PipelineOptions<'a> {
  pub fn with_variables(mut self, variables: Value) -> Self {
    self.variables = variables;
    self
  }

  pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
    self.cancel = cancel;
    self
  }

  pub fn with_hooks(mut self, hooks: &'a dyn StageHooks) -> Self {
    self.hooks = hooks;
    self
  }
}

pub struct PipelineRunner {
  executor: Arc<TaskExecutor>,
  clock: Arc<dyn Clock>,
  ids: Arc<dyn IdGenerator>,
  config: PipelineConfig,
}

impl PipelineRunner {
  pub fn new(executor: Arc<TaskExecutor>, config: PipelineConfig) -> Self {
    let clock = executor.clock().clone();
    Self {
      executor,
      clock,
      ids: Arc::new(UuidGenerator),
      config,
    }
  }

  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
    self.ids = ids;
    self
  }

  /// Run every stage of `pipeline` in order.
  ///
  /// Only a structurally invalid pipeline is an error. Stage failures are
  /// captured in the returned [`PipelineResult`].
  #[instrument(
    name = "pipeline_execute",
    skip(self, pipeline, options),
    fields(pipeline_id = %pipeline.id)
  )]
  pub async fn execute(
    &self,
    pipeline: &Pipeline,
    options: PipelineOptions<'_>,
  ) -> Result<PipelineResult, PipelineError> {
    pipeline.validate()?;

    let started_at = self.clock.now();
    let mut context =
      PipelineExecutionContext::new(self.ids.next_id(), &pipeline.id, options.variables);

    info!(
      run_id = %context.id,
      total_stages = pipeline.stages.len(),
      "pipeline_started"
    );

    let mut abort = None;

    for (index, stage) in pipeline.stages.iter().enumerate() {
      context.current_stage_index = index;

      if options.cancel.is_cancelled() {
        warn!(stage_id = %stage.id, "pipeline cancelled before stage");
        abort = Some(StageError::Cancelled {
          stage_id: stage.id.clone(),
        });
        break;
      }

      let result = self.run_stage(stage, &context, &options.cancel).await;

      let Some(stage_error) = result.error.clone() else {
        info!(stage_id = %stage.id, duration_ms = result.duration_ms, "stage_completed");
        options.hooks.on_stage_complete(stage, &result);
        context.record(result, true);
        continue;
      };

      warn!(
        stage_id = %stage.id,
        strategy = ?stage.error_strategy,
        error = %stage_error,
        "stage_failed"
      );
      options.hooks.on_stage_error(stage, &result);

      if matches!(stage_error, StageError::Cancelled { .. }) {
        context.record(result, false);
        abort = Some(stage_error);
        break;
      }

      match stage.error_strategy {
        ErrorStrategy::FailFast => {
          context.record(result, true);
          abort = Some(stage_error);
          break;
        }
        ErrorStrategy::Skip => context.record(result, false),
        ErrorStrategy::Continue => context.record(result, true),
      }
    }

    let ended_at = self.clock.now();
    let stages_completed = context
      .stage_results
      .iter()
      .filter(|r| r.status == StageStatus::Completed)
      .count();
    let stages_failed = context.stage_results.len() - stages_completed;
    let success = stages_failed == 0 && abort.is_none();

    match &abort {
      Some(e) => error!(run_id = %context.id, error = %e, "pipeline_aborted"),
      None => info!(
        run_id = %context.id,
        stages_completed,
        stages_failed,
        "pipeline_finished"
      ),
    }

    Ok(PipelineResult {
      pipeline_id: pipeline.id.clone(),
      run_id: context.id,
      success,
      stages_completed,
      stages_failed,
      total_stages: pipeline.stages.len(),
      stage_results: context.stage_results,
      error: abort,
      started_at,
      ended_at,
      duration_ms: elapsed_ms(started_at, ended_at),
    })
  }

  /// Run one stage under its timeout and the run's cancel token.
  async fn run_stage(
    &self,
    stage: &Stage,
    context: &PipelineExecutionContext,
    cancel: &CancellationToken,
  ) -> StageResult {
    let started_at = self.clock.now();
    let timeout = stage
      .timeout_ms
      .map(Duration::from_millis)
      .unwrap_or(self.config.default_stage_timeout);

    // Child token so a timed-out stage also stops its in-flight tasks.
    let stage_cancel = cancel.child_token();

    let outcome = tokio::select! {
      biased;
      _ = cancel.cancelled() => Err(StageError::Cancelled { stage_id: stage.id.clone() }),
      outcome = tokio::time::timeout(timeout, self.dispatch(stage, context, &stage_cancel)) => {
        match outcome {
          Ok(outcome) => outcome,
          Err(_) => Err(StageError::Timeout {
            stage_id: stage.id.clone(),
            timeout_ms: timeout.as_millis() as u64,
          }),
        }
      }
    };
    stage_cancel.cancel();

    let ended_at = self.clock.now();
    let (status, output, error) = match outcome {
      Ok(output) => (StageStatus::Completed, Some(output), None),
      Err(e) => (StageStatus::Failed, None, Some(e)),
    };

    StageResult {
      stage_id: stage.id.clone(),
      kind: stage.kind,
      status,
      output,
      error,
      started_at,
      ended_at,
      duration_ms: elapsed_ms(started_at, ended_at),
    }
  }

  async fn dispatch(
    &self,
    stage: &Stage,
    context: &PipelineExecutionContext,
    cancel: &CancellationToken,
  ) -> Result<Value, StageError> {
    match stage.kind {
      StageKind::Command => {
        let task = Task::new(&stage.id, stage.config.clone()).with_kind("command");
        self.run_task(&stage.id, task, cancel).await
      }
      StageKind::Parallel => self.run_parallel(stage, cancel).await,
      StageKind::Condition => self.run_condition(stage, context, cancel).await,
      StageKind::Generic => {
        self
          .run_generic(&stage.id, &stage.id, &stage.config, context, cancel)
          .await
      }
    }
  }

  async fn run_task(
    &self,
    stage_id: &str,
    task: Task,
    cancel: &CancellationToken,
  ) -> Result<Value, StageError> {
    let result = self.executor.run(&task, cancel.clone()).await;
    into_output(stage_id, result)
  }

  async fn run_generic(
    &self,
    stage_id: &str,
    task_id: &str,
    config: &Value,
    context: &PipelineExecutionContext,
    cancel: &CancellationToken,
  ) -> Result<Value, StageError> {
    let payload = json!({
      "name": stage_id,
      "config": config,
      "context": context.scope(),
    });
    let task = Task::new(task_id, payload).with_kind(StageKind::Generic.as_str());
    self.run_task(stage_id, task, cancel).await
  }

  /// Fan out `config.tasks` and wait for every sub-task to settle.
  async fn run_parallel(&self, stage: &Stage, cancel: &CancellationToken) -> Result<Value, StageError> {
    let configs = stage
      .config
      .get("tasks")
      .and_then(Value::as_array)
      .cloned()
      .unwrap_or_default();

    let tasks: Vec<Task> = configs
      .into_iter()
      .enumerate()
      .map(|(index, payload)| {
        Task::new(format!("{}.{}", stage.id, index), payload).with_kind("command")
      })
      .collect();

    let results = futures::future::join_all(
      tasks
        .iter()
        .map(|task| self.executor.run(task, cancel.child_token())),
    )
    .await;

    let successful_tasks = results.iter().filter(|r| r.is_success()).count();
    let total_tasks = results.len();
    let results = serde_json::to_value(&results).map_err(|e| StageError::Execution {
      stage_id: stage.id.clone(),
      message: format!("failed to encode sub-task results: {}", e),
    })?;

    Ok(json!({
      "results": results,
      "total_tasks": total_tasks,
      "successful_tasks": successful_tasks,
    }))
  }

  /// Evaluate the condition and run the matching branch, if configured.
  async fn run_condition(
    &self,
    stage: &Stage,
    context: &PipelineExecutionContext,
    cancel: &CancellationToken,
  ) -> Result<Value, StageError> {
    let Some(condition) = stage.condition.as_ref() else {
      return Err(StageError::InvalidCondition {
        stage_id: stage.id.clone(),
        message: "no condition configured".to_string(),
      });
    };

    let outcome = condition::evaluate(condition, &context.scope()).map_err(|e| {
      StageError::InvalidCondition {
        stage_id: stage.id.clone(),
        message: e.to_string(),
      }
    })?;

    let branch = if outcome { "on_true" } else { "on_false" };
    let branch_config = stage.config.get(branch).filter(|c| !c.is_null());

    let Some(branch_config) = branch_config else {
      return Ok(json!({ "condition_result": outcome, "executed": false }));
    };

    let task_id = format!("{}.{}", stage.id, branch);
    let output = self
      .run_generic(&stage.id, &task_id, branch_config, context, cancel)
      .await?;

    Ok(json!({
      "condition_result": outcome,
      "executed": true,
      "branch": branch,
      "output": output,
    }))
  }
}

fn into_output(stage_id: &str, result: TaskResult) -> Result<Value, StageError> {
  match result.error {
    Some(error) => Err(StageError::from_task(stage_id, error)),
    None => Ok(result.value.unwrap_or(Value::Null)),
  }
}

fn elapsed_ms(started_at: DateTime<Utc>, ended_at: DateTime<Utc>) -> u64 {
  (ended_at - started_at).num_milliseconds().max(0) as u64
}
