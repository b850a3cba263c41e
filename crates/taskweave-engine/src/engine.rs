//! Plan execution engine.
//!
//! The `ExecutionEngine` accepts an [`ExecutionPlan`], provisions an
//! environment for it and drives it with the strategy the plan names.
//! Sequential and parallel plans run through a per-execution [`Scheduler`]
//! that shares the engine's result cache. Pipeline plans run through the
//! [`PipelineRunner`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::json;
use taskweave_config::{EngineConfig, ExecutionPlan, Pipeline, PlanStrategy, Stage, Task};
use taskweave_pipeline::{
  PipelineConfig, PipelineOptions, PipelineResult, PipelineRunner, StageError, StageHooks,
  StageResult,
};
use taskweave_runtime::{
  Clock, EnvironmentProvisioner, IdGenerator, SystemClock, UuidGenerator, WorkerExecutor,
};
use taskweave_scheduler::{CacheStats, ResultCache, Scheduler, SchedulerConfig};
use taskweave_task_executor::{ExecutorConfig, TaskError, TaskExecutor, TaskResult, TaskStatus};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::context::{ContextMetrics, ExecutionContext};
use crate::error::EngineError;
use crate::events::{ExecutionEvent, ExecutionNotifier, NoopNotifier};
use crate::metrics::{ExecutionMetrics, MetricsAggregator};
use crate::result::{ExecutionMetadata, ExecutionResult, FinalStatus};

/// The plan execution engine.
///
/// Generic over `N: ExecutionNotifier` to allow different notification
/// strategies. Use `ExecutionEngine::new()` for an engine that discards
/// events, or `ExecutionEngine::with_notifier()` to provide a notifier.
pub struct ExecutionEngine<N: ExecutionNotifier = NoopNotifier> {
  config: EngineConfig,
  worker: Arc<dyn WorkerExecutor>,
  executor: Arc<TaskExecutor>,
  pipeline: PipelineRunner,
  provisioner: Arc<dyn EnvironmentProvisioner>,
  cache: Arc<ResultCache>,
  metrics: MetricsAggregator,
  notifier: N,
  clock: Arc<dyn Clock>,
  ids: Arc<dyn IdGenerator>,
  active: AtomicUsize,
  executions: Mutex<HashMap<String, Running>>,
  shutdown: CancellationToken,
}

impl ExecutionEngine<NoopNotifier> {
  /// Create an engine that discards events.
  pub fn new(
    config: EngineConfig,
    worker: Arc<dyn WorkerExecutor>,
    provisioner: Arc<dyn EnvironmentProvisioner>,
  ) -> Self {
    Self::with_notifier(config, worker, provisioner, NoopNotifier)
  }
}

impl<N: ExecutionNotifier> ExecutionEngine<N> {
  pub fn with_notifier(
    config: EngineConfig,
    worker: Arc<dyn WorkerExecutor>,
    provisioner: Arc<dyn EnvironmentProvisioner>,
    notifier: N,
  ) -> Self {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let ids: Arc<dyn IdGenerator> = Arc::new(UuidGenerator);
    let (executor, pipeline) = build_runners(&config, &worker, &clock, &ids);

    Self {
      cache: Arc::new(ResultCache::new(config.cache_enabled)),
      metrics: MetricsAggregator::new(Duration::from_millis(config.throughput_window_ms)),
      config,
      worker,
      executor,
      pipeline,
      provisioner,
      notifier,
      clock,
      ids,
      active: AtomicUsize::new(0),
      executions: Mutex::new(HashMap::new()),
      shutdown: CancellationToken::new(),
    }
  }

  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self.rebuild_runners();
    self
  }

  /// Ids for executions and pipeline runs.
  pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
    self.ids = ids;
    self.rebuild_runners();
    self
  }

  fn rebuild_runners(&mut self) {
    let (executor, pipeline) = build_runners(&self.config, &self.worker, &self.clock, &self.ids);
    self.executor = executor;
    self.pipeline = pipeline;
  }

  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  pub fn notifier(&self) -> &N {
    &self.notifier
  }

  /// Execute a plan to completion.
  ///
  /// Rejects only when the engine is at capacity or terminated. Invalid
  /// plans, provisioning failures and failed tasks all produce an `Ok`
  /// result with `success == false`.
  #[instrument(
    name = "plan_execute",
    skip(self, plan),
    fields(plan_id = %plan.id, strategy = plan.strategy.name())
  )]
  pub async fn execute(&self, plan: &ExecutionPlan) -> Result<ExecutionResult, EngineError> {
    if self.shutdown.is_cancelled() {
      return Err(EngineError::Terminated);
    }

    if let PlanStrategy::Parallel { tasks } = &plan.strategy {
      if tasks.len() > self.config.max_queue_size {
        return Err(EngineError::Capacity {
          resource: "queue size",
          limit: self.config.max_queue_size,
        });
      }
    }

    let _slot = self.reserve_slot()?;
    let execution_id = self.ids.next_id();
    let cancel = self.shutdown.child_token();
    let _registration = self.register(&execution_id, cancel.clone());
    let started_at = self.clock.now();

    info!(execution_id = %execution_id, "execution_started");
    self.notifier.notify(ExecutionEvent::ExecutionStarted {
      execution_id: execution_id.clone(),
      plan_id: plan.id.clone(),
      strategy: plan.strategy.name().to_string(),
    });

    if let Err(e) = plan.validate() {
      warn!(execution_id = %execution_id, error = %e, "plan_invalid");
      return Ok(self.reject(plan, execution_id, started_at, e.to_string()));
    }

    let environment = match self.provisioner.create().await {
      Ok(environment) => environment,
      Err(e) => {
        error!(execution_id = %execution_id, error = %e, "environment_provision_failed");
        return Ok(self.reject(plan, execution_id, started_at, e.to_string()));
      }
    };

    let mut context = ExecutionContext::new(
      execution_id,
      &plan.id,
      plan.total_units(),
      environment,
      started_at,
      cancel,
    );
    context.transition(TaskStatus::Running);

    let (failure, pipeline) = match &plan.strategy {
      PlanStrategy::Sequential { tasks, fail_fast } => {
        (self.run_sequential(&mut context, tasks, *fail_fast).await, None)
      }
      PlanStrategy::Parallel { tasks } => (self.run_parallel(&mut context, tasks).await, None),
      PlanStrategy::Pipeline { pipeline } => self.run_pipeline(&mut context, pipeline).await,
    };

    if let Err(e) = self.provisioner.cleanup(context.environment.clone()).await {
      warn!(
        execution_id = %context.id,
        environment_id = %context.environment.id,
        error = %e,
        "environment_cleanup_failed"
      );
    }

    Ok(self.finish(plan, context, failure, pipeline))
  }

  /// Tasks in listed order. With `fail_fast` the first failure leaves the
  /// rest un-run.
  async fn run_sequential(
    &self,
    context: &mut ExecutionContext,
    tasks: &[Task],
    fail_fast: bool,
  ) -> Option<String> {
    let scheduler = self.scheduler(context);
    let mut statuses = HashMap::new();

    for task in tasks {
      if context.cancel.is_cancelled() {
        return Some(format!("execution cancelled before task '{}'", task.id));
      }

      let result = match readiness(task, &statuses) {
        Readiness::Ready => self.submit(&scheduler, task).await,
        Readiness::Waiting(dependency) | Readiness::Blocked(dependency) => {
          self.skipped(task, dependency)
        }
      };

      self.notify_task(&context.id, &result);
      statuses.insert(task.id.clone(), result.status);
      let failure = if result.is_success() {
        None
      } else {
        result.error.as_ref().map(ToString::to_string)
      };
      context.record(result);

      if let (true, Some(message)) = (fail_fast, failure) {
        info!(execution_id = %context.id, task_id = %task.id, "fail_fast_triggered");
        return Some(message);
      }
    }

    None
  }

  /// Tasks in dependency waves. Every task in a wave has all of its
  /// dependencies completed; a task whose dependency did not complete is
  /// resolved as cancelled without running.
  async fn run_parallel(&self, context: &mut ExecutionContext, tasks: &[Task]) -> Option<String> {
    let scheduler = self.scheduler(context);
    let mut statuses: HashMap<String, TaskStatus> = HashMap::new();
    let mut settled: HashMap<String, TaskResult> = HashMap::new();
    let mut pending: Vec<&Task> = tasks.iter().collect();

    while !pending.is_empty() {
      let mut wave = Vec::new();
      let mut waiting = Vec::new();
      let mut blocked = 0;

      for task in pending {
        match readiness(task, &statuses) {
          Readiness::Ready => wave.push(task),
          Readiness::Waiting(_) => waiting.push(task),
          Readiness::Blocked(dependency) => {
            let result = self.skipped(task, dependency);
            self.settle(&context.id, result, &mut statuses, &mut settled);
            blocked += 1;
          }
        }
      }

      if wave.is_empty() && blocked == 0 {
        // Unreachable for a validated plan.
        for task in waiting {
          let result = self.lost(task, "dependencies can never be satisfied");
          self.settle(&context.id, result, &mut statuses, &mut settled);
        }
        break;
      }

      if context.cancel.is_cancelled() {
        for task in wave {
          let result = self.cancelled(task);
          self.settle(&context.id, result, &mut statuses, &mut settled);
        }
      } else if !wave.is_empty() {
        debug!(execution_id = %context.id, tasks = wave.len(), "dispatching_wave");

        match scheduler.submit_all(wave.iter().map(|task| (*task).clone()).collect()) {
          Ok(handles) => {
            let results = futures::future::join_all(handles.into_iter().map(|h| h.wait())).await;
            for (task, result) in wave.iter().zip(results) {
              let result = result.unwrap_or_else(|e| self.lost(task, &e.to_string()));
              self.settle(&context.id, result, &mut statuses, &mut settled);
            }
          }
          Err(e) => {
            error!(execution_id = %context.id, error = %e, "wave_rejected");
            for task in wave {
              let result = self.lost(task, &e.to_string());
              self.settle(&context.id, result, &mut statuses, &mut settled);
            }
          }
        }
      }

      pending = waiting;
    }

    for task in tasks {
      if let Some(result) = settled.remove(&task.id) {
        context.record(result);
      }
    }

    None
  }

  /// Stages through the pipeline runner. Each stage result becomes one
  /// task result.
  async fn run_pipeline(
    &self,
    context: &mut ExecutionContext,
    pipeline: &Pipeline,
  ) -> (Option<String>, Option<PipelineResult>) {
    let hooks = StageEvents {
      notifier: &self.notifier,
      execution_id: context.id.clone(),
    };
    let variables = json!({
      "execution_id": context.id,
      "environment_id": context.environment.id,
      "working_directory": context.environment.working_directory,
    });
    let options = PipelineOptions::default()
      .with_variables(variables)
      .with_cancel(context.cancel.clone())
      .with_hooks(&hooks);

    match self.pipeline.execute(pipeline, options).await {
      Ok(result) => {
        for stage in &result.stage_results {
          context.record(stage_to_task(stage));
        }
        (result.error.as_ref().map(ToString::to_string), Some(result))
      }
      Err(e) => (Some(e.to_string()), None),
    }
  }

  fn finish(
    &self,
    plan: &ExecutionPlan,
    mut context: ExecutionContext,
    failure: Option<String>,
    pipeline: Option<PipelineResult>,
  ) -> ExecutionResult {
    let ended_at = self.clock.now();
    let duration_ms = elapsed_ms(context.started_at, ended_at);

    let next = if context.all_completed() {
      TaskStatus::Completed
    } else if context.cancel.is_cancelled() {
      TaskStatus::Cancelled
    } else {
      TaskStatus::Failed
    };
    context.transition(next);

    let metrics = context.metrics;
    let success = context.status == TaskStatus::Completed;
    let final_status = FinalStatus::from_counts(metrics.tasks_completed, metrics.total_tasks);
    let error = if success {
      None
    } else {
      Some(failure.unwrap_or_else(|| summarize_failure(&context)))
    };

    self
      .metrics
      .record(success, duration_ms, metrics.tasks_completed, metrics.tasks_failed);

    match (context.status, &error) {
      (TaskStatus::Completed, _) => {
        info!(execution_id = %context.id, duration_ms, "execution_completed");
        self.notifier.notify(ExecutionEvent::ExecutionCompleted {
          execution_id: context.id.clone(),
          final_status,
          duration_ms,
        });
      }
      (TaskStatus::Cancelled, _) => {
        warn!(execution_id = %context.id, "execution_cancelled");
        self.notifier.notify(ExecutionEvent::ExecutionCancelled {
          execution_id: context.id.clone(),
        });
      }
      (_, error) => {
        let error = error.clone().unwrap_or_default();
        error!(execution_id = %context.id, ?final_status, error = %error, "execution_failed");
        self.notifier.notify(ExecutionEvent::ExecutionFailed {
          execution_id: context.id.clone(),
          final_status,
          error,
        });
      }
    }

    ExecutionResult {
      execution_id: context.id,
      plan_id: context.plan_id,
      success,
      status: context.status,
      results: context.results,
      metrics,
      pipeline,
      error,
      metadata: ExecutionMetadata {
        strategy: plan.strategy.name().to_string(),
        final_status,
        started_at: context.started_at,
        ended_at,
        duration_ms,
        environment_id: Some(context.environment.id),
      },
    }
  }

  /// Result for a plan that never got to run.
  fn reject(
    &self,
    plan: &ExecutionPlan,
    execution_id: String,
    started_at: DateTime<Utc>,
    error: String,
  ) -> ExecutionResult {
    let ended_at = self.clock.now();
    let duration_ms = elapsed_ms(started_at, ended_at);

    self.metrics.record(false, duration_ms, 0, 0);
    self.notifier.notify(ExecutionEvent::ExecutionFailed {
      execution_id: execution_id.clone(),
      final_status: FinalStatus::Failed,
      error: error.clone(),
    });

    ExecutionResult {
      execution_id,
      plan_id: plan.id.clone(),
      success: false,
      status: TaskStatus::Failed,
      results: Vec::new(),
      metrics: ContextMetrics {
        total_tasks: plan.total_units(),
        ..ContextMetrics::default()
      },
      pipeline: None,
      error: Some(error),
      metadata: ExecutionMetadata {
        strategy: plan.strategy.name().to_string(),
        final_status: FinalStatus::Failed,
        started_at,
        ended_at,
        duration_ms,
        environment_id: None,
      },
    }
  }

  /// The per-run scheduler, registered so `cancel_task` can reach it.
  fn scheduler(&self, context: &ExecutionContext) -> Scheduler {
    let scheduler = Scheduler::with_cancel_token(
      self.executor.clone(),
      self.cache.clone(),
      SchedulerConfig::from(&self.config),
      context.cancel.clone(),
    );
    if let Some(running) = self.lock_executions().get_mut(&context.id) {
      running.scheduler = Some(scheduler.clone());
    }
    scheduler
  }

  async fn submit(&self, scheduler: &Scheduler, task: &Task) -> TaskResult {
    match scheduler.submit(task.clone()).await {
      Ok(result) => result,
      Err(e) => self.lost(task, &e.to_string()),
    }
  }

  fn settle(
    &self,
    execution_id: &str,
    result: TaskResult,
    statuses: &mut HashMap<String, TaskStatus>,
    settled: &mut HashMap<String, TaskResult>,
  ) {
    self.notify_task(execution_id, &result);
    statuses.insert(result.task_id.clone(), result.status);
    settled.insert(result.task_id.clone(), result);
  }

  fn notify_task(&self, execution_id: &str, result: &TaskResult) {
    let event = if result.is_success() {
      ExecutionEvent::TaskCompleted {
        execution_id: execution_id.to_string(),
        result: result.clone(),
      }
    } else {
      ExecutionEvent::TaskFailed {
        execution_id: execution_id.to_string(),
        result: result.clone(),
      }
    };
    self.notifier.notify(event);
  }

  fn skipped(&self, task: &Task, dependency: &str) -> TaskResult {
    debug!(task_id = %task.id, dependency, "task_skipped");
    TaskResult::cancelled(
      &task.id,
      TaskError::DependencyFailed {
        task_id: task.id.clone(),
        dependency: dependency.to_string(),
      },
      1,
      None,
      self.clock.now(),
    )
  }

  fn cancelled(&self, task: &Task) -> TaskResult {
    TaskResult::cancelled(
      &task.id,
      TaskError::Cancelled {
        task_id: task.id.clone(),
      },
      1,
      None,
      self.clock.now(),
    )
  }

  fn lost(&self, task: &Task, message: &str) -> TaskResult {
    let now = self.clock.now();
    TaskResult::failed(
      &task.id,
      TaskError::Execution {
        task_id: task.id.clone(),
        message: message.to_string(),
      },
      1,
      now,
      now,
    )
  }

  fn reserve_slot(&self) -> Result<ActiveSlot<'_>, EngineError> {
    let limit = self.config.max_concurrent_executions;
    self
      .active
      .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < limit).then_some(n + 1))
      .map_err(|_| EngineError::Capacity {
        resource: "concurrent executions",
        limit,
      })?;
    Ok(ActiveSlot {
      active: &self.active,
    })
  }

  fn register(&self, execution_id: &str, cancel: CancellationToken) -> Registration<'_> {
    self.lock_executions().insert(
      execution_id.to_string(),
      Running {
        cancel,
        scheduler: None,
      },
    );
    Registration {
      executions: &self.executions,
      execution_id: execution_id.to_string(),
    }
  }

  fn lock_executions(&self) -> MutexGuard<'_, HashMap<String, Running>> {
    lock(&self.executions)
  }

  /// Cancel one running execution. Returns false for an unknown id.
  pub fn cancel(&self, execution_id: &str) -> bool {
    match self.lock_executions().get(execution_id) {
      Some(running) => {
        info!(execution_id = %execution_id, "execution_cancel_requested");
        running.cancel.cancel();
        true
      }
      None => false,
    }
  }

  /// Cancel one task of a running sequential or parallel execution.
  ///
  /// Returns false when the execution is unknown, runs a pipeline, or has no
  /// queued or running task with that id.
  pub fn cancel_task(&self, execution_id: &str, task_id: &str) -> bool {
    let scheduler = self
      .lock_executions()
      .get(execution_id)
      .and_then(|running| running.scheduler.clone());
    match scheduler {
      Some(scheduler) => scheduler.cancel(task_id),
      None => false,
    }
  }

  /// Cancel every running execution. New executions are still accepted.
  pub fn cancel_all(&self) {
    for running in self.lock_executions().values() {
      running.cancel.cancel();
    }
  }

  /// Cancel everything and reject all further executions.
  pub fn terminate(&self) {
    info!("engine_terminated");
    self.shutdown.cancel();
  }

  pub fn is_terminated(&self) -> bool {
    self.shutdown.is_cancelled()
  }

  pub fn metrics(&self) -> ExecutionMetrics {
    self.metrics.snapshot()
  }

  pub fn reset_metrics(&self) {
    self.metrics.reset();
  }

  pub fn clear_cache(&self) {
    self.cache.clear();
  }

  pub fn cache_stats(&self) -> CacheStats {
    self.cache.stats()
  }

  pub fn active_executions(&self) -> usize {
    self.active.load(Ordering::SeqCst)
  }
}

fn build_runners(
  config: &EngineConfig,
  worker: &Arc<dyn WorkerExecutor>,
  clock: &Arc<dyn Clock>,
  ids: &Arc<dyn IdGenerator>,
) -> (Arc<TaskExecutor>, PipelineRunner) {
  let executor = Arc::new(
    TaskExecutor::new(worker.clone(), ExecutorConfig::from(config)).with_clock(clock.clone()),
  );
  let pipeline = PipelineRunner::new(executor.clone(), PipelineConfig::from(config))
    .with_clock(clock.clone())
    .with_id_generator(ids.clone());
  (executor, pipeline)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex
    .lock()
    .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Holds one of the `max_concurrent_executions` slots.
struct ActiveSlot<'a> {
  active: &'a AtomicUsize,
}

impl Drop for ActiveSlot<'_> {
  fn drop(&mut self) {
    self.active.fetch_sub(1, Ordering::SeqCst);
  }
}

/// Cancellation handles of one in-flight execution.
struct Running {
  cancel: CancellationToken,
  scheduler: Option<Scheduler>,
}

/// Keeps an execution's handles reachable by id while it runs.
struct Registration<'a> {
  executions: &'a Mutex<HashMap<String, Running>>,
  execution_id: String,
}

impl Drop for Registration<'_> {
  fn drop(&mut self) {
    lock(self.executions).remove(&self.execution_id);
  }
}

enum Readiness<'a> {
  Ready,
  /// A dependency has not settled yet.
  Waiting(&'a str),
  /// A dependency settled without completing.
  Blocked(&'a str),
}

fn readiness<'a>(task: &'a Task, statuses: &HashMap<String, TaskStatus>) -> Readiness<'a> {
  let mut waiting = None;
  for dependency in &task.dependencies {
    match statuses.get(dependency) {
      Some(TaskStatus::Completed) => {}
      Some(_) => return Readiness::Blocked(dependency),
      None => waiting = waiting.or(Some(dependency.as_str())),
    }
  }
  match waiting {
    Some(dependency) => Readiness::Waiting(dependency),
    None => Readiness::Ready,
  }
}

/// Emits a `StageCompleted` event for every settled stage.
struct StageEvents<'a, N> {
  notifier: &'a N,
  execution_id: String,
}

impl<N: ExecutionNotifier> StageEvents<'_, N> {
  fn emit(&self, result: &StageResult) {
    self.notifier.notify(ExecutionEvent::StageCompleted {
      execution_id: self.execution_id.clone(),
      result: result.clone(),
    });
  }
}

impl<N: ExecutionNotifier> StageHooks for StageEvents<'_, N> {
  fn on_stage_complete(&self, _stage: &Stage, result: &StageResult) {
    self.emit(result);
  }

  fn on_stage_error(&self, _stage: &Stage, result: &StageResult) {
    self.emit(result);
  }
}

fn stage_to_task(stage: &StageResult) -> TaskResult {
  let task_id = stage.stage_id.clone();
  let error = stage.error.as_ref().map(|e| match e {
    StageError::Timeout { timeout_ms, .. } => TaskError::Timeout {
      task_id: task_id.clone(),
      timeout_ms: *timeout_ms,
    },
    StageError::Cancelled { .. } => TaskError::Cancelled {
      task_id: task_id.clone(),
    },
    StageError::Execution { message, .. } => TaskError::Execution {
      task_id: task_id.clone(),
      message: message.clone(),
    },
    StageError::InvalidCondition { .. } => TaskError::Execution {
      task_id: task_id.clone(),
      message: e.to_string(),
    },
  });

  match error {
    None => TaskResult::completed(
      task_id,
      stage.output.clone().unwrap_or(serde_json::Value::Null),
      1,
      stage.started_at,
      stage.ended_at,
    ),
    Some(cancelled @ TaskError::Cancelled { .. }) => {
      TaskResult::cancelled(task_id, cancelled, 1, Some(stage.started_at), stage.ended_at)
    }
    Some(error) => TaskResult::failed(task_id, error, 1, stage.started_at, stage.ended_at),
  }
}

fn summarize_failure(context: &ExecutionContext) -> String {
  if let Some(error) = context.results.iter().find_map(|r| r.error.as_ref()) {
    return error.to_string();
  }
  if context.cancel.is_cancelled() {
    return "execution cancelled".to_string();
  }
  format!(
    "{} of {} tasks did not complete",
    context.metrics.total_tasks - context.metrics.tasks_completed,
    context.metrics.total_tasks
  )
}

fn elapsed_ms(started_at: DateTime<Utc>, ended_at: DateTime<Utc>) -> u64 {
  (ended_at - started_at).num_milliseconds().max(0) as u64
}
