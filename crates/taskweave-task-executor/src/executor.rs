//! Task executor implementation.

use std::sync::Arc;
use std::time::Duration;

use taskweave_config::{EngineConfig, Task};
use taskweave_runtime::{Clock, SystemClock, WorkerExecutor, WorkerRequest};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::error::TaskError;
use crate::result::TaskResult;

/// Timing policy for the executor.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorConfig {
  /// Delay after attempt `n` fails is `retry_base_delay * n`.
  pub retry_base_delay: Duration,
  /// Used when a task has no `timeout_ms` of its own.
  pub default_timeout: Duration,
}

impl Default for ExecutorConfig {
  fn default() -> Self {
    Self::from(&EngineConfig::default())
  }
}

impl From<&EngineConfig> for ExecutorConfig {
  fn from(config: &EngineConfig) -> Self {
    Self {
      retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
      default_timeout: Duration::from_millis(config.default_task_timeout_ms),
    }
  }
}

/// Runs tasks against the worker capability.
pub struct TaskExecutor {
  worker: Arc<dyn WorkerExecutor>,
  clock: Arc<dyn Clock>,
  config: ExecutorConfig,
}

impl TaskExecutor {
  pub fn new(worker: Arc<dyn WorkerExecutor>, config: ExecutorConfig) -> Self {
    Self {
      worker,
      clock: Arc::new(SystemClock),
      config,
    }
  }

  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  pub fn config(&self) -> &ExecutorConfig {
    &self.config
  }

  pub fn clock(&self) -> &Arc<dyn Clock> {
    &self.clock
  }

  /// Run a task until it completes, exhausts its attempts, or is cancelled.
  ///
  /// Never returns an error: every outcome is captured in the returned
  /// [`TaskResult`]. Cancellation is terminal and skips any remaining retries.
  #[instrument(
    name = "task_execute",
    skip(self, task, cancel),
    fields(
      task_id = %task.id,
      kind = %task.kind,
    )
  )]
  pub async fn run(&self, task: &Task, cancel: CancellationToken) -> TaskResult {
    let started_at = self.clock.now();
    let timeout = task
      .timeout_ms
      .map(Duration::from_millis)
      .unwrap_or(self.config.default_timeout);
    let max_attempts = task.max_attempts();

    info!(max_attempts, timeout_ms = timeout.as_millis() as u64, "task_started");

    let mut last_error = None;

    for attempt in 1..=max_attempts {
      if cancel.is_cancelled() {
        return self.cancelled(task, attempt, started_at);
      }

      match self.attempt(task, timeout, &cancel).await {
        Ok(value) => {
          info!(attempt, "task_completed");
          return TaskResult::completed(&task.id, value, attempt, started_at, self.clock.now());
        }
        Err(TaskError::Cancelled { .. }) => {
          return self.cancelled(task, attempt, started_at);
        }
        Err(err) => {
          warn!(attempt, max_attempts, error = %err, "task_attempt_failed");
          last_error = Some(err);

          if attempt < max_attempts {
            let delay = self.config.retry_base_delay * attempt;
            tokio::select! {
              biased;
              _ = cancel.cancelled() => return self.cancelled(task, attempt, started_at),
              _ = tokio::time::sleep(delay) => {}
            }
          }
        }
      }
    }

    let error = last_error.unwrap_or_else(|| TaskError::Execution {
      task_id: task.id.clone(),
      message: "no attempt was made".to_string(),
    });
    error!(attempts = max_attempts, error = %error, "task_failed");

    TaskResult::failed(&task.id, error, max_attempts, started_at, self.clock.now())
  }

  /// One attempt: the worker call raced against the deadline and the token.
  async fn attempt(
    &self,
    task: &Task,
    timeout: Duration,
    cancel: &CancellationToken,
  ) -> Result<serde_json::Value, TaskError> {
    let request = WorkerRequest::new(&task.id, &task.kind, task.payload.clone());

    tokio::select! {
      biased;
      _ = cancel.cancelled() => Err(TaskError::Cancelled { task_id: task.id.clone() }),
      outcome = tokio::time::timeout(timeout, self.worker.execute(request)) => match outcome {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(TaskError::Execution {
          task_id: task.id.clone(),
          message: e.to_string(),
        }),
        Err(_) => Err(TaskError::Timeout {
          task_id: task.id.clone(),
          timeout_ms: timeout.as_millis() as u64,
        }),
      },
    }
  }

  fn cancelled(
    &self,
    task: &Task,
    attempt: u32,
    started_at: chrono::DateTime<chrono::Utc>,
  ) -> TaskResult {
    warn!(attempt, "task_cancelled");
    TaskResult::cancelled(
      &task.id,
      TaskError::Cancelled {
        task_id: task.id.clone(),
      },
      attempt,
      Some(started_at),
      self.clock.now(),
    )
  }
}
