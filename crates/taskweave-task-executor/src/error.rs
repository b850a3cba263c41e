//! Task execution errors.

use serde::{Deserialize, Serialize};

/// Broad classification shared by task and stage errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
  Validation,
  Capacity,
  Timeout,
  Execution,
  Cancellation,
}

/// Why a task did not complete.
///
/// Captured into [`TaskResult`](crate::TaskResult) rather than returned, so it
/// carries owned strings and is serializable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskError {
  /// The attempt exceeded its deadline and was abandoned.
  #[error("task '{task_id}' timed out after {timeout_ms}ms")]
  Timeout { task_id: String, timeout_ms: u64 },

  /// The worker reported a failure.
  #[error("task '{task_id}' failed: {message}")]
  Execution { task_id: String, message: String },

  /// The task was cancelled before it could finish.
  #[error("task '{task_id}' cancelled")]
  Cancelled { task_id: String },

  /// A dependency did not complete, so the task never ran.
  #[error("task '{task_id}' skipped: dependency '{dependency}' did not complete")]
  DependencyFailed { task_id: String, dependency: String },
}

impl TaskError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      TaskError::Timeout { .. } => ErrorKind::Timeout,
      TaskError::Execution { .. } => ErrorKind::Execution,
      TaskError::Cancelled { .. } | TaskError::DependencyFailed { .. } => ErrorKind::Cancellation,
    }
  }

  /// Only timeouts and worker failures are retried.
  pub fn is_retryable(&self) -> bool {
    matches!(self.kind(), ErrorKind::Timeout | ErrorKind::Execution)
  }

  pub fn task_id(&self) -> &str {
    match self {
      TaskError::Timeout { task_id, .. }
      | TaskError::Execution { task_id, .. }
      | TaskError::Cancelled { task_id }
      | TaskError::DependencyFailed { task_id, .. } => task_id,
    }
  }
}
