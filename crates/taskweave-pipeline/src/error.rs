use serde::{Deserialize, Serialize};
use taskweave_config::ValidationError;
use taskweave_task_executor::{ErrorKind, TaskError};
use thiserror::Error;

/// Why a single stage failed. Captured in its [`StageResult`].
///
/// [`StageResult`]: crate::StageResult
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageError {
  #[error("stage '{stage_id}' timed out after {timeout_ms}ms")]
  Timeout { stage_id: String, timeout_ms: u64 },

  #[error("stage '{stage_id}' failed: {message}")]
  Execution { stage_id: String, message: String },

  #[error("stage '{stage_id}' was cancelled")]
  Cancelled { stage_id: String },

  #[error("stage '{stage_id}' has an invalid condition: {message}")]
  InvalidCondition { stage_id: String, message: String },
}

impl StageError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      StageError::Timeout { .. } => ErrorKind::Timeout,
      StageError::Execution { .. } => ErrorKind::Execution,
      StageError::Cancelled { .. } => ErrorKind::Cancellation,
      StageError::InvalidCondition { .. } => ErrorKind::Validation,
    }
  }

  pub fn stage_id(&self) -> &str {
    match self {
      StageError::Timeout { stage_id, .. }
      | StageError::Execution { stage_id, .. }
      | StageError::Cancelled { stage_id }
      | StageError::InvalidCondition { stage_id, .. } => stage_id,
    }
  }

  /// Re-attribute a task failure to the stage that ran it.
  pub(crate) fn from_task(stage_id: &str, error: TaskError) -> Self {
    let stage_id = stage_id.to_string();
    match error {
      TaskError::Timeout { timeout_ms, .. } => StageError::Timeout {
        stage_id,
        timeout_ms,
      },
      TaskError::Cancelled { .. } => StageError::Cancelled { stage_id },
      TaskError::Execution { message, .. } => StageError::Execution { stage_id, message },
      other @ TaskError::DependencyFailed { .. } => StageError::Execution {
        stage_id,
        message: other.to_string(),
      },
    }
  }
}

/// Errors that prevent a pipeline from running at all.
#[derive(Debug, Error)]
pub enum PipelineError {
  #[error("invalid pipeline: {0}")]
  Invalid(#[from] ValidationError),
}
