use taskweave_task_executor::ErrorKind;
use thiserror::Error;

/// Rejections returned by [`ExecutionEngine::execute`](crate::ExecutionEngine::execute)
/// before any work starts. Every other failure is reported inside the
/// [`ExecutionResult`](crate::ExecutionResult).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
  #[error("capacity exceeded: {resource} limit is {limit}")]
  Capacity { resource: &'static str, limit: usize },

  #[error("engine has been terminated")]
  Terminated,
}

impl EngineError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      EngineError::Capacity { .. } => ErrorKind::Capacity,
      EngineError::Terminated => ErrorKind::Cancellation,
    }
  }
}
