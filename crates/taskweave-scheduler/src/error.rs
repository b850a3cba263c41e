use taskweave_task_executor::ErrorKind;

/// Reasons a submission is rejected or its result is lost.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
  /// A task with the same id is already queued or running.
  #[error("task '{0}' is already queued or running")]
  DuplicateTask(String),

  /// Accepting the submission would exceed the queue capacity.
  #[error("scheduler queue is full (capacity {capacity})")]
  QueueFull { capacity: usize },

  /// The task's result was dropped before it was delivered, usually because
  /// the runtime is shutting down.
  #[error("scheduler dropped task '{task_id}' before it finished")]
  Closed { task_id: String },
}

impl SchedulerError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      SchedulerError::DuplicateTask(_) => ErrorKind::Validation,
      SchedulerError::QueueFull { .. } => ErrorKind::Capacity,
      SchedulerError::Closed { .. } => ErrorKind::Execution,
    }
  }
}
