use thiserror::Error;

/// A plan, task or pipeline that is malformed and must not be scheduled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
  #[error("plan id must not be empty")]
  EmptyPlanId,

  #[error("plan '{plan_id}' has no tasks")]
  NoTasks { plan_id: String },

  #[error("task id must not be empty")]
  EmptyTaskId,

  #[error("duplicate task id: {0}")]
  DuplicateTask(String),

  #[error("task '{task_id}' depends on unknown task '{dependency}'")]
  UnknownDependency { task_id: String, dependency: String },

  #[error("dependency cycle detected at task '{0}'")]
  DependencyCycle(String),

  #[error("task '{task_id}' depends on '{dependency}' which runs after it in a sequential plan")]
  DependencyOrder { task_id: String, dependency: String },

  #[error("pipeline '{pipeline_id}' has no stages")]
  NoStages { pipeline_id: String },

  #[error("duplicate stage id: {0}")]
  DuplicateStage(String),

  #[error("stage '{stage_id}' is invalid: {message}")]
  InvalidStage { stage_id: String, message: String },
}
