use serde::{Deserialize, Serialize};

use crate::pipeline::Pipeline;
use crate::task::Task;

/// Declarative description of how a batch of work should run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
  pub id: String,
  #[serde(flatten)]
  pub strategy: PlanStrategy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum PlanStrategy {
  /// Tasks run one after another in listed order.
  Sequential {
    tasks: Vec<Task>,
    /// Stop at the first failed task, leaving the rest un-run.
    #[serde(default)]
    fail_fast: bool,
  },
  /// Tasks run concurrently, bounded by the scheduler's concurrency cap.
  Parallel { tasks: Vec<Task> },
  /// Stages run in order through the pipeline runner.
  Pipeline { pipeline: Pipeline },
}

impl PlanStrategy {
  /// Short name used in logs and result metadata.
  pub fn name(&self) -> &'static str {
    match self {
      PlanStrategy::Sequential { .. } => "sequential",
      PlanStrategy::Parallel { .. } => "parallel",
      PlanStrategy::Pipeline { .. } => "pipeline",
    }
  }
}

impl ExecutionPlan {
  pub fn sequential(id: impl Into<String>, tasks: Vec<Task>, fail_fast: bool) -> Self {
    Self {
      id: id.into(),
      strategy: PlanStrategy::Sequential { tasks, fail_fast },
    }
  }

  pub fn parallel(id: impl Into<String>, tasks: Vec<Task>) -> Self {
    Self {
      id: id.into(),
      strategy: PlanStrategy::Parallel { tasks },
    }
  }

  pub fn pipeline(id: impl Into<String>, pipeline: Pipeline) -> Self {
    Self {
      id: id.into(),
      strategy: PlanStrategy::Pipeline { pipeline },
    }
  }

  /// Number of units the plan will report on (tasks or stages).
  pub fn total_units(&self) -> usize {
    match &self.strategy {
      PlanStrategy::Sequential { tasks, .. } | PlanStrategy::Parallel { tasks } => tasks.len(),
      PlanStrategy::Pipeline { pipeline } => pipeline.stages.len(),
    }
  }
}
