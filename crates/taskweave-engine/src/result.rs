use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taskweave_pipeline::PipelineResult;
use taskweave_task_executor::{TaskResult, TaskStatus};

use crate::context::ContextMetrics;

/// Coarse outcome of a plan execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalStatus {
  /// Every unit completed.
  Completed,
  /// Some units completed, others failed or never ran.
  Partial,
  /// No unit completed.
  Failed,
}

impl FinalStatus {
  pub fn from_counts(completed: usize, total: usize) -> Self {
    if total > 0 && completed == total {
      FinalStatus::Completed
    } else if completed == 0 {
      FinalStatus::Failed
    } else {
      FinalStatus::Partial
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionMetadata {
  pub strategy: String,
  pub final_status: FinalStatus,
  pub started_at: DateTime<Utc>,
  pub ended_at: DateTime<Utc>,
  pub duration_ms: u64,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub environment_id: Option<String>,
}

/// Outcome of one plan execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
  pub execution_id: String,
  pub plan_id: String,
  pub success: bool,
  /// Terminal status of the execution context.
  pub status: TaskStatus,
  /// One entry per unit that settled, in plan order.
  pub results: Vec<TaskResult>,
  pub metrics: ContextMetrics,
  /// Full stage-level detail for pipeline plans.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub pipeline: Option<PipelineResult>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
  pub metadata: ExecutionMetadata,
}
