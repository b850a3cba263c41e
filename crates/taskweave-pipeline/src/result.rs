//! Stage and pipeline results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taskweave_config::StageKind;

use crate::error::StageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
  Completed,
  Failed,
}

/// Outcome of one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
  pub stage_id: String,
  pub kind: StageKind,
  pub status: StageStatus,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub output: Option<serde_json::Value>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<StageError>,
  pub started_at: DateTime<Utc>,
  pub ended_at: DateTime<Utc>,
  pub duration_ms: u64,
}

impl StageResult {
  pub fn is_success(&self) -> bool {
    self.status == StageStatus::Completed
  }
}

/// Aggregate outcome of a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
  pub pipeline_id: String,
  /// Id of the [`PipelineExecutionContext`](crate::PipelineExecutionContext) that ran.
  pub run_id: String,
  /// True when no stage failed and the run was not aborted.
  pub success: bool,
  pub stages_completed: usize,
  pub stages_failed: usize,
  pub total_stages: usize,
  pub stage_results: Vec<StageResult>,
  /// Set when a fail-fast stage or cancellation aborted the run.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<StageError>,
  pub started_at: DateTime<Utc>,
  pub ended_at: DateTime<Utc>,
  pub duration_ms: u64,
}
