//! Per-execution state owned by the engine for the duration of a run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taskweave_runtime::Environment;
use taskweave_task_executor::{TaskResult, TaskStatus};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Task counters for one execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextMetrics {
  pub tasks_completed: usize,
  pub tasks_failed: usize,
  /// Units resolved as cancelled, including dependents of failed tasks.
  pub tasks_cancelled: usize,
  pub total_tasks: usize,
}

pub struct ExecutionContext {
  pub id: String,
  pub plan_id: String,
  pub status: TaskStatus,
  pub results: Vec<TaskResult>,
  pub metrics: ContextMetrics,
  pub environment: Environment,
  pub started_at: DateTime<Utc>,
  pub cancel: CancellationToken,
}

impl ExecutionContext {
  pub fn new(
    id: impl Into<String>,
    plan_id: impl Into<String>,
    total_tasks: usize,
    environment: Environment,
    started_at: DateTime<Utc>,
    cancel: CancellationToken,
  ) -> Self {
    Self {
      id: id.into(),
      plan_id: plan_id.into(),
      status: TaskStatus::Pending,
      results: Vec::new(),
      metrics: ContextMetrics {
        total_tasks,
        ..ContextMetrics::default()
      },
      environment,
      started_at,
      cancel,
    }
  }

  /// Move to `next` if the state machine allows it.
  ///
  /// Returns false, leaving the status untouched, for a backward or lateral
  /// move.
  pub fn transition(&mut self, next: TaskStatus) -> bool {
    if !self.status.can_transition_to(next) {
      warn!(
        execution_id = %self.id,
        from = ?self.status,
        to = ?next,
        "rejected execution status transition"
      );
      return false;
    }
    self.status = next;
    true
  }

  pub fn record(&mut self, result: TaskResult) {
    match result.status {
      TaskStatus::Completed => self.metrics.tasks_completed += 1,
      TaskStatus::Failed => self.metrics.tasks_failed += 1,
      TaskStatus::Cancelled => self.metrics.tasks_cancelled += 1,
      TaskStatus::Pending | TaskStatus::Running => {}
    }
    self.results.push(result);
  }

  pub fn all_completed(&self) -> bool {
    self.metrics.tasks_completed == self.metrics.total_tasks
  }
}
