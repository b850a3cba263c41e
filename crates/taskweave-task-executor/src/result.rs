//! Task execution result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TaskError;

/// Lifecycle of a task or an execution context.
///
/// `pending → running → {completed | failed | cancelled}`. A pending unit may
/// also be cancelled directly. Terminal states never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
  Pending,
  Running,
  Completed,
  Failed,
  Cancelled,
}

impl TaskStatus {
  pub fn is_terminal(self) -> bool {
    matches!(
      self,
      TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
    )
  }

  pub fn can_transition_to(self, next: TaskStatus) -> bool {
    matches!(
      (self, next),
      (TaskStatus::Pending, TaskStatus::Running)
        | (TaskStatus::Pending, TaskStatus::Cancelled)
        | (TaskStatus::Running, TaskStatus::Completed)
        | (TaskStatus::Running, TaskStatus::Failed)
        | (TaskStatus::Running, TaskStatus::Cancelled)
    )
  }
}

/// Result of running one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
  pub task_id: String,
  pub status: TaskStatus,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub value: Option<serde_json::Value>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<TaskError>,
  /// Attempts made. At least 1 for every terminal result.
  pub attempts: u32,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub started_at: Option<DateTime<Utc>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub ended_at: Option<DateTime<Utc>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub duration_ms: Option<u64>,
}

impl TaskResult {
  pub fn pending(task_id: impl Into<String>) -> Self {
    Self {
      task_id: task_id.into(),
      status: TaskStatus::Pending,
      value: None,
      error: None,
      attempts: 0,
      started_at: None,
      ended_at: None,
      duration_ms: None,
    }
  }

  pub fn completed(
    task_id: impl Into<String>,
    value: serde_json::Value,
    attempts: u32,
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
  ) -> Self {
    Self {
      value: Some(value),
      ..Self::terminal(task_id, TaskStatus::Completed, attempts, Some(started_at), ended_at)
    }
  }

  pub fn failed(
    task_id: impl Into<String>,
    error: TaskError,
    attempts: u32,
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
  ) -> Self {
    Self {
      error: Some(error),
      ..Self::terminal(task_id, TaskStatus::Failed, attempts, Some(started_at), ended_at)
    }
  }

  /// A cancelled result. `error` is usually [`TaskError::Cancelled`], or
  /// [`TaskError::DependencyFailed`] for a task that never ran.
  pub fn cancelled(
    task_id: impl Into<String>,
    error: TaskError,
    attempts: u32,
    started_at: Option<DateTime<Utc>>,
    ended_at: DateTime<Utc>,
  ) -> Self {
    Self {
      error: Some(error),
      ..Self::terminal(task_id, TaskStatus::Cancelled, attempts, started_at, ended_at)
    }
  }

  fn terminal(
    task_id: impl Into<String>,
    status: TaskStatus,
    attempts: u32,
    started_at: Option<DateTime<Utc>>,
    ended_at: DateTime<Utc>,
  ) -> Self {
    let duration_ms = started_at.map(|s| (ended_at - s).num_milliseconds().max(0) as u64);
    Self {
      task_id: task_id.into(),
      status,
      value: None,
      error: None,
      attempts: attempts.max(1),
      started_at,
      ended_at: Some(ended_at),
      duration_ms,
    }
  }

  pub fn is_success(&self) -> bool {
    self.status == TaskStatus::Completed
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_transitions_are_one_way() {
    assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Running));
    assert!(TaskStatus::Running.can_transition_to(TaskStatus::Cancelled));
    assert!(!TaskStatus::Completed.can_transition_to(TaskStatus::Running));
    assert!(!TaskStatus::Failed.can_transition_to(TaskStatus::Completed));
    assert!(!TaskStatus::Running.can_transition_to(TaskStatus::Pending));
    assert!(!TaskStatus::Pending.can_transition_to(TaskStatus::Completed));
  }

  #[test]
  fn test_terminal_results_have_an_attempt() {
    let now = Utc::now();
    let result = TaskResult::cancelled(
      "a",
      TaskError::Cancelled {
        task_id: "a".to_string(),
      },
      0,
      None,
      now,
    );

    assert_eq!(result.attempts, 1);
    assert!(result.status.is_terminal());
    assert!(result.duration_ms.is_none());
  }

  #[test]
  fn test_duration_from_timestamps() {
    let start = Utc::now();
    let end = start + chrono::Duration::milliseconds(250);
    let result = TaskResult::completed("a", serde_json::json!(1), 1, start, end);

    assert_eq!(result.duration_ms, Some(250));
    assert!(result.is_success());
  }
}
