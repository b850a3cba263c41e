use serde::{Deserialize, Serialize};

/// An atomic, independently schedulable unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
  /// Caller-assigned id, unique within a plan.
  pub id: String,

  /// Free-form kind forwarded to the worker, e.g. "command".
  #[serde(default = "default_kind")]
  pub kind: String,

  #[serde(default)]
  pub payload: serde_json::Value,

  /// Higher values are dispatched first.
  #[serde(default)]
  pub priority: i32,

  /// Per-attempt deadline. Falls back to the engine default when unset.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub timeout_ms: Option<u64>,

  /// Total number of attempts the executor may make. Zero is treated as one.
  #[serde(default = "default_max_retries")]
  pub max_retries: u32,

  /// Ids of tasks in the same plan that must complete first.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub dependencies: Vec<String>,
}

fn default_kind() -> String {
  "task".to_string()
}

fn default_max_retries() -> u32 {
  1
}

impl Task {
  /// Create a task with default kind, priority and retry policy.
  pub fn new(id: impl Into<String>, payload: serde_json::Value) -> Self {
    Self {
      id: id.into(),
      kind: default_kind(),
      payload,
      priority: 0,
      timeout_ms: None,
      max_retries: default_max_retries(),
      dependencies: Vec::new(),
    }
  }

  pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
    self.kind = kind.into();
    self
  }

  pub fn with_priority(mut self, priority: i32) -> Self {
    self.priority = priority;
    self
  }

  pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
    self.timeout_ms = Some(timeout_ms);
    self
  }

  pub fn with_max_retries(mut self, max_retries: u32) -> Self {
    self.max_retries = max_retries;
    self
  }

  pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.dependencies = dependencies.into_iter().map(Into::into).collect();
    self
  }

  /// Number of attempts the executor is allowed to make.
  pub fn max_attempts(&self) -> u32 {
    self.max_retries.max(1)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_defaults_from_minimal_json() {
    let task: Task = serde_json::from_value(json!({ "id": "a" })).unwrap();

    assert_eq!(task.kind, "task");
    assert_eq!(task.priority, 0);
    assert_eq!(task.max_retries, 1);
    assert_eq!(task.payload, serde_json::Value::Null);
    assert!(task.dependencies.is_empty());
    assert!(task.timeout_ms.is_none());
  }

  #[test]
  fn test_zero_retries_still_allows_one_attempt() {
    let task = Task::new("a", json!({})).with_max_retries(0);
    assert_eq!(task.max_attempts(), 1);
  }
}
