use serde::{Deserialize, Serialize};

/// Engine-wide settings.
///
/// Every field has a default, so `{}` is a valid configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  /// Maximum tasks running at once within one plan execution.
  pub max_concurrency: usize,
  /// Maximum plan executions in flight across the engine.
  pub max_concurrent_executions: usize,
  /// Maximum tasks waiting in one scheduler queue.
  pub max_queue_size: usize,
  /// Memoize completed task results by task id.
  pub cache_enabled: bool,
  /// Retry delay grows linearly: `retry_base_delay_ms * attempt`.
  pub retry_base_delay_ms: u64,
  pub default_task_timeout_ms: u64,
  pub default_stage_timeout_ms: u64,
  /// Trailing window used to compute throughput.
  pub throughput_window_ms: u64,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      max_concurrency: 4,
      max_concurrent_executions: 10,
      max_queue_size: 1000,
      cache_enabled: false,
      retry_base_delay_ms: 1000,
      default_task_timeout_ms: 30_000,
      default_stage_timeout_ms: 30_000,
      throughput_window_ms: 60_000,
    }
  }
}
