//! Cumulative execution metrics for one engine instance.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Snapshot returned by [`MetricsAggregator::snapshot`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionMetrics {
  pub total_executions: u64,
  pub completed_executions: u64,
  pub failed_executions: u64,
  pub average_execution_time_ms: f64,
  /// Executions finished per second over the trailing window.
  pub throughput: f64,
  /// `failed_executions / total_executions`, or 0 before the first run.
  pub error_rate: f64,
  pub tasks_completed: u64,
  pub tasks_failed: u64,
}

#[derive(Default)]
struct State {
  total_executions: u64,
  completed_executions: u64,
  failed_executions: u64,
  total_duration_ms: u64,
  tasks_completed: u64,
  tasks_failed: u64,
  finished_at: VecDeque<Instant>,
}

pub struct MetricsAggregator {
  window: Duration,
  state: Mutex<State>,
}

impl MetricsAggregator {
  pub fn new(window: Duration) -> Self {
    Self {
      window,
      state: Mutex::new(State::default()),
    }
  }

  fn lock(&self) -> MutexGuard<'_, State> {
    self
      .state
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  pub fn record(&self, success: bool, duration_ms: u64, tasks_completed: usize, tasks_failed: usize) {
    let now = Instant::now();
    let mut state = self.lock();

    state.total_executions += 1;
    if success {
      state.completed_executions += 1;
    } else {
      state.failed_executions += 1;
    }
    state.total_duration_ms += duration_ms;
    state.tasks_completed += tasks_completed as u64;
    state.tasks_failed += tasks_failed as u64;
    state.finished_at.push_back(now);
    prune(&mut state.finished_at, now, self.window);
  }

  pub fn snapshot(&self) -> ExecutionMetrics {
    let now = Instant::now();
    let mut state = self.lock();
    prune(&mut state.finished_at, now, self.window);

    let total = state.total_executions;
    let (average, error_rate) = if total == 0 {
      (0.0, 0.0)
    } else {
      (
        state.total_duration_ms as f64 / total as f64,
        state.failed_executions as f64 / total as f64,
      )
    };
    let window_secs = self.window.as_secs_f64();
    let throughput = if window_secs > 0.0 {
      state.finished_at.len() as f64 / window_secs
    } else {
      0.0
    };

    ExecutionMetrics {
      total_executions: total,
      completed_executions: state.completed_executions,
      failed_executions: state.failed_executions,
      average_execution_time_ms: average,
      throughput,
      error_rate,
      tasks_completed: state.tasks_completed,
      tasks_failed: state.tasks_failed,
    }
  }

  pub fn reset(&self) {
    *self.lock() = State::default();
  }
}

fn prune(finished_at: &mut VecDeque<Instant>, now: Instant, window: Duration) {
  while let Some(oldest) = finished_at.front() {
    if now.duration_since(*oldest) > window {
      finished_at.pop_front();
    } else {
      break;
    }
  }
}
