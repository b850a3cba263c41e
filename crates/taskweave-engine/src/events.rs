//! Execution events and notifiers for observability.
//!
//! Events are emitted while a plan executes so consumers can observe
//! progress, persist state, stream to UIs, etc.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use taskweave_pipeline::StageResult;
use taskweave_task_executor::TaskResult;
use tokio::sync::mpsc;

use crate::result::FinalStatus;

/// Events emitted during plan execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExecutionEvent {
  /// The plan was accepted and is about to run.
  ExecutionStarted {
    execution_id: String,
    plan_id: String,
    strategy: String,
  },

  /// A task completed successfully.
  TaskCompleted {
    execution_id: String,
    result: TaskResult,
  },

  /// A task failed or was cancelled.
  TaskFailed {
    execution_id: String,
    result: TaskResult,
  },

  /// A pipeline stage settled, successfully or not.
  StageCompleted {
    execution_id: String,
    result: StageResult,
  },

  /// Every unit of the plan completed.
  ExecutionCompleted {
    execution_id: String,
    final_status: FinalStatus,
    duration_ms: u64,
  },

  /// The plan finished with failures, or never got to run.
  ExecutionFailed {
    execution_id: String,
    final_status: FinalStatus,
    error: String,
  },

  /// The execution was cancelled before every unit completed.
  ExecutionCancelled { execution_id: String },
}

/// Trait for receiving execution events.
///
/// The engine calls `notify` for each event. Implementations decide what to
/// do with them (persist, broadcast, log, ignore, etc.).
pub trait ExecutionNotifier: Send + Sync {
  fn notify(&self, event: ExecutionEvent);
}

impl<N: ExecutionNotifier + ?Sized> ExecutionNotifier for Arc<N> {
  fn notify(&self, event: ExecutionEvent) {
    (**self).notify(event);
  }
}

/// Discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _event: ExecutionEvent) {}
}

/// Sends events to an unbounded channel.
///
/// Use this to consume events asynchronously without blocking the engine on a
/// slow consumer.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  sender: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
    Self { sender }
  }
}

impl ExecutionNotifier for ChannelNotifier {
  fn notify(&self, event: ExecutionEvent) {
    // Receiver may have been dropped.
    let _ = self.sender.send(event);
  }
}

/// Forwards every event to each registered notifier, in registration order.
#[derive(Default)]
pub struct FanoutNotifier {
  notifiers: Vec<Box<dyn ExecutionNotifier>>,
}

impl FanoutNotifier {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with(mut self, notifier: impl ExecutionNotifier + 'static) -> Self {
    self.notifiers.push(Box::new(notifier));
    self
  }

  pub fn len(&self) -> usize {
    self.notifiers.len()
  }

  pub fn is_empty(&self) -> bool {
    self.notifiers.is_empty()
  }
}

impl ExecutionNotifier for FanoutNotifier {
  fn notify(&self, event: ExecutionEvent) {
    if let Some((last, rest)) = self.notifiers.split_last() {
      for notifier in rest {
        notifier.notify(event.clone());
      }
      last.notify(event);
    }
  }
}
