//! Priority scheduler with a concurrency cap.
//!
//! Submissions wait in a [`PriorityQueue`]. The drain loop pops entries while
//! fewer than `max_concurrency` tasks are active and spawns each one on the
//! [`TaskExecutor`]. Every completion removes its task from the active set and
//! drains again. Popping and activating happen under the same lock, so
//! completions racing each other never dispatch the same entry twice or push
//! the active count past the cap.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::FutureExt;

use serde::{Deserialize, Serialize};
use taskweave_config::{EngineConfig, Task};
use taskweave_task_executor::{TaskError, TaskExecutor, TaskResult};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cache::{CacheStats, ResultCache};
use crate::error::SchedulerError;
use crate::queue::PriorityQueue;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
  /// Maximum tasks running at once. Zero is treated as one.
  pub max_concurrency: usize,
  /// Maximum tasks waiting in the queue.
  pub max_queue_size: usize,
}

impl Default for SchedulerConfig {
  fn default() -> Self {
    Self::from(&EngineConfig::default())
  }
}

impl From<&EngineConfig> for SchedulerConfig {
  fn from(config: &EngineConfig) -> Self {
    Self {
      max_concurrency: config.max_concurrency,
      max_queue_size: config.max_queue_size,
    }
  }
}

/// Point-in-time view of a scheduler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
  pub queued: usize,
  pub active: usize,
  /// Highest active count observed.
  pub peak_active: usize,
  /// Tasks handed to the executor (cache hits excluded).
  pub dispatched: u64,
  pub cache: CacheStats,
}

/// Handle to a submitted task.
///
/// Call `.wait()` to receive the task's terminal result.
#[derive(Debug)]
pub struct TaskHandle {
  task_id: String,
  receiver: oneshot::Receiver<TaskResult>,
}

impl TaskHandle {
  pub fn task_id(&self) -> &str {
    &self.task_id
  }

  pub async fn wait(self) -> Result<TaskResult, SchedulerError> {
    self.receiver.await.map_err(|_| SchedulerError::Closed {
      task_id: self.task_id,
    })
  }
}

/// Schedules tasks by priority under a concurrency cap.
///
/// Cheap to clone; clones share the same queue and active set.
#[derive(Clone)]
pub struct Scheduler {
  inner: Arc<Inner>,
}

struct Inner {
  executor: Arc<TaskExecutor>,
  cache: Arc<ResultCache>,
  config: SchedulerConfig,
  cancel: CancellationToken,
  state: Mutex<State>,
}

#[derive(Default)]
struct State {
  queue: PriorityQueue<QueuedTask>,
  active: HashMap<String, CancellationToken>,
  paused: bool,
  peak_active: usize,
  dispatched: u64,
}

struct QueuedTask {
  task: Task,
  cancel: CancellationToken,
  responder: oneshot::Sender<TaskResult>,
}

/// What the drain loop decided for one popped entry.
enum Drained {
  Dispatch(QueuedTask),
  Resolve(QueuedTask, TaskResult),
}

impl Scheduler {
  pub fn new(executor: Arc<TaskExecutor>, cache: Arc<ResultCache>, config: SchedulerConfig) -> Self {
    Self::with_cancel_token(executor, cache, config, CancellationToken::new())
  }

  /// Create a scheduler whose task tokens are children of `cancel`.
  ///
  /// Cancelling `cancel` cancels every queued and running task.
  pub fn with_cancel_token(
    executor: Arc<TaskExecutor>,
    cache: Arc<ResultCache>,
    config: SchedulerConfig,
    cancel: CancellationToken,
  ) -> Self {
    Self {
      inner: Arc::new(Inner {
        executor,
        cache,
        config,
        cancel,
        state: Mutex::new(State::default()),
      }),
    }
  }

  /// Submit a task and wait for its result.
  pub async fn submit(&self, task: Task) -> Result<TaskResult, SchedulerError> {
    self.enqueue(task)?.wait().await
  }

  /// Queue a task and return immediately.
  pub fn enqueue(&self, task: Task) -> Result<TaskHandle, SchedulerError> {
    let mut handles = self.submit_all(vec![task])?;
    Ok(handles.remove(0))
  }

  /// Queue a batch of tasks before the drain loop runs.
  ///
  /// The batch is accepted or rejected as a whole, so priority ordering
  /// applies across all of its tasks.
  pub fn submit_all(&self, tasks: Vec<Task>) -> Result<Vec<TaskHandle>, SchedulerError> {
    let mut handles = Vec::with_capacity(tasks.len());
    {
      let mut state = self.inner.lock_state();

      let mut incoming = HashSet::new();
      for task in &tasks {
        let taken = state.active.contains_key(&task.id)
          || state.queue.iter().any(|queued| queued.task.id == task.id);
        if taken || !incoming.insert(task.id.as_str()) {
          return Err(SchedulerError::DuplicateTask(task.id.clone()));
        }
      }

      if state.queue.len() + tasks.len() > self.inner.config.max_queue_size {
        return Err(SchedulerError::QueueFull {
          capacity: self.inner.config.max_queue_size,
        });
      }

      for task in tasks {
        let (responder, receiver) = oneshot::channel();
        debug!(task_id = %task.id, priority = task.priority, "task_queued");
        handles.push(TaskHandle {
          task_id: task.id.clone(),
          receiver,
        });
        state.queue.push(
          task.priority,
          QueuedTask {
            task,
            cancel: self.inner.cancel.child_token(),
            responder,
          },
        );
      }
    }

    self.inner.drain();
    Ok(handles)
  }

  /// Cancel a queued or running task.
  ///
  /// A queued task resolves as cancelled without running. A running task is
  /// signalled and resolves as cancelled once its executor observes it.
  /// Returns false when no such task is known.
  pub fn cancel(&self, task_id: &str) -> bool {
    let (removed, running) = {
      let mut state = self.inner.lock_state();
      let removed = state.queue.remove_where(|queued| queued.task.id == task_id);
      let running = state.active.get(task_id).cloned();
      (removed, running)
    };

    let found = !removed.is_empty() || running.is_some();
    for queued in removed {
      self.inner.resolve_cancelled(queued);
    }
    if let Some(token) = running {
      token.cancel();
    }

    if found {
      info!(task_id = %task_id, "task_cancel_requested");
    }
    found
  }

  /// Cancel every queued and running task. The scheduler stays usable.
  pub fn cancel_all(&self) {
    let (removed, running) = {
      let mut state = self.inner.lock_state();
      let removed = state.queue.drain();
      let running: Vec<CancellationToken> = state.active.values().cloned().collect();
      (removed, running)
    };

    info!(
      queued = removed.len(),
      running = running.len(),
      "cancel_all_requested"
    );

    for queued in removed {
      self.inner.resolve_cancelled(queued);
    }
    for token in running {
      token.cancel();
    }
  }

  /// Stop dispatching. Submissions are still accepted and queued.
  pub fn pause(&self) {
    self.inner.lock_state().paused = true;
  }

  /// Resume dispatching queued work.
  pub fn resume(&self) {
    self.inner.lock_state().paused = false;
    self.inner.drain();
  }

  pub fn stats(&self) -> SchedulerStats {
    let state = self.inner.lock_state();
    SchedulerStats {
      queued: state.queue.len(),
      active: state.active.len(),
      peak_active: state.peak_active,
      dispatched: state.dispatched,
      cache: self.inner.cache.stats(),
    }
  }

  pub fn cache(&self) -> &Arc<ResultCache> {
    &self.inner.cache
  }
}

impl Inner {
  fn lock_state(&self) -> MutexGuard<'_, State> {
    self
      .state
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  fn max_concurrency(&self) -> usize {
    self.config.max_concurrency.max(1)
  }

  /// Dispatch queued tasks while there is spare capacity.
  ///
  /// Safe to call from any number of completions at once.
  fn drain(self: &Arc<Self>) {
    let mut drained = Vec::new();
    {
      let mut state = self.lock_state();
      if state.paused {
        return;
      }

      while state.active.len() < self.max_concurrency() {
        let Some(queued) = state.queue.pop() else {
          break;
        };

        if queued.cancel.is_cancelled() {
          let result = self.cancelled_result(&queued.task);
          drained.push(Drained::Resolve(queued, result));
          continue;
        }

        if let Some(hit) = self.cache.get(&queued.task.id) {
          debug!(task_id = %queued.task.id, "cache_hit");
          drained.push(Drained::Resolve(queued, hit));
          continue;
        }

        state
          .active
          .insert(queued.task.id.clone(), queued.cancel.clone());
        state.dispatched += 1;
        state.peak_active = state.peak_active.max(state.active.len());
        drained.push(Drained::Dispatch(queued));
      }
    }

    for entry in drained {
      match entry {
        Drained::Dispatch(queued) => self.spawn(queued),
        Drained::Resolve(queued, result) => {
          let _ = queued.responder.send(result);
        }
      }
    }
  }

  fn spawn(self: &Arc<Self>, queued: QueuedTask) {
    let inner = Arc::clone(self);
    tokio::spawn(async move {
      let QueuedTask {
        task,
        cancel,
        responder,
      } = queued;

      let result = match AssertUnwindSafe(inner.executor.run(&task, cancel))
        .catch_unwind()
        .await
      {
        Ok(result) => result,
        Err(panic) => inner.panicked_result(&task, panic_message(panic.as_ref())),
      };

      // The id stays active until its result is cached.
      {
        let mut state = inner.lock_state();
        inner.cache.put(task.id.clone(), result.clone());
        state.active.remove(&task.id);
      }

      if responder.send(result).is_err() {
        warn!(task_id = %task.id, "task result dropped: receiver gone");
      }

      inner.drain();
    });
  }

  fn resolve_cancelled(&self, queued: QueuedTask) {
    let result = self.cancelled_result(&queued.task);
    let _ = queued.responder.send(result);
  }

  fn panicked_result(&self, task: &Task, message: &str) -> TaskResult {
    error!(task_id = %task.id, panic = %message, "task_panicked");
    let now = self.executor.clock().now();
    TaskResult::failed(
      &task.id,
      TaskError::Execution {
        task_id: task.id.clone(),
        message: format!("worker panicked: {}", message),
      },
      1,
      now,
      now,
    )
  }

  fn cancelled_result(&self, task: &Task) -> TaskResult {
    TaskResult::cancelled(
      &task.id,
      TaskError::Cancelled {
        task_id: task.id.clone(),
      },
      1,
      None,
      self.executor.clock().now(),
    )
  }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
  if let Some(message) = panic.downcast_ref::<&'static str>() {
    message
  } else if let Some(message) = panic.downcast_ref::<String>() {
    message
  } else {
    "unknown panic"
  }
}
