//! Tests for Scheduler ordering, concurrency, caching and cancellation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use taskweave_config::Task;
use taskweave_runtime::{WorkerError, WorkerExecutor, WorkerRequest};
use taskweave_scheduler::{ResultCache, Scheduler, SchedulerConfig, SchedulerError};
use taskweave_task_executor::{ExecutorConfig, TaskError, TaskExecutor, TaskStatus};
use tokio_util::sync::CancellationToken;

/// Records call order and concurrency. Sleeps for `payload.sleep_ms`, fails
/// when `payload.fail` is true and panics when `payload.panic` is true.
#[derive(Default)]
struct TestWorker {
  calls: Mutex<Vec<String>>,
  running: AtomicUsize,
  max_running: AtomicUsize,
}

impl TestWorker {
  fn calls(&self) -> Vec<String> {
    self.calls.lock().unwrap().clone()
  }

  fn max_running(&self) -> usize {
    self.max_running.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl WorkerExecutor for TestWorker {
  async fn execute(&self, request: WorkerRequest) -> Result<Value, WorkerError> {
    self.calls.lock().unwrap().push(request.id.clone());
    if request.payload["panic"].as_bool().unwrap_or(false) {
      panic!("worker exploded");
    }
    let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
    self.max_running.fetch_max(now, Ordering::SeqCst);

    let sleep_ms = request.payload["sleep_ms"].as_u64().unwrap_or(0);
    if sleep_ms > 0 {
      tokio::time::sleep(Duration::from_millis(sleep_ms)).await;
    }

    self.running.fetch_sub(1, Ordering::SeqCst);

    if request.payload["fail"].as_bool().unwrap_or(false) {
      return Err(WorkerError::failed("told to fail"));
    }
    Ok(json!({ "task": request.id }))
  }
}

fn scheduler(
  worker: Arc<TestWorker>,
  max_concurrency: usize,
  max_queue_size: usize,
  cache: bool,
) -> Scheduler {
  let executor = TaskExecutor::new(
    worker,
    ExecutorConfig {
      retry_base_delay: Duration::from_millis(10),
      default_timeout: Duration::from_secs(60),
    },
  );
  Scheduler::new(
    Arc::new(executor),
    Arc::new(ResultCache::new(cache)),
    SchedulerConfig {
      max_concurrency,
      max_queue_size,
    },
  )
}

fn sleeping(id: &str, sleep_ms: u64) -> Task {
  Task::new(id, json!({ "sleep_ms": sleep_ms }))
}

#[tokio::test(start_paused = true)]
async fn test_batch_dispatches_by_priority() {
  let worker = Arc::new(TestWorker::default());
  let scheduler = scheduler(worker.clone(), 1, 100, false);

  let handles = scheduler
    .submit_all(vec![
      sleeping("p1", 5).with_priority(1),
      sleeping("p10", 5).with_priority(10),
      sleeping("p5", 5).with_priority(5),
    ])
    .unwrap();

  for handle in handles {
    assert_eq!(handle.wait().await.unwrap().status, TaskStatus::Completed);
  }

  assert_eq!(worker.calls(), vec!["p10", "p5", "p1"]);

  let stats = scheduler.stats();
  assert_eq!(stats.dispatched, 3);
  assert_eq!(stats.peak_active, 1);
  assert_eq!(stats.active, 0);
  assert_eq!(stats.queued, 0);
}

#[tokio::test(start_paused = true)]
async fn test_concurrency_cap_is_never_exceeded() {
  let worker = Arc::new(TestWorker::default());
  let scheduler = scheduler(worker.clone(), 3, 100, false);

  let tasks = (0..10).map(|i| sleeping(&format!("t{}", i), 50)).collect();
  let handles = scheduler.submit_all(tasks).unwrap();
  let results = futures::future::join_all(handles.into_iter().map(|h| h.wait())).await;

  assert!(results
    .iter()
    .all(|r| r.as_ref().unwrap().status == TaskStatus::Completed));
  assert_eq!(worker.calls().len(), 10);
  assert_eq!(worker.max_running(), 3);
  assert_eq!(scheduler.stats().peak_active, 3);
}

#[tokio::test(start_paused = true)]
async fn test_individual_submissions_share_the_cap() {
  let worker = Arc::new(TestWorker::default());
  let scheduler = scheduler(worker.clone(), 2, 100, false);

  let submissions = (0..6).map(|i| {
    let scheduler = scheduler.clone();
    async move { scheduler.submit(sleeping(&format!("t{}", i), 20)).await }
  });
  let results = futures::future::join_all(submissions).await;

  assert_eq!(results.len(), 6);
  assert!(results.iter().all(|r| r.as_ref().unwrap().is_success()));
  assert!(worker.max_running() <= 2);
}

#[tokio::test(start_paused = true)]
async fn test_cache_hit_skips_the_worker() {
  let worker = Arc::new(TestWorker::default());
  let scheduler = scheduler(worker.clone(), 2, 100, true);

  let first = scheduler.submit(sleeping("a", 5)).await.unwrap();
  let second = scheduler.submit(sleeping("a", 5)).await.unwrap();

  assert_eq!(first, second);
  assert_eq!(worker.calls(), vec!["a"]);

  let stats = scheduler.stats();
  assert_eq!(stats.cache.hits, 1);
  assert_eq!(stats.cache.misses, 1);
  assert_eq!(stats.cache.entries, 1);
  assert_eq!(stats.dispatched, 1);

  scheduler.cache().clear();
  scheduler.submit(sleeping("a", 5)).await.unwrap();
  assert_eq!(worker.calls(), vec!["a", "a"]);
}

#[tokio::test(start_paused = true)]
async fn test_disabled_cache_runs_every_time() {
  let worker = Arc::new(TestWorker::default());
  let scheduler = scheduler(worker.clone(), 2, 100, false);

  scheduler.submit(sleeping("a", 5)).await.unwrap();
  scheduler.submit(sleeping("a", 5)).await.unwrap();

  assert_eq!(worker.calls().len(), 2);
  assert_eq!(scheduler.stats().cache.hits, 0);
}

#[tokio::test(start_paused = true)]
async fn test_failed_results_are_not_served_from_cache() {
  let worker = Arc::new(TestWorker::default());
  let scheduler = scheduler(worker.clone(), 1, 100, true);

  let task = Task::new("bad", json!({ "fail": true }));
  let first = scheduler.submit(task.clone()).await.unwrap();
  let second = scheduler.submit(task).await.unwrap();

  assert_eq!(first.status, TaskStatus::Failed);
  assert_eq!(second.status, TaskStatus::Failed);
  assert_eq!(worker.calls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_running_task() {
  let worker = Arc::new(TestWorker::default());
  let scheduler = scheduler(worker.clone(), 1, 100, false);

  let handle = scheduler.enqueue(sleeping("long", 10_000)).unwrap();
  tokio::time::sleep(Duration::from_millis(10)).await;

  assert!(scheduler.cancel("long"));
  let result = handle.wait().await.unwrap();

  assert_eq!(result.status, TaskStatus::Cancelled);
  assert_eq!(
    result.error,
    Some(TaskError::Cancelled {
      task_id: "long".to_string()
    })
  );
  assert_eq!(worker.calls(), vec!["long"]);
  assert_eq!(scheduler.stats().active, 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_queued_task_never_runs() {
  let worker = Arc::new(TestWorker::default());
  let scheduler = scheduler(worker.clone(), 1, 100, false);

  let running = scheduler.enqueue(sleeping("a", 100)).unwrap();
  let queued = scheduler.enqueue(sleeping("b", 100)).unwrap();

  assert!(scheduler.cancel("b"));
  let cancelled = queued.wait().await.unwrap();
  assert_eq!(cancelled.status, TaskStatus::Cancelled);
  assert_eq!(cancelled.attempts, 1);
  assert!(cancelled.started_at.is_none());

  assert!(running.wait().await.unwrap().is_success());
  assert_eq!(worker.calls(), vec!["a"]);
}

#[tokio::test]
async fn test_cancel_unknown_task_returns_false() {
  let scheduler = scheduler(Arc::new(TestWorker::default()), 1, 100, false);
  assert!(!scheduler.cancel("ghost"));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_all_resolves_everything() {
  let worker = Arc::new(TestWorker::default());
  let scheduler = scheduler(worker.clone(), 1, 100, false);

  let handles = scheduler
    .submit_all(vec![
      sleeping("a", 10_000),
      sleeping("b", 10_000),
      sleeping("c", 10_000),
    ])
    .unwrap();
  tokio::time::sleep(Duration::from_millis(10)).await;

  scheduler.cancel_all();

  for handle in handles {
    assert_eq!(handle.wait().await.unwrap().status, TaskStatus::Cancelled);
  }
  assert_eq!(worker.calls(), vec!["a"]);

  // Still usable afterwards.
  let after = scheduler.submit(sleeping("d", 5)).await.unwrap();
  assert!(after.is_success());
}

#[tokio::test(start_paused = true)]
async fn test_parent_token_cancels_queued_and_running() {
  let worker = Arc::new(TestWorker::default());
  let parent = CancellationToken::new();
  let executor = TaskExecutor::new(worker.clone(), ExecutorConfig::default());
  let scheduler = Scheduler::with_cancel_token(
    Arc::new(executor),
    Arc::new(ResultCache::disabled()),
    SchedulerConfig {
      max_concurrency: 1,
      max_queue_size: 10,
    },
    parent.clone(),
  );

  let handles = scheduler
    .submit_all(vec![sleeping("a", 10_000), sleeping("b", 10_000)])
    .unwrap();
  tokio::time::sleep(Duration::from_millis(10)).await;
  parent.cancel();

  for handle in handles {
    assert_eq!(handle.wait().await.unwrap().status, TaskStatus::Cancelled);
  }
  assert_eq!(worker.calls(), vec!["a"]);
}

#[tokio::test]
async fn test_queue_full_rejection() {
  let scheduler = scheduler(Arc::new(TestWorker::default()), 1, 2, false);
  scheduler.pause();

  let _a = scheduler.enqueue(sleeping("a", 0)).unwrap();
  let _b = scheduler.enqueue(sleeping("b", 0)).unwrap();
  let err = scheduler.enqueue(sleeping("c", 0)).unwrap_err();

  assert_eq!(err, SchedulerError::QueueFull { capacity: 2 });
  assert_eq!(scheduler.stats().queued, 2);
}

#[tokio::test]
async fn test_oversized_batch_is_rejected_whole() {
  let scheduler = scheduler(Arc::new(TestWorker::default()), 1, 2, false);
  scheduler.pause();

  let err = scheduler
    .submit_all(vec![sleeping("a", 0), sleeping("b", 0), sleeping("c", 0)])
    .unwrap_err();

  assert!(matches!(err, SchedulerError::QueueFull { .. }));
  assert_eq!(scheduler.stats().queued, 0);
}

#[tokio::test]
async fn test_duplicate_task_rejection() {
  let scheduler = scheduler(Arc::new(TestWorker::default()), 1, 10, false);
  scheduler.pause();

  let _a = scheduler.enqueue(sleeping("a", 0)).unwrap();
  assert_eq!(
    scheduler.enqueue(sleeping("a", 0)).unwrap_err(),
    SchedulerError::DuplicateTask("a".to_string())
  );
  assert_eq!(
    scheduler
      .submit_all(vec![sleeping("x", 0), sleeping("x", 0)])
      .unwrap_err(),
    SchedulerError::DuplicateTask("x".to_string())
  );
}

#[tokio::test(start_paused = true)]
async fn test_pause_holds_work_until_resume() {
  let worker = Arc::new(TestWorker::default());
  let scheduler = scheduler(worker.clone(), 2, 10, false);

  scheduler.pause();
  let handle = scheduler.enqueue(sleeping("a", 5)).unwrap();
  tokio::time::sleep(Duration::from_millis(50)).await;

  assert!(worker.calls().is_empty());
  assert_eq!(scheduler.stats().queued, 1);

  scheduler.resume();
  assert!(handle.wait().await.unwrap().is_success());
  assert_eq!(worker.calls(), vec!["a"]);
}

#[tokio::test(start_paused = true)]
async fn test_worker_panic_fails_task_and_frees_slot() {
  let worker = Arc::new(TestWorker::default());
  let scheduler = scheduler(worker.clone(), 1, 100, false);

  let result = scheduler
    .submit(Task::new("boom", json!({ "panic": true })))
    .await
    .unwrap();
  assert_eq!(result.status, TaskStatus::Failed);
  assert_eq!(result.attempts, 1);
  assert!(matches!(
    &result.error,
    Some(TaskError::Execution { message, .. }) if message.contains("worker exploded")
  ));

  // The only slot is free and the id can be reused.
  let next = scheduler.submit(sleeping("ok", 5)).await.unwrap();
  assert_eq!(next.status, TaskStatus::Completed);
  let again = scheduler.submit(sleeping("boom", 5)).await.unwrap();
  assert_eq!(again.status, TaskStatus::Completed);
  assert_eq!(scheduler.stats().active, 0);
  assert_eq!(worker.calls(), vec!["boom", "ok", "boom"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_resubmission_after_completion_hits_cache() {
  let worker = Arc::new(TestWorker::default());
  let scheduler = scheduler(worker.clone(), 4, 100, true);

  for _ in 0..50 {
    let submissions = (0..8).map(|_| {
      let scheduler = scheduler.clone();
      tokio::spawn(async move { scheduler.submit(Task::new("a", json!({}))).await })
    });
    for joined in futures::future::join_all(submissions).await {
      match joined.unwrap() {
        Ok(result) => assert_eq!(result.status, TaskStatus::Completed),
        Err(SchedulerError::DuplicateTask(id)) => assert_eq!(id, "a"),
        Err(other) => panic!("unexpected error: {:?}", other),
      }
    }
  }

  assert_eq!(worker.calls(), vec!["a"]);
}
