//! Result caching keyed by task id.
//!
//! A disabled cache never reads, writes or counts, so callers can consult it
//! unconditionally.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use taskweave_task_executor::TaskResult;

/// Hit/miss counters and current size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
  pub hits: u64,
  pub misses: u64,
  pub entries: usize,
}

/// Memoizes completed task results.
pub struct ResultCache {
  enabled: bool,
  entries: RwLock<HashMap<String, TaskResult>>,
  hits: AtomicU64,
  misses: AtomicU64,
}

impl ResultCache {
  pub fn new(enabled: bool) -> Self {
    Self {
      enabled,
      entries: RwLock::new(HashMap::new()),
      hits: AtomicU64::new(0),
      misses: AtomicU64::new(0),
    }
  }

  pub fn disabled() -> Self {
    Self::new(false)
  }

  pub fn is_enabled(&self) -> bool {
    self.enabled
  }

  /// Look up a result, counting the hit or miss.
  pub fn get(&self, key: &str) -> Option<TaskResult> {
    if !self.enabled {
      return None;
    }

    let found = self
      .entries
      .read()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
      .get(key)
      .cloned();

    match found {
      Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
      None => self.misses.fetch_add(1, Ordering::Relaxed),
    };
    found
  }

  /// Store a result. Only completed results are kept.
  pub fn put(&self, key: impl Into<String>, result: TaskResult) {
    if !self.enabled || !result.is_success() {
      return;
    }

    self
      .entries
      .write()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
      .insert(key.into(), result);
  }

  /// Drop every entry and reset the counters.
  pub fn clear(&self) {
    self
      .entries
      .write()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
      .clear();
    self.hits.store(0, Ordering::Relaxed);
    self.misses.store(0, Ordering::Relaxed);
  }

  pub fn len(&self) -> usize {
    self
      .entries
      .read()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
      .len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn stats(&self) -> CacheStats {
    CacheStats {
      hits: self.hits.load(Ordering::Relaxed),
      misses: self.misses.load(Ordering::Relaxed),
      entries: self.len(),
    }
  }
}

impl Default for ResultCache {
  fn default() -> Self {
    Self::disabled()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use taskweave_task_executor::{TaskError, TaskStatus};

  fn completed(id: &str) -> TaskResult {
    TaskResult {
      status: TaskStatus::Completed,
      value: Some(serde_json::json!(id)),
      attempts: 1,
      ..TaskResult::pending(id)
    }
  }

  fn failed(id: &str) -> TaskResult {
    TaskResult {
      status: TaskStatus::Failed,
      error: Some(TaskError::Execution {
        task_id: id.to_string(),
        message: "boom".to_string(),
      }),
      attempts: 1,
      ..TaskResult::pending(id)
    }
  }

  #[test]
  fn test_hit_and_miss_counters() {
    let cache = ResultCache::new(true);

    assert!(cache.get("a").is_none());
    cache.put("a", completed("a"));
    assert_eq!(cache.get("a"), Some(completed("a")));

    assert_eq!(
      cache.stats(),
      CacheStats {
        hits: 1,
        misses: 1,
        entries: 1,
      }
    );
  }

  #[test]
  fn test_clear_resets_entries_and_counters() {
    let cache = ResultCache::new(true);
    cache.put("a", completed("a"));
    cache.get("a");
    cache.get("b");

    cache.clear();

    assert!(cache.is_empty());
    assert_eq!(cache.stats(), CacheStats::default());
  }

  #[test]
  fn test_disabled_cache_is_bypassed() {
    let cache = ResultCache::disabled();
    cache.put("a", completed("a"));

    assert!(cache.get("a").is_none());
    assert!(cache.is_empty());
    assert_eq!(cache.stats(), CacheStats::default());
  }

  #[test]
  fn test_failed_results_are_not_cached() {
    let cache = ResultCache::new(true);
    cache.put("a", failed("a"));
    assert!(cache.is_empty());
  }
}
