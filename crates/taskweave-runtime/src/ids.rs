use std::sync::atomic::{AtomicU64, Ordering};

/// Generates identifiers for executions, pipeline runs and environments.
pub trait IdGenerator: Send + Sync {
  fn next_id(&self) -> String;
}

/// Random v4 uuids.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
  fn next_id(&self) -> String {
    uuid::Uuid::new_v4().to_string()
  }
}

/// Deterministic `{prefix}-{n}` ids starting at 1.
#[derive(Debug)]
pub struct SequentialIds {
  prefix: String,
  next: AtomicU64,
}

impl SequentialIds {
  pub fn new(prefix: impl Into<String>) -> Self {
    Self {
      prefix: prefix.into(),
      next: AtomicU64::new(1),
    }
  }
}

impl IdGenerator for SequentialIds {
  fn next_id(&self) -> String {
    let n = self.next.fetch_add(1, Ordering::Relaxed);
    format!("{}-{}", self.prefix, n)
  }
}
