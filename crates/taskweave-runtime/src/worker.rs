use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::WorkerError;

/// A unit of work handed to a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRequest {
  /// Task or stage id the request belongs to.
  pub id: String,
  /// Task kind or stage kind, e.g. "command".
  pub kind: String,
  pub payload: serde_json::Value,
}

impl WorkerRequest {
  pub fn new(id: impl Into<String>, kind: impl Into<String>, payload: serde_json::Value) -> Self {
    Self {
      id: id.into(),
      kind: kind.into(),
      payload,
    }
  }
}

/// Pluggable worker-execution capability.
///
/// The orchestration core never assumes how work is performed. Implementations
/// may run in-process, hand off to a pool, or call out over the network. The
/// returned future may be dropped at any await point when the caller times
/// out or is cancelled.
#[async_trait]
pub trait WorkerExecutor: Send + Sync {
  async fn execute(&self, request: WorkerRequest) -> Result<serde_json::Value, WorkerError>;
}
