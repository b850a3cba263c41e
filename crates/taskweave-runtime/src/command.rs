//! Command lookup and the worker that dispatches through it.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::debug;

use crate::error::WorkerError;
use crate::worker::{WorkerExecutor, WorkerRequest};

/// Context passed to a command handler alongside its arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandContext {
  /// Id of the task or stage that invoked the command.
  pub request_id: String,
  pub kind: String,
}

/// An executable command.
#[async_trait]
pub trait CommandHandler: Send + Sync {
  async fn call(
    &self,
    args: serde_json::Value,
    context: CommandContext,
  ) -> Result<serde_json::Value, WorkerError>;
}

/// Maps a command name to its handler.
pub trait CommandRegistry: Send + Sync {
  fn get(&self, name: &str) -> Option<Arc<dyn CommandHandler>>;
}

/// Registry backed by an in-memory map.
#[derive(Clone, Default)]
pub struct InMemoryCommandRegistry {
  commands: Arc<RwLock<HashMap<String, Arc<dyn CommandHandler>>>>,
}

impl InMemoryCommandRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a handler, replacing any previous handler with the same name.
  pub fn register(&self, name: impl Into<String>, handler: Arc<dyn CommandHandler>) {
    let mut commands = self
      .commands
      .write()
      .unwrap_or_else(|poisoned| poisoned.into_inner());
    commands.insert(name.into(), handler);
  }

  /// Registered command names, sorted.
  pub fn names(&self) -> Vec<String> {
    let commands = self
      .commands
      .read()
      .unwrap_or_else(|poisoned| poisoned.into_inner());
    let mut names: Vec<String> = commands.keys().cloned().collect();
    names.sort();
    names
  }
}

impl CommandRegistry for InMemoryCommandRegistry {
  fn get(&self, name: &str) -> Option<Arc<dyn CommandHandler>> {
    let commands = self
      .commands
      .read()
      .unwrap_or_else(|poisoned| poisoned.into_inner());
    commands.get(name).cloned()
  }
}

/// A [`WorkerExecutor`] that resolves each request to a registered command.
///
/// The command name comes from `payload.command` and its arguments from
/// `payload.args`. When the payload names no command, the request kind is
/// used as the command name and the whole payload becomes the arguments.
pub struct CommandWorker<R: CommandRegistry> {
  registry: R,
}

impl<R: CommandRegistry> CommandWorker<R> {
  pub fn new(registry: R) -> Self {
    Self { registry }
  }

  pub fn registry(&self) -> &R {
    &self.registry
  }
}

#[async_trait]
impl<R: CommandRegistry> WorkerExecutor for CommandWorker<R> {
  async fn execute(&self, request: WorkerRequest) -> Result<serde_json::Value, WorkerError> {
    let (name, args) = match request.payload.get("command") {
      Some(serde_json::Value::String(name)) => (
        name.clone(),
        request
          .payload
          .get("args")
          .cloned()
          .unwrap_or(serde_json::Value::Null),
      ),
      Some(other) => {
        return Err(WorkerError::InvalidPayload {
          message: format!("`command` must be a string, got {}", other),
        });
      }
      None => (request.kind.clone(), request.payload.clone()),
    };

    let handler = self
      .registry
      .get(&name)
      .ok_or_else(|| WorkerError::CommandNotFound(name.clone()))?;

    debug!(request_id = %request.id, command = %name, "command_dispatched");

    handler
      .call(
        args,
        CommandContext {
          request_id: request.id,
          kind: request.kind,
        },
      )
      .await
  }
}
