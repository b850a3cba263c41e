//! Built-in commands available to plans run from the CLI.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use taskweave_runtime::{CommandContext, CommandHandler, InMemoryCommandRegistry, WorkerError};

/// Registry holding every built-in command.
///
/// `task` and `generic` are registered under the default task kind and the
/// generic stage kind, so payloads that name no command still resolve.
pub fn builtin_registry() -> InMemoryCommandRegistry {
  let registry = InMemoryCommandRegistry::new();
  registry.register("echo", Arc::new(Echo));
  registry.register("sleep", Arc::new(Sleep));
  registry.register("fail", Arc::new(Fail));
  registry.register("task", Arc::new(Echo));
  registry.register("generic", Arc::new(Echo));
  registry
}

/// Returns its arguments unchanged.
struct Echo;

#[async_trait]
impl CommandHandler for Echo {
  async fn call(&self, args: Value, context: CommandContext) -> Result<Value, WorkerError> {
    Ok(json!({ "id": context.request_id, "output": args }))
  }
}

/// Sleeps for `args` milliseconds, given as a number or `{ "ms": n }`.
struct Sleep;

#[async_trait]
impl CommandHandler for Sleep {
  async fn call(&self, args: Value, _context: CommandContext) -> Result<Value, WorkerError> {
    let ms = args
      .as_u64()
      .or_else(|| args.get("ms").and_then(Value::as_u64))
      .ok_or_else(|| WorkerError::InvalidPayload {
        message: format!("sleep expects a duration in ms, got {}", args),
      })?;

    tokio::time::sleep(Duration::from_millis(ms)).await;
    Ok(json!({ "slept_ms": ms }))
  }
}

/// Always fails, with `args` as the message when it is a string.
struct Fail;

#[async_trait]
impl CommandHandler for Fail {
  async fn call(&self, args: Value, _context: CommandContext) -> Result<Value, WorkerError> {
    let message = args.as_str().unwrap_or("command failed");
    Err(WorkerError::failed(message))
  }
}
