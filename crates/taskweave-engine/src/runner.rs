//! Plan runner with channel-based submission.
//!
//! The `PlanRunner` owns an mpsc channel of plans and executes each one it
//! receives on a shared [`ExecutionEngine`].

use std::sync::Arc;

use taskweave_config::ExecutionPlan;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::engine::ExecutionEngine;
use crate::error::EngineError;
use crate::events::ExecutionNotifier;
use crate::result::ExecutionResult;

/// Executes plans as they arrive on its channel.
///
/// # Usage
///
/// ```ignore
/// let runner = PlanRunner::new(engine);
///
/// // Hand the sender to whatever produces plans
/// let sender = runner.sender();
///
/// // Start the execution loop
/// let cancel = CancellationToken::new();
/// runner.start(cancel).await;
/// ```
pub struct PlanRunner<N: ExecutionNotifier> {
  sender: mpsc::Sender<ExecutionPlan>,
  receiver: mpsc::Receiver<ExecutionPlan>,
  engine: Arc<ExecutionEngine<N>>,
}

impl<N: ExecutionNotifier + 'static> PlanRunner<N> {
  pub fn new(engine: Arc<ExecutionEngine<N>>) -> Self {
    Self::with_buffer_size(engine, 100)
  }

  pub fn with_buffer_size(engine: Arc<ExecutionEngine<N>>, buffer_size: usize) -> Self {
    let (sender, receiver) = mpsc::channel(buffer_size);
    Self {
      sender,
      receiver,
      engine,
    }
  }

  /// A sender handle for submitting plans.
  pub fn sender(&self) -> mpsc::Sender<ExecutionPlan> {
    self.sender.clone()
  }

  /// Queue a plan for execution.
  pub async fn submit(&self, plan: ExecutionPlan) -> Result<(), EngineError> {
    self
      .sender
      .send(plan)
      .await
      .map_err(|_| EngineError::Terminated)
  }

  /// Run the loop until `cancel` fires or every sender is dropped.
  ///
  /// At most the engine's `max_concurrent_executions` plans run at once.
  /// While that many are in flight the runner stops receiving, so queued
  /// plans wait in the channel instead of being rejected. Cancelling
  /// `cancel` cancels the executions still in flight.
  pub async fn start(self, cancel: CancellationToken) {
    let Self {
      sender,
      mut receiver,
      engine,
    } = self;
    // Only external senders keep the loop alive.
    drop(sender);

    let limit = engine.config().max_concurrent_executions.max(1);
    info!(limit, "plan runner started");
    let mut in_flight = tokio::task::JoinSet::new();

    loop {
      while let Some(joined) = in_flight.try_join_next() {
        report(joined);
      }

      if in_flight.len() >= limit {
        tokio::select! {
          _ = cancel.cancelled() => {
            info!("plan runner cancelled");
            engine.cancel_all();
            break;
          }
          Some(joined) = in_flight.join_next() => report(joined),
        }
        continue;
      }

      tokio::select! {
        _ = cancel.cancelled() => {
          info!("plan runner cancelled");
          engine.cancel_all();
          break;
        }
        plan = receiver.recv() => {
          let Some(plan) = plan else {
            info!("plan runner channel closed");
            break;
          };
          let engine = engine.clone();
          in_flight.spawn(async move {
            let plan_id = plan.id.clone();
            (plan_id, engine.execute(&plan).await)
          });
        }
      }
    }

    while let Some(joined) = in_flight.join_next().await {
      report(joined);
    }
  }

  /// Execute one plan directly, bypassing the channel.
  pub async fn execute_once(&self, plan: &ExecutionPlan) -> Result<ExecutionResult, EngineError> {
    self.engine.execute(plan).await
  }

  pub fn engine(&self) -> &ExecutionEngine<N> {
    &self.engine
  }
}

fn report(joined: Result<(String, Result<ExecutionResult, EngineError>), tokio::task::JoinError>) {
  match joined {
    Ok((plan_id, outcome)) => log_outcome(&plan_id, &outcome),
    Err(e) => error!(error = %e, "plan execution task panicked"),
  }
}

fn log_outcome(plan_id: &str, outcome: &Result<ExecutionResult, EngineError>) {
  match outcome {
    Ok(result) if result.success => info!(
      plan_id = %plan_id,
      execution_id = %result.execution_id,
      duration_ms = result.metadata.duration_ms,
      "plan execution completed"
    ),
    Ok(result) => warn!(
      plan_id = %plan_id,
      execution_id = %result.execution_id,
      final_status = ?result.metadata.final_status,
      "plan execution did not complete"
    ),
    Err(e) => error!(plan_id = %plan_id, error = %e, "plan execution rejected"),
  }
}
