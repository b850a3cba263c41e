//! Taskweave Execution Engine
//!
//! This crate provides the top-level orchestrator for taskweave. It accepts
//! an [`ExecutionPlan`](taskweave_config::ExecutionPlan) and runs it with the
//! plan's strategy, enforcing a cap on concurrent executions and keeping
//! cumulative metrics.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        PlanRunner                           │
//! │  - owns mpsc channel of plans                               │
//! │  - start(cancel) runs the submission loop                   │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     ExecutionEngine                         │
//! │  - execute(plan) → ExecutionResult                          │
//! │  - capacity, environments, metrics, events                  │
//! └─────────────────────────────────────────────────────────────┘
//!               │                               │
//!               ▼                               ▼
//! ┌───────────────────────────┐   ┌───────────────────────────┐
//! │        Scheduler          │   │      PipelineRunner       │
//! │  sequential / parallel    │   │  staged pipelines         │
//! └───────────────────────────┘   └───────────────────────────┘
//!               │                               │
//!               └───────────────┬───────────────┘
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TaskExecutor                           │
//! │  - timeout, retry with backoff, cancellation                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use taskweave_engine::{ChannelNotifier, ExecutionEngine};
//!
//! let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
//! let engine = ExecutionEngine::with_notifier(
//!     EngineConfig::default(),
//!     worker,
//!     Arc::new(LocalProvisioner::new("/tmp/taskweave")),
//!     ChannelNotifier::new(tx),
//! );
//!
//! let result = engine.execute(&plan).await?;
//! println!("{:?}", result.metadata.final_status);
//! ```

mod context;
mod engine;
mod error;
mod events;
mod metrics;
mod result;
mod runner;

pub use context::{ContextMetrics, ExecutionContext};
pub use engine::ExecutionEngine;
pub use error::EngineError;
pub use events::{ChannelNotifier, ExecutionEvent, ExecutionNotifier, FanoutNotifier, NoopNotifier};
pub use metrics::{ExecutionMetrics, MetricsAggregator};
pub use result::{ExecutionMetadata, ExecutionResult, FinalStatus};
pub use runner::PlanRunner;
