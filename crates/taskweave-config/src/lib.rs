//! Taskweave Config
//!
//! This crate contains the serializable definitions consumed by the taskweave
//! engine: tasks, execution plans, pipelines and the engine configuration.
//!
//! Plans can be loaded from:
//! - JSON files (via the CLI with `taskweave run plan.json`)
//! - Any other source that deserializes into [`ExecutionPlan`]
//!
//! The engine validates a plan with [`ExecutionPlan::validate`] before any
//! work is scheduled.
//!
//! # Example
//!
//! ```json
//! {
//!   "id": "nightly",
//!   "strategy": "sequential",
//!   "fail_fast": true,
//!   "tasks": [
//!     { "id": "build", "payload": { "command": "echo", "args": "build" } },
//!     { "id": "test", "priority": 5, "max_retries": 3, "dependencies": ["build"] }
//!   ]
//! }
//! ```

mod engine;
mod error;
mod pipeline;
mod plan;
mod task;
mod validate;

pub use engine::EngineConfig;
pub use error::ValidationError;
pub use pipeline::{Condition, ConditionOperator, ErrorStrategy, FieldCondition, Pipeline, Stage, StageKind};
pub use plan::{ExecutionPlan, PlanStrategy};
pub use task::Task;
