//! Staged pipelines for taskweave.
//!
//! A [`PipelineRunner`] walks a [`Pipeline`](taskweave_config::Pipeline)
//! stage by stage:
//!
//! - `command` stages hand their config to the worker as a command payload.
//! - `parallel` stages fan `config.tasks` out concurrently and never fail for
//!   individual sub-task failures.
//! - `condition` stages evaluate a structured condition against the run's
//!   scope and optionally run `config.on_true` / `config.on_false`.
//! - `generic` stages hand `{name, config, context}` to the worker.
//!
//! Each stage's `error_strategy` decides whether a failure aborts the run
//! (`fail-fast`), is recorded but hidden from later stages (`skip`), or is
//! recorded and exposed (`continue`).

pub mod condition;
mod context;
mod error;
mod hooks;
mod result;
mod runner;

pub use context::PipelineExecutionContext;
pub use error::{PipelineError, StageError};
pub use hooks::{NoopHooks, StageHooks};
pub use result::{PipelineResult, StageResult, StageStatus};
pub use runner::{PipelineConfig, PipelineOptions, PipelineRunner};
