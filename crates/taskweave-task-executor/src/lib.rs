//! Task execution for taskweave.
//!
//! This crate provides the [`TaskExecutor`], which runs one [`Task`] to a
//! terminal [`TaskResult`]. Each attempt races the worker against the task's
//! timeout and its cancellation token; failed attempts are retried with a
//! linearly growing delay.
//!
//! [`Task`]: taskweave_config::Task

mod error;
mod executor;
mod result;

pub use error::{ErrorKind, TaskError};
pub use executor::{ExecutorConfig, TaskExecutor};
pub use result::{TaskResult, TaskStatus};
