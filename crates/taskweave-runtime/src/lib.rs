//! Taskweave Runtime
//!
//! Capabilities the orchestration core consumes but does not implement:
//!
//! - [`WorkerExecutor`]: performs the actual work for a task or stage. This
//!   is the seam where a thread pool, process pool or remote worker plugs in.
//! - [`CommandRegistry`]: maps a command name to a handler. [`CommandWorker`]
//!   adapts a registry into a [`WorkerExecutor`].
//! - [`EnvironmentProvisioner`]: hands out one [`Environment`] per plan
//!   execution and releases it afterwards.
//! - [`Clock`] and [`IdGenerator`]: injectable so runs are reproducible in
//!   tests.

mod clock;
mod command;
mod environment;
mod error;
mod ids;
mod worker;

pub use clock::{Clock, SystemClock};
pub use command::{
  CommandContext, CommandHandler, CommandRegistry, CommandWorker, InMemoryCommandRegistry,
};
pub use environment::{
  Environment, EnvironmentProvisioner, LocalProvisioner, ResourceLimits, SecurityPolicy,
};
pub use error::{ProvisionError, WorkerError};
pub use ids::{IdGenerator, SequentialIds, UuidGenerator};
pub use worker::{WorkerExecutor, WorkerRequest};
