//! Priority scheduling for taskweave.
//!
//! Tasks are queued by priority and dispatched to a [`TaskExecutor`] while
//! fewer than `max_concurrency` are running. Completed results can be
//! memoized by task id.
//!
//! [`TaskExecutor`]: taskweave_task_executor::TaskExecutor

mod cache;
mod error;
mod queue;
mod scheduler;

pub use cache::{CacheStats, ResultCache};
pub use error::SchedulerError;
pub use queue::PriorityQueue;
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerStats, TaskHandle};
