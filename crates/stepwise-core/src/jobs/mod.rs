//! Deferred job execution.
//!
//! - [`scheduler`]: the `JobScheduler` / `JobQueue` ports
//! - [`memory`]: process-local queue
//! - [`worker`]: polling worker dispatching jobs to a `JobHandler`

pub mod memory;
pub mod scheduler;
pub mod worker;

pub use memory::InMemoryJobQueue;
pub use scheduler::{JobQueue, JobScheduler, SchedulerError};
pub use worker::{JobHandler, JobWorker};
