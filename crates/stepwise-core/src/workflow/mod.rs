//! Durable workflow engine.
//!
//! - `engine` -- `WorkflowEngine`, `EngineError`, job dispatch
//! - `lifecycle` -- start, status, cancel, pause, resume
//! - `driver` -- advances an execution one step at a time
//! - `processor` -- runs a single step execution
//! - `context` -- configuration merging and step context assembly
//! - `retry` -- retry decision and exponential backoff
//! - `notify` -- notification sinks
//! - `builder` -- fluent workflow definitions and the demo workflow
//! - `monitoring` -- execution listings and the dashboard

pub mod builder;
pub mod context;
pub mod driver;
pub mod engine;
pub mod lifecycle;
pub mod monitoring;
pub mod notify;
pub mod processor;
pub mod retry;

#[cfg(test)]
mod tests;

pub use builder::{WorkflowBuilder, demo_workflow};
pub use driver::DriverOutcome;
pub use engine::{EngineError, WorkflowEngine};
pub use monitoring::MonitoringService;
pub use notify::{EventBusSink, NoopNotificationSink, NotificationSink, NotifyError};
pub use processor::StepDisposition;
pub use retry::{RetryDecision, RetryPolicy};
