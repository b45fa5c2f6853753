//! In-process event distribution.
//!
//! Provides an `EventBus` that fans `WorkflowEvent`s out to subscribers via a
//! `tokio::sync::broadcast` channel.

pub mod bus;

pub use bus::EventBus;
