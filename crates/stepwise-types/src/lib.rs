//! Shared domain types for Stepwise.
//!
//! This crate contains the domain types used across the workflow engine:
//! workflow definitions, executions, scheduled jobs, notification events,
//! monitoring views, configuration and the repository error type.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod error;
pub mod event;
pub mod execution;
pub mod job;
pub mod monitoring;
pub mod workflow;
