//! Engine logic and storage/scheduling trait definitions for Stepwise.
//!
//! This crate defines the "ports" (repository and job queue traits) that the
//! infrastructure layer implements, plus in-memory implementations of both.
//! It depends only on `stepwise-types` -- never on `stepwise-infra` or any
//! database crate.

pub mod clock;
pub mod event;
pub mod jobs;
pub mod repository;
pub mod step;
pub mod workflow;
