//! Infrastructure layer for Stepwise.
//!
//! Contains the durable implementations of the ports defined in
//! `stepwise-core`: the SQLite workflow repository, the SQLite job queue and
//! the database pool, plus the `config.toml` loader.

pub mod config;
pub mod sqlite;
