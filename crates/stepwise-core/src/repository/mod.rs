//! Repository trait definitions (ports).
//!
//! `WorkflowRepository` is the storage interface the infrastructure layer
//! (stepwise-infra) implements. The core crate never depends on any specific
//! storage technology; `InMemoryWorkflowRepository` is the process-local
//! implementation.

pub mod memory;
pub mod workflow;

pub use memory::InMemoryWorkflowRepository;
pub use workflow::WorkflowRepository;
