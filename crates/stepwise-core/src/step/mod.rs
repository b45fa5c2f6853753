//! Step handlers: the contract, dynamic dispatch, the registry and the
//! built-in step types.

pub mod box_handler;
pub mod builtin;
pub mod context;
pub mod handler;
pub mod registry;

pub use box_handler::BoxStepHandler;
pub use context::StepContext;
pub use handler::{StepError, StepHandler, StepOutcome};
pub use registry::StepRegistry;
