//! BoxStepHandler -- object-safe dynamic dispatch wrapper for StepHandler.
//!
//! 1. `StepHandlerDyn` is an object-safe mirror of `StepHandler` with boxed futures
//! 2. Blanket-impl `StepHandlerDyn` for all `T: StepHandler`
//! 3. `BoxStepHandler` wraps `Box<dyn StepHandlerDyn>` and delegates

use std::future::Future;
use std::pin::Pin;

use super::context::StepContext;
use super::handler::{StepError, StepHandler, StepOutcome};

/// Object-safe version of [`StepHandler`] with boxed futures.
pub trait StepHandlerDyn: Send + Sync {
    fn step_type(&self) -> &str;

    fn validate_input_boxed<'a>(
        &'a self,
        ctx: &'a StepContext,
    ) -> Pin<Box<dyn Future<Output = Result<(), StepError>> + Send + 'a>>;

    fn can_execute_boxed<'a>(
        &'a self,
        ctx: &'a StepContext,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>>;

    fn execute_boxed<'a>(
        &'a self,
        ctx: &'a StepContext,
    ) -> Pin<Box<dyn Future<Output = StepOutcome> + Send + 'a>>;
}

impl<T: StepHandler> StepHandlerDyn for T {
    fn step_type(&self) -> &str {
        StepHandler::step_type(self)
    }

    fn validate_input_boxed<'a>(
        &'a self,
        ctx: &'a StepContext,
    ) -> Pin<Box<dyn Future<Output = Result<(), StepError>> + Send + 'a>> {
        Box::pin(self.validate_input(ctx))
    }

    fn can_execute_boxed<'a>(
        &'a self,
        ctx: &'a StepContext,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        Box::pin(self.can_execute(ctx))
    }

    fn execute_boxed<'a>(
        &'a self,
        ctx: &'a StepContext,
    ) -> Pin<Box<dyn Future<Output = StepOutcome> + Send + 'a>> {
        Box::pin(self.execute(ctx))
    }
}

/// Type-erased step handler, as produced by the `StepRegistry`.
pub struct BoxStepHandler {
    inner: Box<dyn StepHandlerDyn + Send + Sync>,
}

impl BoxStepHandler {
    pub fn new<T: StepHandler + 'static>(handler: T) -> Self {
        Self {
            inner: Box::new(handler),
        }
    }

    pub fn step_type(&self) -> &str {
        self.inner.step_type()
    }

    pub async fn validate_input(&self, ctx: &StepContext) -> Result<(), StepError> {
        self.inner.validate_input_boxed(ctx).await
    }

    pub async fn can_execute(&self, ctx: &StepContext) -> bool {
        self.inner.can_execute_boxed(ctx).await
    }

    pub async fn execute(&self, ctx: &StepContext) -> StepOutcome {
        self.inner.execute_boxed(ctx).await
    }
}

impl std::fmt::Debug for BoxStepHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxStepHandler")
            .field("step_type", &self.step_type())
            .finish()
    }
}
