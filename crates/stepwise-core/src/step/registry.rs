//! Step registry for runtime handler lookup.
//!
//! Maps a step-type string to a factory that builds a fresh `BoxStepHandler`
//! for every run. Keys are matched case-insensitively and a trailing "Step"
//! is optional, so "LogStep", "logstep" and "log" resolve to the same entry.

use std::collections::HashMap;
use std::sync::Arc;

use super::box_handler::BoxStepHandler;
use super::builtin::{DelayStep, EmailStep, LogStep};
use super::handler::StepHandler;

type StepFactory = Arc<dyn Fn() -> BoxStepHandler + Send + Sync>;

/// Registry of step handler factories, indexed by normalized step type.
#[derive(Clone)]
pub struct StepRegistry {
    factories: HashMap<String, (String, StepFactory)>,
}

impl StepRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry preloaded with the built-in LogStep, DelayStep and EmailStep.
    pub fn with_builtin_steps() -> Self {
        let mut registry = Self::new();
        registry.register_handler("LogStep", || LogStep);
        registry.register_handler("DelayStep", || DelayStep);
        registry.register_handler("EmailStep", EmailStep::new);
        registry
    }

    /// Register a factory under `step_type`, replacing any previous entry.
    pub fn register<F>(&mut self, step_type: impl Into<String>, factory: F)
    where
        F: Fn() -> BoxStepHandler + Send + Sync + 'static,
    {
        let step_type = step_type.into();
        self.factories
            .insert(normalize(&step_type), (step_type, Arc::new(factory)));
    }

    /// Register a concrete handler type built by `make`.
    pub fn register_handler<T, F>(&mut self, step_type: impl Into<String>, make: F)
    where
        T: StepHandler + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.register(step_type, move || BoxStepHandler::new(make()));
    }

    /// Build a fresh handler for `step_type`, if registered.
    pub fn create(&self, step_type: &str) -> Option<BoxStepHandler> {
        self.factories
            .get(&normalize(step_type))
            .map(|(_, factory)| factory())
    }

    pub fn contains(&self, step_type: &str) -> bool {
        self.factories.contains_key(&normalize(step_type))
    }

    /// Registered step types, as given at registration, sorted.
    pub fn list_types(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.values().map(|(n, _)| n.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepRegistry")
            .field("types", &self.list_types())
            .finish()
    }
}

fn normalize(step_type: &str) -> String {
    let lower = step_type.trim().to_lowercase();
    match lower.strip_suffix("step") {
        Some(stem) if !stem.is_empty() => stem.to_string(),
        _ => lower,
    }
}
