//! Registered graph-building steps and their ordering.

use super::context::BuildContext;
use crate::error::{FaceToolsError, Result};
use crate::features::Feature;
use crate::params::ParameterStore;
use std::cmp::Ordering;
use std::fmt;
use tracing::debug;

/// What a step did with the build context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The step added nodes.
    Applied,
    /// The step's parameters were absent; nothing was requested.
    Skipped,
}

pub type StepAction = dyn Fn(&mut BuildContext<'_>) -> Result<StepOutcome> + Send + Sync;
pub type ModelRequirements = dyn Fn(&dyn ParameterStore) -> Result<Vec<String>> + Send + Sync;

/// A unit of graph-building logic with a fixed priority.
pub struct Step {
    name: String,
    priority: f64,
    feature: Option<Feature>,
    action: Box<StepAction>,
    required_models: Option<Box<ModelRequirements>>,
}

impl Step {
    pub fn new<F>(name: impl Into<String>, priority: f64, action: F) -> Self
    where
        F: Fn(&mut BuildContext<'_>) -> Result<StepOutcome> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            priority,
            feature: None,
            action: Box::new(action),
            required_models: None,
        }
    }

    /// Backend feature this step needs when its parameters are present.
    pub fn with_feature(mut self, feature: Feature) -> Self {
        self.feature = Some(feature);
        self
    }

    /// Logical model ids this step will reference for the given parameters.
    pub fn with_required_models<F>(mut self, models: F) -> Self
    where
        F: Fn(&dyn ParameterStore) -> Result<Vec<String>> + Send + Sync + 'static,
    {
        self.required_models = Some(Box::new(models));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> f64 {
        self.priority
    }

    pub fn feature(&self) -> Option<&Feature> {
        self.feature.as_ref()
    }

    pub fn run(&self, ctx: &mut BuildContext<'_>) -> Result<StepOutcome> {
        (self.action)(ctx)
    }

    pub fn required_models(&self, params: &dyn ParameterStore) -> Result<Vec<String>> {
        match &self.required_models {
            Some(models) => models(params),
            None => Ok(Vec::new()),
        }
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("feature", &self.feature)
            .finish_non_exhaustive()
    }
}

/// Process-wide ordered list of steps, built once at startup.
///
/// Steps are kept sorted by priority; equal priorities keep registration
/// order, so the order is total and stable across runs.
#[derive(Debug, Default)]
pub struct StepRegistry {
    steps: Vec<Step>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a step, validating its name, priority and feature id.
    pub fn register(&mut self, step: Step) -> Result<()> {
        let invalid = |message: &str| FaceToolsError::InvalidStep {
            step: step.name.clone(),
            message: message.to_string(),
        };

        if step.name.trim().is_empty() {
            return Err(invalid("name must not be empty"));
        }
        if !step.priority.is_finite() {
            return Err(invalid("priority must be a finite number"));
        }
        if self.steps.iter().any(|s| s.name == step.name) {
            return Err(invalid("a step with this name is already registered"));
        }
        if let Some(feature) = &step.feature {
            feature
                .validate()
                .map_err(|e| invalid(&e.to_string()))?;
        }

        let position = self
            .steps
            .partition_point(|s| s.priority.total_cmp(&step.priority) != Ordering::Greater);
        debug!(
            "Registered step '{}' at priority {} (position {})",
            step.name, step.priority, position
        );
        self.steps.insert(position, step);
        Ok(())
    }

    /// Steps in execution order.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Every model any step needs for these parameters, deduplicated in
    /// execution order.
    pub fn required_models(&self, params: &dyn ParameterStore) -> Result<Vec<String>> {
        let mut models: Vec<String> = Vec::new();
        for step in &self.steps {
            for model in step.required_models(params)? {
                if !models.contains(&model) {
                    models.push(model);
                }
            }
        }
        Ok(models)
    }
}
