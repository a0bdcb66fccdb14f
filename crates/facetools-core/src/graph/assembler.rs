//! Runs the registered steps against one request.

use super::context::{BuildContext, NodeIdAllocator};
use super::node::{FinishedGraph, NodeRef};
use super::step::{StepOutcome, StepRegistry};
use crate::config::AssemblerConfig;
use crate::error::FaceToolsError;
use crate::features::FeatureFlags;
use crate::params::ParameterStore;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Where a run is in its single pass over the steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyState {
    Idle,
    /// About to run (or running) the step at this index.
    Running(usize),
    Done,
    /// Stopped by an error from the step at this index.
    Aborted(usize),
}

impl AssemblyState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AssemblyState::Done | AssemblyState::Aborted(_))
    }
}

/// A step failed; nodes emitted before the failure are kept in `partial`.
#[derive(Debug, Error)]
#[error("Step '{step}' aborted graph assembly: {source}")]
pub struct AssemblyAborted {
    pub step: String,
    pub step_index: usize,
    #[source]
    pub source: FaceToolsError,
    pub partial: FinishedGraph,
}

impl AssemblyAborted {
    pub fn into_error(self) -> FaceToolsError {
        self.source
    }
}

/// Builds node graphs from a shared [`StepRegistry`].
#[derive(Debug, Clone)]
pub struct GraphAssembler {
    registry: Arc<StepRegistry>,
    node_id_base: usize,
}

impl GraphAssembler {
    pub fn new(registry: Arc<StepRegistry>) -> Self {
        Self {
            registry,
            node_id_base: AssemblerConfig::NODE_ID_BASE,
        }
    }

    pub fn with_node_id_base(mut self, base: usize) -> Self {
        self.node_id_base = base;
        self
    }

    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    /// Prepare a run without executing any step.
    pub fn start<'a>(
        &'a self,
        params: &'a mut dyn ParameterStore,
        features: &'a dyn FeatureFlags,
        initial_output: NodeRef,
    ) -> AssemblyRun<'a> {
        AssemblyRun {
            registry: &self.registry,
            ctx: BuildContext::new(
                params,
                features,
                initial_output,
                NodeIdAllocator::new(self.node_id_base),
            ),
            state: AssemblyState::Idle,
            applied: Vec::new(),
        }
    }

    /// Run every step in order. Parameters equal to their default may be
    /// removed from `params` along the way.
    pub fn assemble(
        &self,
        params: &mut dyn ParameterStore,
        features: &dyn FeatureFlags,
        initial_output: NodeRef,
    ) -> Result<FinishedGraph, AssemblyAborted> {
        self.start(params, features, initial_output).finish()
    }
}

/// One pass over the registry: `Idle → Running(i) → Done | Aborted(i)`.
pub struct AssemblyRun<'a> {
    registry: &'a StepRegistry,
    ctx: BuildContext<'a>,
    state: AssemblyState,
    applied: Vec<String>,
}

impl<'a> AssemblyRun<'a> {
    pub fn state(&self) -> AssemblyState {
        self.state
    }

    pub fn context(&self) -> &BuildContext<'a> {
        &self.ctx
    }

    /// Run the next step. Returns `None` once the run is terminal.
    pub fn advance(&mut self) -> Option<Result<StepOutcome, FaceToolsError>> {
        let index = match self.state {
            AssemblyState::Idle => 0,
            AssemblyState::Running(i) => i,
            AssemblyState::Done | AssemblyState::Aborted(_) => return None,
        };

        let registry = self.registry;
        let Some(step) = registry.steps().get(index) else {
            self.state = AssemblyState::Done;
            return None;
        };

        self.state = AssemblyState::Running(index);
        self.ctx.enter_module(index);
        match step.run(&mut self.ctx) {
            Ok(outcome) => {
                match outcome {
                    StepOutcome::Applied => {
                        debug!("Step '{}' applied", step.name());
                        self.applied.push(step.name().to_string());
                    }
                    StepOutcome::Skipped => debug!("Step '{}' skipped", step.name()),
                }
                self.state = if index + 1 < registry.len() {
                    AssemblyState::Running(index + 1)
                } else {
                    AssemblyState::Done
                };
                Some(Ok(outcome))
            }
            Err(e) => {
                warn!("Step '{}' failed: {}", step.name(), e);
                self.state = AssemblyState::Aborted(index);
                Some(Err(e))
            }
        }
    }

    /// Run the remaining steps and produce the graph.
    pub fn finish(mut self) -> Result<FinishedGraph, AssemblyAborted> {
        let mut failure = None;
        while let Some(result) = self.advance() {
            if let Err(e) = result {
                failure = Some(e);
                break;
            }
        }

        let state = self.state;
        let (nodes, output) = self.ctx.into_parts();
        let graph = FinishedGraph {
            nodes,
            output,
            applied_steps: self.applied,
        };

        match (state, failure) {
            (AssemblyState::Aborted(index), Some(source)) => Err(AssemblyAborted {
                step: self.registry.steps()[index].name().to_string(),
                step_index: index,
                source,
                partial: graph,
            }),
            _ => {
                info!(
                    "Assembled {} node(s) from {} step(s)",
                    graph.nodes.len(),
                    graph.applied_steps.len()
                );
                Ok(graph)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureSet;
    use crate::graph::node::{NodeId, NodeInputs};
    use crate::graph::step::Step;
    use crate::params::ParameterSet;

    fn chain_step(name: &'static str, priority: f64) -> Step {
        Step::new(name, priority, move |ctx| {
            let input = ctx.current_output().clone();
            let id = ctx.create_node(name, NodeInputs::new().link("image", input));
            ctx.set_current_output(NodeRef::new(id, 0));
            Ok(StepOutcome::Applied)
        })
    }

    fn base_output() -> NodeRef {
        NodeRef::new(NodeId::new("9"), 0)
    }

    #[test]
    fn test_empty_registry_is_done_immediately() {
        let assembler = GraphAssembler::new(Arc::new(StepRegistry::new()));
        let mut params = ParameterSet::new();
        let features = FeatureSet::new();
        let graph = assembler
            .assemble(&mut params, &features, base_output())
            .unwrap();
        assert!(graph.nodes.is_empty());
        assert_eq!(graph.output, base_output());
    }

    #[test]
    fn test_state_transitions() {
        let mut registry = StepRegistry::new();
        registry.register(chain_step("A", 1.0)).unwrap();
        registry.register(chain_step("B", 2.0)).unwrap();
        let assembler = GraphAssembler::new(Arc::new(registry));
        let mut params = ParameterSet::new();
        let features = FeatureSet::new();

        let mut run = assembler.start(&mut params, &features, base_output());
        assert_eq!(run.state(), AssemblyState::Idle);
        assert!(matches!(run.advance(), Some(Ok(StepOutcome::Applied))));
        assert_eq!(run.state(), AssemblyState::Running(1));
        assert!(run.advance().is_some());
        assert_eq!(run.state(), AssemblyState::Done);
        assert!(run.advance().is_none());
        assert!(run.state().is_terminal());
    }

    #[test]
    fn test_current_output_forms_linear_chain() {
        let mut registry = StepRegistry::new();
        registry.register(chain_step("B", 2.0)).unwrap();
        registry.register(chain_step("A", 1.0)).unwrap();
        let assembler = GraphAssembler::new(Arc::new(registry));
        let mut params = ParameterSet::new();
        let features = FeatureSet::new();

        let graph = assembler
            .assemble(&mut params, &features, base_output())
            .unwrap();

        assert_eq!(graph.applied_steps, vec!["A", "B"]);
        assert_eq!(graph.nodes[0].input_edges().next().unwrap().1, &base_output());
        assert_eq!(
            graph.nodes[1].input_edges().next().unwrap().1,
            &NodeRef::new(graph.nodes[0].id.clone(), 0)
        );
        assert_eq!(graph.output, NodeRef::new(graph.nodes[1].id.clone(), 0));
    }

    #[test]
    fn test_abort_keeps_earlier_nodes() {
        let mut registry = StepRegistry::new();
        registry.register(chain_step("one", 1.0)).unwrap();
        registry
            .register(Step::new("two", 2.0, |ctx| {
                ctx.create_node("Half", NodeInputs::new());
                Err(FaceToolsError::FeatureUnavailable {
                    step: "two".into(),
                    feature: "reactor".into(),
                })
            }))
            .unwrap();
        registry.register(chain_step("three", 3.0)).unwrap();
        let assembler = GraphAssembler::new(Arc::new(registry));
        let mut params = ParameterSet::new();
        let features = FeatureSet::new();

        let aborted = assembler
            .assemble(&mut params, &features, base_output())
            .unwrap_err();

        assert_eq!(aborted.step, "two");
        assert_eq!(aborted.step_index, 1);
        let types: Vec<_> = aborted.partial.nodes.iter().map(|n| n.class_type.as_str()).collect();
        assert_eq!(types, vec!["one", "Half"]);
        assert!(matches!(
            aborted.into_error(),
            FaceToolsError::FeatureUnavailable { .. }
        ));
        // The registry is untouched and can run again
        assert_eq!(assembler.registry().len(), 3);
    }

    #[test]
    fn test_identical_runs_produce_identical_ids() {
        let mut registry = StepRegistry::new();
        registry.register(chain_step("A", 1.0)).unwrap();
        registry
            .register(Step::new("skip", 1.5, |_| Ok(StepOutcome::Skipped)))
            .unwrap();
        registry.register(chain_step("B", 2.0)).unwrap();
        let assembler = GraphAssembler::new(Arc::new(registry));
        let features = FeatureSet::new();

        let mut first_params = ParameterSet::new();
        let first = assembler
            .assemble(&mut first_params, &features, base_output())
            .unwrap();
        let mut second_params = ParameterSet::new();
        let second = assembler
            .assemble(&mut second_params, &features, base_output())
            .unwrap();

        assert_eq!(first.node_ids(), second.node_ids());
        // Module index follows registry position, skipped steps included
        assert_eq!(first.node_ids()[0].as_str(), "100000");
        assert_eq!(first.node_ids()[1].as_str(), "102000");
    }
}
