//! One generation request end to end: provision, assemble, emit.

use crate::backend::BackendRegistry;
use crate::error::Result;
use crate::features::FeatureFlags;
use crate::graph::{FinishedGraph, GraphAssembler, NodeGraphSink, NodeRef, StepRegistry};
use crate::params::ParameterSet;
use crate::provisioner::{ProvisionReport, Provisioner};
use std::sync::Arc;
use tracing::{info, warn};

/// Result of a successful generation.
#[derive(Debug, Clone)]
pub struct Generation {
    pub graph: FinishedGraph,
    /// The request's parameters after default pruning.
    pub params: ParameterSet,
    pub provisioned: Vec<ProvisionReport>,
}

/// Ties the step registry, the provisioner, and the known backends together.
#[derive(Clone)]
pub struct Generator {
    assembler: GraphAssembler,
    provisioner: Provisioner,
    backends: Arc<dyn BackendRegistry>,
}

impl Generator {
    pub fn new(
        steps: Arc<StepRegistry>,
        provisioner: Provisioner,
        backends: Arc<dyn BackendRegistry>,
    ) -> Self {
        Self {
            assembler: GraphAssembler::new(steps),
            provisioner,
            backends,
        }
    }

    pub fn with_assembler(mut self, assembler: GraphAssembler) -> Self {
        self.assembler = assembler;
        self
    }

    pub fn assembler(&self) -> &GraphAssembler {
        &self.assembler
    }

    pub fn provisioner(&self) -> &Provisioner {
        &self.provisioner
    }

    /// Models the request will reference, across all steps.
    pub fn required_models(&self, params: &ParameterSet) -> Result<Vec<String>> {
        self.assembler.registry().required_models(params)
    }

    /// Provision required models on every usable backend, assemble the graph,
    /// and hand it to `sink`.
    ///
    /// Provisioning errors and aborted assemblies fail the request; the sink
    /// only sees complete graphs.
    pub async fn generate(
        &self,
        mut params: ParameterSet,
        features: &dyn FeatureFlags,
        initial_output: NodeRef,
        sink: &mut dyn NodeGraphSink,
    ) -> Result<Generation> {
        let models = self.required_models(&params)?;
        let provisioned = self
            .provisioner
            .ensure_models_for_backends(&models, self.backends.as_ref())
            .await?;

        let graph = self
            .assembler
            .assemble(&mut params, features, initial_output)
            .map_err(|aborted| {
                warn!(
                    "Discarding {} node(s) from aborted assembly",
                    aborted.partial.nodes.len()
                );
                aborted.into_error()
            })?;

        sink.accept(&graph)?;
        info!(
            "Generated graph with {} node(s), {} model check(s)",
            graph.nodes.len(),
            provisioned.len()
        );
        Ok(Generation {
            graph,
            params,
            provisioned,
        })
    }
}
