//! Per-request build state threaded through every step.

use super::node::{GraphNode, NodeId, NodeInputs, NodeRef};
use crate::error::{FaceToolsError, Result};
use crate::features::{Feature, FeatureFlags};
use crate::params::ParameterStore;
use tracing::debug;

/// Hands out node ids from `(module, slot)` so identical requests produce
/// identical ids and a caching engine can reuse earlier results.
#[derive(Debug, Clone)]
pub struct NodeIdAllocator {
    base: usize,
    module: usize,
    next_slot: usize,
}

impl NodeIdAllocator {
    pub fn new(base: usize) -> Self {
        Self {
            base,
            module: 0,
            next_slot: 0,
        }
    }

    /// Start allocating for the step at `module` in the sorted registry.
    pub fn enter_module(&mut self, module: usize) {
        self.module = module;
        self.next_slot = 0;
    }

    pub fn next_id(&mut self) -> NodeId {
        let id = NodeId::generated(self.base, self.module, self.next_slot);
        self.next_slot += 1;
        id
    }
}

/// Mutable state for one graph assembly.
///
/// Owned by a single run; steps read parameters, add nodes, and move the
/// current output forward.
pub struct BuildContext<'a> {
    params: &'a mut dyn ParameterStore,
    features: &'a dyn FeatureFlags,
    current_output: NodeRef,
    nodes: Vec<GraphNode>,
    ids: NodeIdAllocator,
}

impl<'a> BuildContext<'a> {
    pub fn new(
        params: &'a mut dyn ParameterStore,
        features: &'a dyn FeatureFlags,
        current_output: NodeRef,
        ids: NodeIdAllocator,
    ) -> Self {
        Self {
            params,
            features,
            current_output,
            nodes: Vec::new(),
            ids,
        }
    }

    pub fn params(&self) -> &dyn ParameterStore {
        &*self.params
    }

    pub fn params_mut(&mut self) -> &mut dyn ParameterStore {
        &mut *self.params
    }

    pub fn is_supported(&self, feature: &Feature) -> bool {
        self.features.is_supported(feature)
    }

    /// Fail with [`FaceToolsError::FeatureUnavailable`] unless `feature` is
    /// supported. Call only after the step's parameters were found.
    pub fn require_feature(&self, step: &str, feature: &Feature) -> Result<()> {
        if self.is_supported(feature) {
            Ok(())
        } else {
            Err(FaceToolsError::FeatureUnavailable {
                step: step.to_string(),
                feature: feature.to_string(),
            })
        }
    }

    pub fn current_output(&self) -> &NodeRef {
        &self.current_output
    }

    pub fn set_current_output(&mut self, output: NodeRef) {
        debug!("Current output moved to {}", output);
        self.current_output = output;
    }

    /// Append a node and return its id.
    pub fn create_node(&mut self, class_type: &str, inputs: NodeInputs) -> NodeId {
        let id = self.ids.next_id();
        self.nodes.push(GraphNode::new(id.clone(), class_type, inputs));
        id
    }

    /// Append a node that loads a base64-encoded image; returns its image output.
    pub fn create_load_image_node(&mut self, image_base64: &str) -> NodeRef {
        let id = self.create_node(
            "SwarmLoadImageB64",
            NodeInputs::new().value("image_base64", image_base64),
        );
        NodeRef::new(id, 0)
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub(crate) fn enter_module(&mut self, module: usize) {
        self.ids.enter_module(module);
    }

    pub(crate) fn into_parts(self) -> (Vec<GraphNode>, NodeRef) {
        (self.nodes, self.current_output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureSet;
    use crate::params::ParameterSet;

    #[test]
    fn test_allocator_resets_slot_per_module() {
        let mut ids = NodeIdAllocator::new(100);
        ids.enter_module(0);
        assert_eq!(ids.next_id().as_str(), "100000");
        assert_eq!(ids.next_id().as_str(), "100001");
        ids.enter_module(3);
        assert_eq!(ids.next_id().as_str(), "103000");
    }

    #[test]
    fn test_require_feature() {
        let mut params = ParameterSet::new();
        let features = FeatureSet::new().with(Feature::Reactor);
        let ctx = BuildContext::new(
            &mut params,
            &features,
            NodeRef::new(NodeId::new("9"), 0),
            NodeIdAllocator::new(100),
        );

        assert!(ctx.require_feature("ReActor", &Feature::Reactor).is_ok());
        assert!(matches!(
            ctx.require_feature("FaceRestoreCF", &Feature::FaceRestoration),
            Err(FaceToolsError::FeatureUnavailable { .. })
        ));
    }

    #[test]
    fn test_create_node_appends_in_order() {
        let mut params = ParameterSet::new();
        let features = FeatureSet::new();
        let mut ctx = BuildContext::new(
            &mut params,
            &features,
            NodeRef::new(NodeId::new("9"), 0),
            NodeIdAllocator::new(100),
        );

        let a = ctx.create_node("A", NodeInputs::new());
        let image = ctx.create_load_image_node("aGVsbG8=");
        assert_eq!(ctx.nodes().len(), 2);
        assert_eq!(ctx.nodes()[0].id, a);
        assert_eq!(ctx.nodes()[1].class_type, "SwarmLoadImageB64");
        assert_eq!(image.slot, 0);
        assert_eq!(ctx.current_output().node.as_str(), "9");
    }
}
