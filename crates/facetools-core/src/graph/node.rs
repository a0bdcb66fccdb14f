//! Node graph data types.

use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, Serializer};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of a node in the engine's prompt.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(String);

impl NodeId {
    /// Wrap an id chosen by the host, e.g. the final node of its base graph.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Deterministic id for the `slot`-th node created by module `module`.
    ///
    /// Rendered as `{base + module}{slot:03}`, so module 0 with base 100 yields
    /// `100000`, `100001`, ... and module 1 yields `101000`, ...
    pub fn generated(base: usize, module: usize, slot: usize) -> Self {
        Self(format!("{}{:03}", base + module, slot))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        String::deserialize(deserializer).map(NodeId)
    }
}

/// One output slot of one node. Serialized as `[node_id, slot]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeRef {
    pub node: NodeId,
    pub slot: u32,
}

impl NodeRef {
    pub fn new(node: NodeId, slot: u32) -> Self {
        Self { node, slot }
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.node, self.slot)
    }
}

impl Serialize for NodeRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        (&self.node, self.slot).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for NodeRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let (node, slot) = <(NodeId, u32)>::deserialize(deserializer)?;
        Ok(Self { node, slot })
    }
}

/// A node input: either a literal or a link to another node's output.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum NodeInput {
    Link(NodeRef),
    Value(Value),
}

/// Inputs for a node under construction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeInputs(BTreeMap<String, NodeInput>);

impl NodeInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.0.insert(name.to_string(), NodeInput::Value(value.into()));
        self
    }

    pub fn link(mut self, name: &str, output: NodeRef) -> Self {
        self.0.insert(name.to_string(), NodeInput::Link(output));
        self
    }

    /// Link only when an output is given; absent optional inputs are omitted.
    pub fn link_opt(self, name: &str, output: Option<NodeRef>) -> Self {
        match output {
            Some(output) => self.link(name, output),
            None => self,
        }
    }
}

/// A node in the finished graph.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GraphNode {
    pub id: NodeId,
    pub class_type: String,
    pub inputs: BTreeMap<String, NodeInput>,
}

impl GraphNode {
    pub fn new(id: NodeId, class_type: impl Into<String>, inputs: NodeInputs) -> Self {
        Self {
            id,
            class_type: class_type.into(),
            inputs: inputs.0,
        }
    }

    /// Literal (non-link) inputs.
    pub fn parameters(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.inputs.iter().filter_map(|(name, input)| match input {
            NodeInput::Value(v) => Some((name.as_str(), v)),
            NodeInput::Link(_) => None,
        })
    }

    /// Incoming edges as `(input name, source output)`.
    pub fn input_edges(&self) -> impl Iterator<Item = (&str, &NodeRef)> {
        self.inputs.iter().filter_map(|(name, input)| match input {
            NodeInput::Link(r) => Some((name.as_str(), r)),
            NodeInput::Value(_) => None,
        })
    }

    pub fn input(&self, name: &str) -> Option<&NodeInput> {
        self.inputs.get(name)
    }
}

/// Output of one assembly: nodes in creation order plus the final output.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FinishedGraph {
    pub nodes: Vec<GraphNode>,
    pub output: NodeRef,
    /// Names of the steps that contributed, in execution order.
    pub applied_steps: Vec<String>,
}

impl FinishedGraph {
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|n| n.id.clone()).collect()
    }

    pub fn node(&self, id: &NodeId) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    pub fn nodes_of_type<'a>(&'a self, class_type: &'a str) -> impl Iterator<Item = &'a GraphNode> + 'a {
        self.nodes.iter().filter(move |n| n.class_type == class_type)
    }

    /// The engine's prompt format: `{id: {"class_type": .., "inputs": {..}}}`.
    pub fn to_prompt(&self) -> Value {
        let mut prompt = Map::new();
        for node in &self.nodes {
            prompt.insert(
                node.id.to_string(),
                json!({
                    "class_type": node.class_type,
                    "inputs": node.inputs,
                }),
            );
        }
        Value::Object(prompt)
    }
}
