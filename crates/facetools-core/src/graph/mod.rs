//! Node graph assembly.
//!
//! Steps are registered once into a [`StepRegistry`], sorted by priority.
//! Each request runs them in order against a fresh [`BuildContext`]; steps
//! read parameters, append nodes, and move the current output forward.

mod assembler;
mod context;
mod node;
mod sink;
mod step;

pub use assembler::{AssemblyAborted, AssemblyRun, AssemblyState, GraphAssembler};
pub use context::{BuildContext, NodeIdAllocator};
pub use node::{FinishedGraph, GraphNode, NodeId, NodeInput, NodeInputs, NodeRef};
pub use sink::{JsonGraphSink, NodeGraphSink};
pub use step::{ModelRequirements, Step, StepAction, StepOutcome, StepRegistry};
