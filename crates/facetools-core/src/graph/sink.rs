//! Destinations for finished graphs.

use super::node::{FinishedGraph, NodeRef};
use crate::error::Result;
use serde::Serialize;
use serde_json::Value;
use std::io::Write;
use tracing::debug;

/// Receives the graph produced by one assembly.
pub trait NodeGraphSink {
    fn accept(&mut self, graph: &FinishedGraph) -> Result<()>;
}

impl NodeGraphSink for Vec<FinishedGraph> {
    fn accept(&mut self, graph: &FinishedGraph) -> Result<()> {
        self.push(graph.clone());
        Ok(())
    }
}

/// Document written per graph: the engine prompt plus the node holding the final image.
#[derive(Serialize)]
struct GraphDocument<'a> {
    prompt: Value,
    output: &'a NodeRef,
    applied_steps: &'a [String],
}

/// Writes each graph as pretty JSON: `{"prompt": {..}, "output": [id, slot], "applied_steps": [..]}`.
pub struct JsonGraphSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonGraphSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> NodeGraphSink for JsonGraphSink<W> {
    fn accept(&mut self, graph: &FinishedGraph) -> Result<()> {
        let document = GraphDocument {
            prompt: graph.to_prompt(),
            output: &graph.output,
            applied_steps: &graph.applied_steps,
        };
        serde_json::to_writer_pretty(&mut self.writer, &document)?;
        writeln!(self.writer)?;
        self.writer.flush()?;
        debug!("Wrote prompt with {} node(s)", graph.nodes.len());
        Ok(())
    }
}
