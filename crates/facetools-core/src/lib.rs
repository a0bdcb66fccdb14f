//! FaceTools Core - face swap and face restoration support for node-graph
//! image generation backends.
//!
//! Two halves:
//! - model provisioning: a persisted hash cache ([`HashStore`]), a table of
//!   known model files ([`ModelRegistry`]) and a [`Provisioner`] that checks,
//!   downloads and repairs those files under every usable backend root;
//! - graph assembly: prioritized [`Step`]s that read user parameters and
//!   append nodes to the backend's graph through a [`BuildContext`].
//!
//! # Example
//!
//! ```rust,ignore
//! use facetools_core::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> facetools_core::Result<()> {
//!     let store = Arc::new(HashStore::in_dir("/var/lib/facetools".as_ref()));
//!     let provisioner = Provisioner::new(
//!         store,
//!         Arc::new(ModelRegistry::builtin()?),
//!         Arc::new(HttpDownloader::new()?),
//!     );
//!     let generator = Generator::new(
//!         Arc::new(steps::builtin_registry()?),
//!         provisioner,
//!         Arc::new(StaticBackends::running(["/opt/ComfyUI"])),
//!     );
//!
//!     let params: ParameterSet = serde_json::from_str(r#"{"reactorfacerestoremodel": "GFPGANv1.4.pth"}"#)?;
//!     let features = FeatureSet::new().with(Feature::Reactor);
//!     let mut graphs: Vec<FinishedGraph> = Vec::new();
//!     generator
//!         .generate(params, &features, NodeRef::new(NodeId::new("8"), 0), &mut graphs)
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod config;
pub mod download;
pub mod error;
pub mod features;
pub mod graph;
pub mod hash_store;
pub mod model_registry;
pub mod params;
pub mod pipeline;
pub mod provisioner;
pub mod steps;

// Re-export commonly used types
pub use backend::{BackendRegistry, BackendRoot, BackendStatus, StaticBackends};
pub use download::{HttpDownloader, ModelDownloader, RetryConfig};
pub use error::{FaceToolsError, Result};
pub use features::{Feature, FeatureFlags, FeatureSet};
pub use graph::{
    AssemblyAborted, AssemblyState, BuildContext, FinishedGraph, GraphAssembler, GraphNode,
    JsonGraphSink, NodeGraphSink, NodeId, NodeInputs, NodeRef, Step, StepOutcome, StepRegistry,
};
pub use hash_store::{CacheEntry, FlushGuard, HashStore, HashStoreStats};
pub use model_registry::{ModelDescriptor, ModelRegistry};
pub use params::{ParamDef, ParamValue, ParameterSet, ParameterStore, ParamsExt, ParamsPruneExt};
pub use pipeline::{Generation, Generator};
pub use provisioner::{ProvisionOutcome, ProvisionReport, Provisioner};
