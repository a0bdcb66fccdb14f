//! Subcommand implementations.

use anyhow::{bail, Context, Result};
use facetools_core::{
    BackendRegistry, Feature, FeatureSet, Generator, HashStore, JsonGraphSink, NodeGraphSink,
    NodeId, NodeRef, ParameterSet, ProvisionOutcome, StaticBackends,
};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub async fn verify(generator: &Generator, backends: &StaticBackends, models: Vec<String>) -> Result<()> {
    let models = if models.is_empty() {
        generator
            .provisioner()
            .registry()
            .iter()
            .map(|d| d.logical_id.clone())
            .collect()
    } else {
        models
    };
    if backends.usable_roots().is_empty() {
        bail!("No backend roots given; pass --backend <DIR>");
    }

    let reports = generator
        .provisioner()
        .ensure_models_for_backends(&models, backends)
        .await?;

    for report in &reports {
        println!(
            "{:<10} {}",
            format!("{:?}", report.outcome).to_lowercase(),
            report.backend_root.join(&report.logical_id).display()
        );
    }
    let absent = reports
        .iter()
        .filter(|r| r.outcome == ProvisionOutcome::Absent)
        .count();
    if absent > 0 {
        warn!("{} model file(s) are missing and have no download source", absent);
    }
    Ok(())
}

/// Options for `facetools build`.
pub struct BuildRequest {
    pub params_path: PathBuf,
    pub features: Vec<String>,
    pub node_types: Vec<String>,
    pub input_node: String,
    pub output: Option<PathBuf>,
    pub pruned_params: Option<PathBuf>,
    pub provision: bool,
}

pub async fn build(generator: &Generator, request: BuildRequest) -> Result<()> {
    let mut params = load_params(&request.params_path)?;
    let features = feature_set(&request.features, &request.node_types)?;
    let input = NodeRef::new(NodeId::new(request.input_node), 0);

    let mut sink: Box<dyn NodeGraphSink> = match &request.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            Box::new(JsonGraphSink::new(BufWriter::new(file)))
        }
        None => Box::new(JsonGraphSink::new(std::io::stdout())),
    };

    if request.provision {
        let generation = generator
            .generate(params, &features, input, sink.as_mut())
            .await?;
        params = generation.params;
    } else {
        let graph = generator
            .assembler()
            .assemble(&mut params, &features, input)
            .map_err(|aborted| aborted.into_error())?;
        sink.accept(&graph)?;
    }

    if let Some(path) = &request.pruned_params {
        let json = serde_json::to_string_pretty(&params)?;
        std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Wrote {} parameter(s) to {}", params.len(), path.display());
    }
    Ok(())
}

pub fn hash(store: &HashStore, files: &[PathBuf]) -> Result<()> {
    let _flush = store.flush_guard();
    for file in files {
        let hash = store.get_or_compute_hash(file)?;
        println!("{}  {}", hash, file.display());
    }
    let stats = store.stats();
    info!("{} cache hit(s), {} miss(es)", stats.hits, stats.misses);
    Ok(())
}

pub fn list_steps(generator: &Generator) {
    for step in generator.assembler().registry().steps() {
        let feature = step.feature().map(Feature::as_str).unwrap_or("-");
        println!("{:<6} {:<16} {}", step.priority(), step.name(), feature);
    }
}

fn load_params(path: &Path) -> Result<ParameterSet> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read parameters from {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("{} is not a JSON object of parameters", path.display()))
}

fn feature_set(features: &[String], node_types: &[String]) -> Result<FeatureSet> {
    let mut set = FeatureSet::from_node_types(node_types.iter().map(String::as_str));
    for id in features {
        set.insert(id.parse::<Feature>()?);
    }
    Ok(set)
}
