//! FaceTools CLI - check model files and build face swap/restore graphs.
//!
//! A thin host around `facetools-core`: backend roots come from the command
//! line, parameters from a JSON file, and graphs are written as prompt JSON.

mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facetools_core::config::{AppConfig, PathsConfig};
use facetools_core::{
    steps, Generator, HashStore, HttpDownloader, ModelRegistry, Provisioner, StaticBackends,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "facetools")]
#[command(about = "Model provisioning and graph building for FaceTools")]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Directory for the hash cache and manifest (defaults to the user data dir)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Extra model manifest merged over the built-in table
    #[arg(long, global = true)]
    manifest: Option<PathBuf>,

    /// Backend root to provision; repeat for several backends
    #[arg(short, long = "backend", global = true)]
    backends: Vec<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check, download and repair model files under every backend root
    Verify {
        /// Logical model ids to check (all known models when omitted)
        models: Vec<String>,
    },
    /// Build the node graph for a parameter file
    Build {
        /// JSON object mapping parameter ids to values
        params: PathBuf,

        /// Supported feature ids, e.g. `reactor,face_restoration`
        #[arg(long, value_delimiter = ',')]
        features: Vec<String>,

        /// Node types the backend reports; mapped onto features
        #[arg(long, value_delimiter = ',')]
        node_types: Vec<String>,

        /// Node whose first output the steps start from
        #[arg(long, default_value = "8")]
        input_node: String,

        /// Write the prompt JSON here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write the parameters left after default pruning here
        #[arg(long)]
        pruned_params: Option<PathBuf>,

        /// Assemble only, without checking model files
        #[arg(long)]
        no_provision: bool,
    },
    /// Print SHA-256 hashes, served from the cache when files are unchanged
    Hash { files: Vec<PathBuf> },
    /// List registered steps in execution order
    Steps,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging; RUST_LOG overrides the flag
    let default_level = if args.debug {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(default_level.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    let data_dir = match args.data_dir {
        Some(dir) => dir,
        None => dirs::data_dir()
            .map(|dir| dir.join(PathsConfig::DATA_DIR_NAME))
            .context("Could not determine a data directory; pass --data-dir")?,
    };
    info!("{} data directory: {}", AppConfig::APP_NAME, data_dir.display());

    let store = Arc::new(HashStore::in_dir(&data_dir));
    let registry = Arc::new(load_registry(&data_dir, args.manifest.as_deref())?);
    let provisioner = Provisioner::new(store.clone(), registry, Arc::new(HttpDownloader::new()?));
    let backends = Arc::new(StaticBackends::running(&args.backends));
    let generator = Generator::new(
        Arc::new(steps::builtin_registry()?),
        provisioner,
        backends.clone(),
    );

    match args.command {
        Command::Verify { models } => commands::verify(&generator, backends.as_ref(), models).await,
        Command::Build {
            params,
            features,
            node_types,
            input_node,
            output,
            pruned_params,
            no_provision,
        } => {
            let request = commands::BuildRequest {
                params_path: params,
                features,
                node_types,
                input_node,
                output,
                pruned_params,
                provision: !no_provision,
            };
            commands::build(&generator, request).await
        }
        Command::Hash { files } => commands::hash(&store, &files),
        Command::Steps => {
            commands::list_steps(&generator);
            Ok(())
        }
    }
}

/// Built-in model table, overlaid by the data dir manifest and then `--manifest`.
fn load_registry(data_dir: &Path, manifest: Option<&Path>) -> Result<ModelRegistry> {
    let mut registry = ModelRegistry::builtin()?;

    let default_manifest = data_dir.join(PathsConfig::MANIFEST_FILE_NAME);
    if default_manifest.exists() {
        registry = registry.merged_with(ModelRegistry::from_manifest(&default_manifest)?);
    }
    if let Some(path) = manifest {
        let extra = ModelRegistry::from_manifest(path)
            .with_context(|| format!("Failed to load manifest {}", path.display()))?;
        registry = registry.merged_with(extra);
    }

    info!("Model registry has {} entries", registry.len());
    Ok(registry)
}
