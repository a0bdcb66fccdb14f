//! Making sure required model files are present and intact.
//!
//! For every model a request needs, each usable backend root is checked:
//! missing files are fetched when a source URL is known, present files are
//! hashed through the [`HashStore`] and compared with the registry. Corrupt
//! files with a source URL are replaced; corrupt files without one stop the
//! request with a message telling the user how to fix it.

use crate::backend::BackendRegistry;
use crate::config::HashStoreConfig;
use crate::download::ModelDownloader;
use crate::error::{FaceToolsError, Result};
use crate::hash_store::{hash_prefix, HashStore};
use crate::model_registry::{remediation_for, ModelDescriptor, ModelRegistry};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// What `ensure_model` found (and did).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    /// The id isn't in the registry; nothing was checked.
    Unmanaged,
    /// The file is missing and could not be fetched.
    Absent,
    /// The file matches its expected hash.
    Verified,
    /// The file was corrupt and has been downloaded again.
    Recovered,
}

/// Outcome for one model under one backend root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionReport {
    pub backend_root: PathBuf,
    pub logical_id: String,
    pub outcome: ProvisionOutcome,
}

#[derive(Clone)]
pub struct Provisioner {
    store: Arc<HashStore>,
    registry: Arc<ModelRegistry>,
    downloader: Arc<dyn ModelDownloader>,
    /// One async lock per model path; checks of the same file run one at a time.
    path_locks: Arc<Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>>,
}

impl Provisioner {
    pub fn new(
        store: Arc<HashStore>,
        registry: Arc<ModelRegistry>,
        downloader: Arc<dyn ModelDownloader>,
    ) -> Self {
        Self {
            store,
            registry,
            downloader,
            path_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn store(&self) -> &Arc<HashStore> {
        &self.store
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Check one model under one backend root.
    pub async fn ensure_model(&self, logical_id: &str, backend_root: &Path) -> Result<ProvisionOutcome> {
        let Some(descriptor) = self.registry.get(logical_id) else {
            debug!("'{}' is not a managed model, skipping", logical_id);
            return Ok(ProvisionOutcome::Unmanaged);
        };
        let path = backend_root.join(logical_id);
        let lock = self.path_lock(&path);
        let _guard = lock.lock().await;

        if !path.exists() {
            if let Some(url) = &descriptor.source_url {
                info!("Downloading missing model {} to {}", logical_id, path.display());
                if let Err(e) = self.downloader.download(&path, url, &descriptor.expected_hash).await {
                    warn!("Failed to download {}: {}", logical_id, e);
                }
            }
            if !path.exists() {
                debug!("Model {} is absent at {}", logical_id, path.display());
                return Ok(ProvisionOutcome::Absent);
            }
        }

        let actual = self.hash(&path).await?;
        if actual == descriptor.expected_hash {
            debug!("Verified {} at {}", logical_id, path.display());
            return Ok(ProvisionOutcome::Verified);
        }

        match &descriptor.source_url {
            Some(url) => self.recover(descriptor, &path, url, &actual).await,
            None => Err(integrity_error(descriptor, &path, &actual)),
        }
    }

    /// Replace a corrupt file with a fresh download, once.
    async fn recover(
        &self,
        descriptor: &ModelDescriptor,
        path: &Path,
        url: &str,
        actual: &str,
    ) -> Result<ProvisionOutcome> {
        warn!(
            "Model {} is corrupt (expected {}, found {}), downloading it again",
            descriptor.logical_id,
            hash_prefix(&descriptor.expected_hash, HashStoreConfig::HASH_PREFIX_LEN),
            hash_prefix(actual, HashStoreConfig::HASH_PREFIX_LEN)
        );

        self.store.invalidate(path);
        match std::fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(FaceToolsError::io_with_path(e, path)),
        }

        self.downloader
            .download(path, url, &descriptor.expected_hash)
            .await?;

        // Re-hash so the cache holds the new file's stamp
        let refreshed = self.hash(path).await?;
        if refreshed != descriptor.expected_hash {
            return Err(integrity_error(descriptor, path, &refreshed));
        }
        info!("Recovered {} at {}", descriptor.logical_id, path.display());
        Ok(ProvisionOutcome::Recovered)
    }

    /// Check every model under every usable backend root.
    ///
    /// The hash store is flushed when this returns, including on error.
    pub async fn ensure_models_for_backends(
        &self,
        models: &[String],
        backends: &dyn BackendRegistry,
    ) -> Result<Vec<ProvisionReport>> {
        let _flush = self.store.flush_guard();
        let roots = backends.usable_roots();
        if roots.is_empty() && !models.is_empty() {
            debug!("No usable backends, nothing to provision");
        }

        let mut reports = Vec::with_capacity(roots.len() * models.len());
        for root in &roots {
            for logical_id in models {
                let outcome = self.ensure_model(logical_id, root).await?;
                reports.push(ProvisionReport {
                    backend_root: root.clone(),
                    logical_id: logical_id.clone(),
                    outcome,
                });
            }
        }
        Ok(reports)
    }

    fn path_lock(&self, path: &Path) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.path_locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(path.to_path_buf()).or_default())
    }

    async fn hash(&self, path: &Path) -> Result<String> {
        let store = Arc::clone(&self.store);
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || store.get_or_compute_hash(&path))
            .await
            .map_err(|e| FaceToolsError::Other(format!("Hash computation task failed: {}", e)))?
    }
}

fn integrity_error(descriptor: &ModelDescriptor, path: &Path, actual: &str) -> FaceToolsError {
    FaceToolsError::Integrity {
        model_id: descriptor.logical_id.clone(),
        path: path.to_path_buf(),
        expected_prefix: hash_prefix(&descriptor.expected_hash, HashStoreConfig::HASH_PREFIX_LEN),
        actual_prefix: hash_prefix(actual, HashStoreConfig::HASH_PREFIX_LEN),
        remediation: remediation_for(&descriptor.logical_id, path),
    }
}
