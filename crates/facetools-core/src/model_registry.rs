//! Table of known model files and their expected hashes.
//!
//! Each entry maps a logical model id (a path relative to a backend root,
//! e.g. `models/insightface/inswapper_128.onnx`) to the SHA-256 the file must
//! have and, when the file can be fetched on its own, the URL to fetch it
//! from. Entries without a URL come out of third-party archives and can only
//! be repaired by the user.

use crate::error::{FaceToolsError, Result};
use crate::hash_store::read_json;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path};
use tracing::debug;

const BUILTIN_MANIFEST: &str = include_str!("../assets/models.json");

/// A model file the plugin knows how to verify.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDescriptor {
    pub logical_id: String,
    pub expected_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

impl ModelDescriptor {
    pub fn new(logical_id: impl Into<String>, expected_hash: impl Into<String>) -> Self {
        let expected_hash: String = expected_hash.into();
        Self {
            logical_id: logical_id.into(),
            expected_hash: expected_hash.to_lowercase(),
            source_url: None,
        }
    }

    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    /// Whether a corrupt copy can be replaced by downloading it again.
    pub fn is_recoverable(&self) -> bool {
        self.source_url.is_some()
    }

    fn validate(&self) -> Result<()> {
        let path = Path::new(&self.logical_id);
        let escapes = path
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if self.logical_id.is_empty() || escapes {
            return Err(FaceToolsError::Config {
                message: format!(
                    "Model id '{}' must be a relative path without '..'",
                    self.logical_id
                ),
            });
        }
        if self.expected_hash.len() != 64 || !self.expected_hash.chars().all(|c| c.is_ascii_hexdigit())
        {
            return Err(FaceToolsError::Config {
                message: format!(
                    "Model '{}' has an invalid SHA-256 '{}'",
                    self.logical_id, self.expected_hash
                ),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct Manifest {
    models: Vec<ModelDescriptor>,
}

/// Immutable lookup table of [`ModelDescriptor`]s, built once at startup.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: BTreeMap<String, ModelDescriptor>,
}

impl ModelRegistry {
    /// Build a registry from descriptors. Later duplicates replace earlier ones.
    pub fn from_descriptors(descriptors: impl IntoIterator<Item = ModelDescriptor>) -> Result<Self> {
        let mut models = BTreeMap::new();
        for mut descriptor in descriptors {
            descriptor.expected_hash = descriptor.expected_hash.to_lowercase();
            descriptor.validate()?;
            models.insert(descriptor.logical_id.clone(), descriptor);
        }
        Ok(Self { models })
    }

    /// The models shipped with the plugin.
    pub fn builtin() -> Result<Self> {
        let manifest: Manifest = serde_json::from_str(BUILTIN_MANIFEST)?;
        Self::from_descriptors(manifest.models)
    }

    /// Load a manifest file in the same format as the built-in table.
    pub fn from_manifest(path: &Path) -> Result<Self> {
        let manifest: Manifest = read_json(path)?.ok_or_else(|| FaceToolsError::FileNotFound(path.to_path_buf()))?;
        debug!("Loaded {} model descriptors from {}", manifest.models.len(), path.display());
        Self::from_descriptors(manifest.models)
    }

    /// Overlay `other` on top of this registry; its entries win.
    pub fn merged_with(mut self, other: ModelRegistry) -> Self {
        self.models.extend(other.models);
        self
    }

    pub fn get(&self, logical_id: &str) -> Option<&ModelDescriptor> {
        self.models.get(logical_id)
    }

    pub fn contains(&self, logical_id: &str) -> bool {
        self.models.contains_key(logical_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelDescriptor> {
        self.models.values()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

/// Recovery instructions for a corrupt model, picked by model family.
///
/// Families are matched by substring of the logical id, most specific first.
pub fn remediation_for(logical_id: &str, path: &Path) -> String {
    const FAMILIES: &[(&str, &str)] = &[
        (
            "buffalo_l",
            "This file is extracted from the insightface 'buffalo_l' archive. Delete the whole 'buffalo_l' folder and run ReActor again so it is downloaded and extracted fresh.",
        ),
        (
            "facerestore_models",
            "Delete the file and download it again from https://huggingface.co/datasets/Gourieff/ReActor/tree/main/models/facerestore_models.",
        ),
        (
            "insightface",
            "Delete the file and reinstall the ReActor node so its installer downloads the model again.",
        ),
        (
            "facedetection",
            "Delete the file; facexlib downloads it again the next time faces are detected.",
        ),
        (
            "yolov8",
            "Delete the file and download it again from https://github.com/hben35096/assets/releases/.",
        ),
    ];

    FAMILIES
        .iter()
        .find(|(needle, _)| logical_id.contains(needle))
        .map(|(_, message)| format!("{} (file: {})", message, path.display()))
        .unwrap_or_else(|| format!("Delete '{}' and download it again.", path.display()))
}
