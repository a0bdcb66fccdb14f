//! Backend feature flags.
//!
//! Features are a closed set of known ids plus an escape variant for ids
//! added by other extensions. The engine advertises which node types it has;
//! [`FeatureSet::from_node_types`] turns that into supported features.

use crate::error::{FaceToolsError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// A backend capability a step may depend on.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Feature {
    /// The FaceRestoreCF custom node pack.
    FaceRestoration,
    /// The ReActor custom node pack.
    Reactor,
    /// YOLOv8 detection nodes used for face masks.
    Yolov8,
    Other(String),
}

impl Feature {
    pub fn as_str(&self) -> &str {
        match self {
            Feature::FaceRestoration => "face_restoration",
            Feature::Reactor => "reactor",
            Feature::Yolov8 => "yolov8",
            Feature::Other(id) => id,
        }
    }

    /// Ensure an id is usable: non-empty, lowercase ascii, digits, `_` or `-`.
    pub fn validate(&self) -> Result<()> {
        let id = self.as_str();
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');
        if valid {
            Ok(())
        } else {
            Err(FaceToolsError::Validation {
                field: "feature".to_string(),
                message: format!("'{}' is not a valid feature id", id),
            })
        }
    }
}

impl FromStr for Feature {
    type Err = FaceToolsError;

    fn from_str(s: &str) -> Result<Self> {
        let feature = match s {
            "face_restoration" => Feature::FaceRestoration,
            "reactor" => Feature::Reactor,
            "yolov8" => Feature::Yolov8,
            other => Feature::Other(other.to_string()),
        };
        feature.validate()?;
        Ok(feature)
    }
}

impl TryFrom<String> for Feature {
    type Error = FaceToolsError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Feature> for String {
    fn from(feature: Feature) -> Self {
        feature.as_str().to_string()
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Node types whose presence in the engine implies a feature.
pub const NODE_FEATURES: &[(&str, Feature)] = &[
    ("FaceRestoreCFWithModel", Feature::FaceRestoration),
    ("ReActorFaceSwapOpt", Feature::Reactor),
    ("SwarmYoloDetection", Feature::Yolov8),
];

/// Answers whether the active backend supports a feature.
pub trait FeatureFlags: Send + Sync {
    fn is_supported(&self, feature: &Feature) -> bool;
}

/// Set of supported features.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureSet {
    features: BTreeSet<Feature>,
}

impl FeatureSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Features implied by the node types an engine reports.
    pub fn from_node_types<'a>(node_types: impl IntoIterator<Item = &'a str>) -> Self {
        let mut set = Self::new();
        for node_type in node_types {
            if let Some((_, feature)) = NODE_FEATURES.iter().find(|(name, _)| *name == node_type) {
                set.insert(feature.clone());
            }
        }
        set
    }

    pub fn insert(&mut self, feature: Feature) -> bool {
        self.features.insert(feature)
    }

    pub fn with(mut self, feature: Feature) -> Self {
        self.insert(feature);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter()
    }
}

impl FromIterator<Feature> for FeatureSet {
    fn from_iter<T: IntoIterator<Item = Feature>>(iter: T) -> Self {
        Self {
            features: iter.into_iter().collect(),
        }
    }
}

impl FeatureFlags for FeatureSet {
    fn is_supported(&self, feature: &Feature) -> bool {
        self.features.contains(feature)
    }
}
