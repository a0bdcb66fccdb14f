//! Error types for FaceTools.
//!
//! A single error enum covers model provisioning, hash caching, and graph
//! assembly. Variants marked user-facing are surfaced verbatim to the person
//! who requested a generation.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the FaceTools core.
#[derive(Debug, Error)]
pub enum FaceToolsError {
    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Network errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("Download failed for {url}: {message}")]
    DownloadFailed { url: String, message: String },

    // Model integrity errors
    #[error("Hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error(
        "Model '{model_id}' is corrupt (expected hash {expected_prefix}..., found {actual_prefix}...). {remediation}"
    )]
    Integrity {
        model_id: String,
        path: PathBuf,
        expected_prefix: String,
        actual_prefix: String,
        remediation: String,
    },

    // Graph assembly errors
    #[error("{step} parameters specified, but feature '{feature}' isn't installed")]
    FeatureUnavailable { step: String, feature: String },

    #[error("Invalid step registration '{step}': {message}")]
    InvalidStep { step: String, message: String },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // Validation errors
    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for FaceTools operations.
pub type Result<T> = std::result::Result<T, FaceToolsError>;

impl From<std::io::Error> for FaceToolsError {
    fn from(err: std::io::Error) -> Self {
        FaceToolsError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for FaceToolsError {
    fn from(err: serde_json::Error) -> Self {
        FaceToolsError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for FaceToolsError {
    fn from(err: reqwest::Error) -> Self {
        FaceToolsError::Network {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl FaceToolsError {
    /// Create an IO error with path context.
    ///
    /// A `NotFound` kind maps to [`FaceToolsError::FileNotFound`] so callers can
    /// match on a missing file without inspecting the io error.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if err.kind() == std::io::ErrorKind::NotFound {
            return FaceToolsError::FileNotFound(path);
        }
        FaceToolsError::Io {
            message: err.to_string(),
            path: Some(path),
            source: Some(err),
        }
    }

    /// Whether the message is meant to be shown to the end user as-is.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            FaceToolsError::Integrity { .. }
                | FaceToolsError::FeatureUnavailable { .. }
                | FaceToolsError::Validation { .. }
        )
    }

    /// Check if this error should trigger a retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FaceToolsError::Network { .. })
    }
}
