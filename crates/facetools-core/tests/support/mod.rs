//! Shared fixtures for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use facetools_core::{FaceToolsError, ModelDownloader, Result};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const GOOD: &[u8] = b"known good model weights";
pub const CORRUPT: &[u8] = b"truncated model weigh";

pub fn sha256(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// A recorded call to [`RecordingDownloader::download`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadCall {
    pub destination: PathBuf,
    pub url: String,
}

/// Writes fixed content instead of fetching, and records every call.
pub struct RecordingDownloader {
    content: Option<Vec<u8>>,
    calls: Mutex<Vec<DownloadCall>>,
}

impl RecordingDownloader {
    /// Downloads always produce `content`.
    pub fn serving(content: &[u8]) -> Self {
        Self {
            content: Some(content.to_vec()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Downloads always fail.
    pub fn failing() -> Self {
        Self {
            content: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<DownloadCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelDownloader for RecordingDownloader {
    async fn download(&self, destination: &Path, source_url: &str, _expected_hash: &str) -> Result<()> {
        self.calls.lock().unwrap().push(DownloadCall {
            destination: destination.to_path_buf(),
            url: source_url.to_string(),
        });
        match &self.content {
            Some(content) => {
                std::fs::create_dir_all(destination.parent().unwrap()).unwrap();
                std::fs::write(destination, content).unwrap();
                Ok(())
            }
            None => Err(FaceToolsError::DownloadFailed {
                url: source_url.to_string(),
                message: "offline".to_string(),
            }),
        }
    }
}

/// Write `content` at `root/logical_id`, creating parent directories.
pub fn place(root: &Path, logical_id: &str, content: &[u8]) -> PathBuf {
    let path = root.join(logical_id);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, content).unwrap();
    path
}
