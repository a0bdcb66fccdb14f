//! HTTP model downloader.
//!
//! Streams the response into `<destination>.part`, hashing as it goes, and
//! renames it over the destination only once the content matches the
//! expected SHA-256. A failed or mismatched download never replaces anything.

use super::retry::{retry_async, RetryConfig};
use super::ModelDownloader;
use crate::config::{AppConfig, NetworkConfig};
use crate::error::{FaceToolsError, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Downloads model files over HTTP(S) with retries.
pub struct HttpDownloader {
    client: Client,
    retry: RetryConfig,
}

impl HttpDownloader {
    /// Create a downloader with the default timeouts and retry policy.
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(NetworkConfig::CONNECT_TIMEOUT)
            .read_timeout(NetworkConfig::READ_TIMEOUT)
            .user_agent(AppConfig::USER_AGENT)
            .build()?;
        Ok(Self::with_client(client))
    }

    /// Create a downloader around an existing client.
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            retry: RetryConfig::default()
                .with_max_attempts(NetworkConfig::DOWNLOAD_RETRY_ATTEMPTS)
                .with_base_delay(NetworkConfig::DOWNLOAD_RETRY_BASE_DELAY)
                .with_max_delay(NetworkConfig::DOWNLOAD_RETRY_MAX_DELAY),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn is_retryable_status(status: StatusCode) -> bool {
        status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
    }

    async fn download_once(&self, url: &str, temp_path: &Path, expected_hash: &str) -> Result<u64> {
        let response = self.client.get(url).send().await?;
        let status = response.status();

        if !status.is_success() {
            let message = format!("Download failed with status {}", status);
            return Err(if Self::is_retryable_status(status) {
                FaceToolsError::Network {
                    message,
                    source: None,
                }
            } else {
                FaceToolsError::DownloadFailed {
                    url: url.to_string(),
                    message,
                }
            });
        }

        let total_bytes = response.content_length();
        let mut file = std::fs::File::create(temp_path)
            .map_err(|e| FaceToolsError::io_with_path(e, temp_path))?;
        let mut hasher = Sha256::new();
        let mut bytes_downloaded: u64 = 0;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| FaceToolsError::Network {
                message: format!("Error reading download stream: {}", e),
                source: Some(e),
            })?;
            file.write_all(&chunk)
                .map_err(|e| FaceToolsError::io_with_path(e, temp_path))?;
            hasher.update(&chunk);
            bytes_downloaded += chunk.len() as u64;
        }

        file.sync_all()
            .map_err(|e| FaceToolsError::io_with_path(e, temp_path))?;

        if let Some(total) = total_bytes {
            if total != bytes_downloaded {
                return Err(FaceToolsError::Network {
                    message: format!("Connection closed after {} of {} bytes", bytes_downloaded, total),
                    source: None,
                });
            }
        }

        let actual = hex::encode(hasher.finalize());
        if actual != expected_hash.to_lowercase() {
            return Err(FaceToolsError::HashMismatch {
                expected: expected_hash.to_lowercase(),
                actual,
            });
        }

        Ok(bytes_downloaded)
    }
}

#[async_trait]
impl ModelDownloader for HttpDownloader {
    async fn download(&self, destination: &Path, source_url: &str, expected_hash: &str) -> Result<()> {
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent).map_err(|e| FaceToolsError::io_with_path(e, parent))?;
        }

        let temp_path = temp_path_for(destination);
        info!("Downloading {} to {}", source_url, destination.display());

        let (result, attempts) = retry_async(
            &self.retry,
            || self.download_once(source_url, &temp_path, expected_hash),
            FaceToolsError::is_retryable,
        )
        .await;

        match result {
            Ok(bytes) => {
                std::fs::rename(&temp_path, destination).map_err(|e| {
                    let _ = std::fs::remove_file(&temp_path);
                    FaceToolsError::io_with_path(e, destination)
                })?;
                debug!(
                    "Downloaded {} bytes to {} in {} attempt(s)",
                    bytes,
                    destination.display(),
                    attempts
                );
                Ok(())
            }
            Err(e) => {
                let _ = std::fs::remove_file(&temp_path);
                Err(e)
            }
        }
    }
}

fn temp_path_for(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_owned();
    name.push(NetworkConfig::DOWNLOAD_TEMP_SUFFIX);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_path_appends_suffix() {
        assert_eq!(
            temp_path_for(Path::new("/models/insightface/inswapper_128.onnx")),
            PathBuf::from("/models/insightface/inswapper_128.onnx.part")
        );
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(HttpDownloader::is_retryable_status(StatusCode::BAD_GATEWAY));
        assert!(HttpDownloader::is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(!HttpDownloader::is_retryable_status(StatusCode::NOT_FOUND));
    }

    #[tokio::test]
    async fn test_unreachable_host_fails_without_leaving_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let destination = dir.path().join("models").join("model.onnx");
        let downloader = HttpDownloader::new()
            .unwrap()
            .with_retry(RetryConfig::default().with_max_attempts(1));

        // Port 9 (discard) on localhost refuses connections in test sandboxes.
        let result = downloader
            .download(&destination, "http://127.0.0.1:9/model.onnx", "00")
            .await;

        assert!(result.is_err());
        assert!(!destination.exists());
        assert!(!temp_path_for(&destination).exists());
    }
}
