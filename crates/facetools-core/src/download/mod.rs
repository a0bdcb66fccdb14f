//! Fetching model files from their source URL.
//!
//! The provisioner only talks to the [`ModelDownloader`] trait; hosts plug in
//! [`HttpDownloader`] or their own mechanism.

mod http;
mod retry;

pub use http::HttpDownloader;
pub use retry::{retry_async, RetryConfig};

use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

/// Places a model file at `destination`, fetched from `source_url`.
///
/// Implementations block (await) until the file is in place or the download
/// failed; failures surface as errors and must not leave a partial file at
/// `destination`.
#[async_trait]
pub trait ModelDownloader: Send + Sync {
    async fn download(&self, destination: &Path, source_url: &str, expected_hash: &str) -> Result<()>;
}
