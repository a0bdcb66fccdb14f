//! Centralized configuration for FaceTools.
//!
//! Constants for hash caching, network operations, graph assembly and the
//! on-disk layout live here so the rest of the crate never hardcodes them.

use std::time::Duration;

/// Application-level configuration.
pub struct AppConfig;

impl AppConfig {
    pub const APP_NAME: &'static str = "FaceTools";
    pub const USER_AGENT: &'static str = "FaceTools/0.1";
}

/// Configuration for the persisted hash cache.
pub struct HashStoreConfig;

impl HashStoreConfig {
    /// Bumped whenever the persisted layout changes. Older files are discarded.
    pub const FORMAT_VERSION: u32 = 1;
    pub const FILE_NAME: &'static str = "model-hashes.json";
    /// Chunk size for streaming file content into the hasher (8MB).
    pub const CHUNK_SIZE: usize = 8 * 1024 * 1024;
    /// Number of hex characters shown in integrity messages.
    pub const HASH_PREFIX_LEN: usize = 8;
}

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
    /// Model files are large; only the idle read timeout is bounded.
    pub const READ_TIMEOUT: Duration = Duration::from_secs(60);
    pub const DOWNLOAD_RETRY_ATTEMPTS: u32 = 3;
    pub const DOWNLOAD_RETRY_BASE_DELAY: Duration = Duration::from_secs(2);
    pub const DOWNLOAD_RETRY_MAX_DELAY: Duration = Duration::from_secs(60);
    pub const DOWNLOAD_TEMP_SUFFIX: &'static str = ".part";
}

/// Graph assembly configuration.
pub struct AssemblerConfig;

impl AssemblerConfig {
    /// First module number used when rendering node ids. Keeps generated ids
    /// clear of the small integers the host uses for its own base graph.
    pub const NODE_ID_BASE: usize = 100;
    /// Parameter that disables pruning of default-valued parameters when false.
    pub const REMOVE_PARAMS_IF_DEFAULT: &'static str = "[FaceTools] Remove Params If Default";
}

/// Directory and file names.
pub struct PathsConfig;

impl PathsConfig {
    pub const DATA_DIR_NAME: &'static str = "facetools";
    pub const MANIFEST_FILE_NAME: &'static str = "model-manifest.json";
}
