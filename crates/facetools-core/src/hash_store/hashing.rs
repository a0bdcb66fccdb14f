//! Streaming SHA-256 computation for model files.

use crate::config::HashStoreConfig;
use crate::error::{FaceToolsError, Result};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

/// Compute the SHA-256 of a file as lowercase hex.
///
/// The file is streamed in fixed-size chunks so memory use stays flat for
/// multi-gigabyte models.
pub fn compute_sha256(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let mut file =
        std::fs::File::open(path).map_err(|e| FaceToolsError::io_with_path(e, path))?;

    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; HashStoreConfig::CHUNK_SIZE];
    loop {
        let bytes_read = file
            .read(&mut buffer)
            .map_err(|e| FaceToolsError::io_with_path(e, path))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Verify a file's SHA-256 against an expected value (case-insensitive).
pub fn verify_sha256(path: impl AsRef<Path>, expected: &str) -> Result<()> {
    let actual = compute_sha256(path)?;
    let expected_lower = expected.to_lowercase();

    if actual == expected_lower {
        Ok(())
    } else {
        Err(FaceToolsError::HashMismatch {
            expected: expected_lower,
            actual,
        })
    }
}

/// First `len` characters of a hex digest, used in user-facing messages.
pub fn hash_prefix(hash: &str, len: usize) -> String {
    hash.chars().take(len).collect()
}
