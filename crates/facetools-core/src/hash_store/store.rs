//! Process-wide cache of model file hashes keyed by absolute path.

use super::atomic::{read_json, write_json};
use super::hashing::compute_sha256;
use crate::config::HashStoreConfig;
use crate::error::{FaceToolsError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::UNIX_EPOCH;
use tracing::{debug, info, warn};

/// Cached hash for one file, valid while size and mtime are unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// Modification time in nanoseconds since the Unix epoch.
    pub last_write_time: i64,
    pub file_size: u64,
    pub hash_sha256: String,
}

impl CacheEntry {
    fn matches(&self, stamp: FileStamp) -> bool {
        self.file_size == stamp.size && self.last_write_time == stamp.modified
    }
}

/// On-disk layout of the cache file.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedStore {
    format_version: u32,
    #[serde(default)]
    entries: BTreeMap<PathBuf, CacheEntry>,
}

/// Size and mtime of a file at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    size: u64,
    modified: i64,
}

impl FileStamp {
    fn from_metadata(meta: &Metadata, path: &Path) -> Result<Self> {
        let modified = meta
            .modified()
            .map_err(|e| FaceToolsError::io_with_path(e, path))?;
        let nanos = match modified.duration_since(UNIX_EPOCH) {
            Ok(after) => i64::try_from(after.as_nanos()).unwrap_or(i64::MAX),
            Err(before) => -i64::try_from(before.duration().as_nanos()).unwrap_or(i64::MAX),
        };
        Ok(Self {
            size: meta.len(),
            modified: nanos,
        })
    }

    fn read(path: &Path) -> Result<Self> {
        let meta = std::fs::metadata(path).map_err(|e| FaceToolsError::io_with_path(e, path))?;
        if !meta.is_file() {
            return Err(FaceToolsError::FileNotFound(path.to_path_buf()));
        }
        Self::from_metadata(&meta, path)
    }
}

/// Hit and miss counters since the store was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HashStoreStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

#[derive(Debug, Default)]
struct StoreState {
    loaded: bool,
    dirty: bool,
    entries: HashMap<PathBuf, CacheEntry>,
}

/// Persisted hash cache shared by every in-flight generation.
///
/// The backing file is read lazily on first access. All map access and the
/// flush run under one mutex; hashing a file on a miss happens outside it so
/// unrelated large reads don't serialize each other.
///
/// Staleness: an entry is trusted while size and mtime match. A rewrite that
/// keeps both (coarse mtime filesystems, or a tool that restores mtime) will
/// return the previous hash.
#[derive(Debug)]
pub struct HashStore {
    path: PathBuf,
    state: Mutex<StoreState>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl HashStore {
    /// Create a store backed by `path`. Nothing is read until first use.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(StoreState::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Create a store at `{data_dir}/model-hashes.json`.
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(HashStoreConfig::FILE_NAME))
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Return the SHA-256 of `path`, reusing the cached value when the file's
    /// size and mtime are unchanged.
    pub fn get_or_compute_hash(&self, path: impl AsRef<Path>) -> Result<String> {
        let path = absolute(path.as_ref())?;
        let stamp = FileStamp::read(&path)?;

        {
            let state = self.lock_loaded();
            if let Some(entry) = state.entries.get(&path) {
                if entry.matches(stamp) {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    debug!("Hash cache hit for {}", path.display());
                    return Ok(entry.hash_sha256.clone());
                }
                debug!("Hash cache entry for {} is stale", path.display());
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        info!("Computing SHA-256 for {}", path.display());
        let hash = compute_sha256(&path)?;

        // Only cache if the file didn't change underneath the read.
        match FileStamp::read(&path) {
            Ok(after) if after == stamp => {
                let mut state = self.lock_loaded();
                state.entries.insert(
                    path,
                    CacheEntry {
                        last_write_time: stamp.modified,
                        file_size: stamp.size,
                        hash_sha256: hash.clone(),
                    },
                );
                state.dirty = true;
            }
            _ => debug!("{} changed while hashing, not caching", path.display()),
        }

        Ok(hash)
    }

    /// Drop the cached entry for `path`. Returns whether one existed.
    pub fn invalidate(&self, path: impl AsRef<Path>) -> bool {
        let Ok(path) = absolute(path.as_ref()) else {
            return false;
        };
        let mut state = self.lock_loaded();
        let removed = state.entries.remove(&path).is_some();
        if removed {
            state.dirty = true;
        }
        removed
    }

    /// Cached entry for `path`, without validating it against the file.
    pub fn entry(&self, path: impl AsRef<Path>) -> Option<CacheEntry> {
        let path = absolute(path.as_ref()).ok()?;
        self.lock_loaded().entries.get(&path).cloned()
    }

    /// Snapshot of all entries, ordered by path.
    pub fn entries(&self) -> BTreeMap<PathBuf, CacheEntry> {
        self.lock_loaded()
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock_loaded().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_dirty(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .dirty
    }

    pub fn stats(&self) -> HashStoreStats {
        HashStoreStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }

    /// Persist the cache if it changed since the last flush, or always when
    /// `force` is set.
    ///
    /// Write failures are logged and swallowed; the dirty flag stays set so a
    /// later flush retries. Returns whether the file was written.
    pub fn flush(&self, force: bool) -> bool {
        let mut state = self.lock_loaded();
        if !state.dirty && !force {
            return false;
        }

        let persisted = PersistedStore {
            format_version: HashStoreConfig::FORMAT_VERSION,
            entries: state
                .entries
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        };

        match write_json(&self.path, &persisted) {
            Ok(()) => {
                state.dirty = false;
                debug!(
                    "Saved {} hash cache entries to {}",
                    persisted.entries.len(),
                    self.path.display()
                );
                true
            }
            Err(e) => {
                warn!("Failed to save hash cache to {}: {}", self.path.display(), e);
                false
            }
        }
    }

    /// Guard that flushes the store when dropped, on every exit path.
    pub fn flush_guard(&self) -> FlushGuard<'_> {
        FlushGuard { store: self }
    }

    fn lock_loaded(&self) -> MutexGuard<'_, StoreState> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.loaded {
            let (entries, dirty) = self.load_from_disk();
            state.entries = entries;
            state.dirty = dirty;
            state.loaded = true;
        }
        state
    }

    /// Read the backing file. Any failure yields an empty cache.
    fn load_from_disk(&self) -> (HashMap<PathBuf, CacheEntry>, bool) {
        match read_json::<PersistedStore>(&self.path) {
            Ok(Some(persisted)) if persisted.format_version == HashStoreConfig::FORMAT_VERSION => {
                debug!(
                    "Loaded {} hash cache entries from {}",
                    persisted.entries.len(),
                    self.path.display()
                );
                (persisted.entries.into_iter().collect(), false)
            }
            Ok(Some(persisted)) => {
                warn!(
                    "Hash cache {} has format version {}, expected {}; discarding",
                    self.path.display(),
                    persisted.format_version,
                    HashStoreConfig::FORMAT_VERSION
                );
                (HashMap::new(), true)
            }
            Ok(None) => (HashMap::new(), false),
            Err(e) => {
                warn!("Failed to read hash cache {}: {}; starting empty", self.path.display(), e);
                (HashMap::new(), true)
            }
        }
    }
}

/// Flushes the owning [`HashStore`] when dropped.
#[must_use = "the store is flushed when the guard is dropped"]
pub struct FlushGuard<'a> {
    store: &'a HashStore,
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.store.flush(false);
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_cache_hit_reads_no_content() {
        let dir = TempDir::new().unwrap();
        let model = write_file(&dir, "model.onnx", b"weights");
        let store = HashStore::in_dir(dir.path());

        let first = store.get_or_compute_hash(&model).unwrap();
        let second = store.get_or_compute_hash(&model).unwrap();

        assert_eq!(first, second);
        let stats = store.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn test_rewrite_with_new_size_recomputes() {
        let dir = TempDir::new().unwrap();
        let model = write_file(&dir, "model.pth", b"v1");
        let store = HashStore::in_dir(dir.path());

        let first = store.get_or_compute_hash(&model).unwrap();
        fs::write(&model, b"version two").unwrap();
        let second = store.get_or_compute_hash(&model).unwrap();

        assert_ne!(first, second);
        assert_eq!(store.stats().misses, 2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_same_size_same_mtime_rewrite_returns_cached_hash() {
        let dir = TempDir::new().unwrap();
        let model = write_file(&dir, "model.pth", b"aaaa");
        let pinned = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        fs::File::options()
            .write(true)
            .open(&model)
            .unwrap()
            .set_modified(pinned)
            .unwrap();
        let store = HashStore::in_dir(dir.path());
        let original = store.get_or_compute_hash(&model).unwrap();

        fs::write(&model, b"bbbb").unwrap();
        fs::File::options()
            .write(true)
            .open(&model)
            .unwrap()
            .set_modified(pinned)
            .unwrap();

        // Size and mtime are unchanged, so the cached value is trusted.
        assert_eq!(store.get_or_compute_hash(&model).unwrap(), original);
        assert_eq!(store.stats().misses, 1);
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = HashStore::in_dir(dir.path());
        let result = store.get_or_compute_hash(dir.path().join("absent.onnx"));
        assert!(matches!(result, Err(FaceToolsError::FileNotFound(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn test_flush_only_when_dirty() {
        let dir = TempDir::new().unwrap();
        let model = write_file(&dir, "a.onnx", b"a");
        let store = HashStore::in_dir(dir.path());

        assert!(!store.flush(false));
        assert!(!store.path().exists());

        store.get_or_compute_hash(&model).unwrap();
        assert!(store.is_dirty());
        assert!(store.flush(false));
        assert!(!store.is_dirty());
        assert!(!store.flush(false));
        assert!(store.flush(true));
    }

    #[test]
    fn test_round_trip_preserves_entries() {
        let dir = TempDir::new().unwrap();
        let a = write_file(&dir, "a.onnx", b"a");
        let b = write_file(&dir, "b.onnx", b"bb");
        let c = write_file(&dir, "c.onnx", b"ccc");

        let store = HashStore::in_dir(dir.path());
        for path in [&a, &b, &c] {
            store.get_or_compute_hash(path).unwrap();
        }
        store.flush(false);

        let reloaded = HashStore::in_dir(dir.path());
        assert_eq!(reloaded.entries(), store.entries());
        assert_eq!(reloaded.len(), 3);

        // Reloaded entries are served as hits
        reloaded.get_or_compute_hash(&b).unwrap();
        assert_eq!(reloaded.stats().misses, 0);
    }

    #[test]
    fn test_version_mismatch_discards_entries() {
        let dir = TempDir::new().unwrap();
        let a = write_file(&dir, "a.onnx", b"a");
        let store = HashStore::in_dir(dir.path());
        store.get_or_compute_hash(&a).unwrap();
        store.flush(false);

        let mut raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        raw["formatVersion"] = serde_json::json!(HashStoreConfig::FORMAT_VERSION + 1);
        fs::write(store.path(), serde_json::to_vec(&raw).unwrap()).unwrap();

        let reloaded = HashStore::in_dir(dir.path());
        assert!(reloaded.is_empty());
    }

    #[test]
    fn test_corrupt_cache_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let store = HashStore::in_dir(dir.path());
        fs::write(store.path(), b"\x00garbage").unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_persisted_layout() {
        let dir = TempDir::new().unwrap();
        let a = write_file(&dir, "a.onnx", b"abc");
        let store = HashStore::in_dir(dir.path());
        store.get_or_compute_hash(&a).unwrap();
        store.flush(false);

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw["formatVersion"], HashStoreConfig::FORMAT_VERSION);
        let entry = &raw["entries"][a.to_string_lossy().as_ref()];
        assert_eq!(entry["fileSize"], 3);
        assert!(entry["lastWriteTime"].is_i64());
        assert_eq!(
            entry["hashSha256"],
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_flush_guard_flushes_on_drop() {
        let dir = TempDir::new().unwrap();
        let a = write_file(&dir, "a.onnx", b"a");
        let store = HashStore::in_dir(dir.path());
        {
            let _guard = store.flush_guard();
            store.get_or_compute_hash(&a).unwrap();
        }
        assert!(store.path().exists());
        assert!(!store.is_dirty());
    }

    #[test]
    fn test_invalidate() {
        let dir = TempDir::new().unwrap();
        let a = write_file(&dir, "a.onnx", b"a");
        let store = HashStore::in_dir(dir.path());
        store.get_or_compute_hash(&a).unwrap();
        assert!(store.invalidate(&a));
        assert!(!store.invalidate(&a));
        assert!(store.entry(&a).is_none());
    }

    #[test]
    fn test_concurrent_callers_share_one_load() {
        let dir = TempDir::new().unwrap();
        let paths: Vec<PathBuf> = (0..8)
            .map(|i| write_file(&dir, &format!("m{i}.onnx"), format!("model {i}").as_bytes()))
            .collect();
        let store = std::sync::Arc::new(HashStore::in_dir(dir.path()));

        let handles: Vec<_> = paths
            .iter()
            .cloned()
            .map(|p| {
                let store = store.clone();
                std::thread::spawn(move || store.get_or_compute_hash(p).unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.len(), 8);
        assert_eq!(store.stats().misses, 8);
    }
}
