//! Integration tests for model provisioning against real files.

mod support;

use facetools_core::{
    BackendRoot, BackendStatus, FaceToolsError, HashStore, ModelDescriptor, ModelRegistry,
    ProvisionOutcome, Provisioner, StaticBackends,
};
use std::sync::Arc;
use support::{place, sha256, RecordingDownloader, CORRUPT, GOOD};
use tempfile::TempDir;

const SWAP_MODEL: &str = "models/insightface/inswapper_128.onnx";
const ARCHIVE_MODEL: &str = "models/insightface/models/buffalo_l/det_10g.onnx";
const SWAP_URL: &str = "https://example.invalid/inswapper_128.onnx";

struct Fixture {
    data: TempDir,
    backend: TempDir,
    store: Arc<HashStore>,
    downloader: Arc<RecordingDownloader>,
    provisioner: Provisioner,
}

fn fixture(downloader: RecordingDownloader) -> Fixture {
    let data = TempDir::new().unwrap();
    let backend = TempDir::new().unwrap();
    let registry = ModelRegistry::from_descriptors([
        ModelDescriptor::new(SWAP_MODEL, sha256(GOOD)).with_source_url(SWAP_URL),
        ModelDescriptor::new(ARCHIVE_MODEL, sha256(GOOD)),
    ])
    .unwrap();
    let store = Arc::new(HashStore::in_dir(data.path()));
    let downloader = Arc::new(downloader);
    let provisioner = Provisioner::new(store.clone(), Arc::new(registry), downloader.clone());
    Fixture {
        data,
        backend,
        store,
        downloader,
        provisioner,
    }
}

#[tokio::test]
async fn test_second_ensure_is_cache_hit_without_download() {
    let f = fixture(RecordingDownloader::serving(GOOD));
    place(f.backend.path(), SWAP_MODEL, GOOD);

    let first = f.provisioner.ensure_model(SWAP_MODEL, f.backend.path()).await.unwrap();
    let second = f.provisioner.ensure_model(SWAP_MODEL, f.backend.path()).await.unwrap();

    assert_eq!(first, ProvisionOutcome::Verified);
    assert_eq!(second, ProvisionOutcome::Verified);
    let stats = f.store.stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 1);
    assert!(f.downloader.calls().is_empty());
}

#[tokio::test]
async fn test_corrupt_file_with_url_is_redownloaded_once() {
    let f = fixture(RecordingDownloader::serving(GOOD));
    let path = place(f.backend.path(), SWAP_MODEL, CORRUPT);

    let outcome = f.provisioner.ensure_model(SWAP_MODEL, f.backend.path()).await.unwrap();

    assert_eq!(outcome, ProvisionOutcome::Recovered);
    let calls = f.downloader.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].destination, path);
    assert_eq!(calls[0].url, SWAP_URL);
    assert_eq!(std::fs::read(&path).unwrap(), GOOD);
    assert_eq!(f.store.entry(&path).unwrap().hash_sha256, sha256(GOOD));
}

#[tokio::test]
async fn test_corrupt_file_without_url_is_integrity_error() {
    let f = fixture(RecordingDownloader::serving(GOOD));
    let path = place(f.backend.path(), ARCHIVE_MODEL, CORRUPT);

    let err = f
        .provisioner
        .ensure_model(ARCHIVE_MODEL, f.backend.path())
        .await
        .unwrap_err();

    match &err {
        FaceToolsError::Integrity {
            model_id,
            expected_prefix,
            actual_prefix,
            remediation,
            ..
        } => {
            assert_eq!(model_id, ARCHIVE_MODEL);
            assert_eq!(expected_prefix, &sha256(GOOD)[..8]);
            assert_eq!(actual_prefix, &sha256(CORRUPT)[..8]);
            assert!(remediation.contains("buffalo_l"));
        }
        other => panic!("expected integrity error, got {:?}", other),
    }
    assert!(err.is_user_facing());
    // The file is left for the user to deal with
    assert_eq!(std::fs::read(&path).unwrap(), CORRUPT);
    assert!(f.downloader.calls().is_empty());
}

#[tokio::test]
async fn test_missing_file_is_downloaded() {
    let f = fixture(RecordingDownloader::serving(GOOD));

    let outcome = f.provisioner.ensure_model(SWAP_MODEL, f.backend.path()).await.unwrap();

    assert_eq!(outcome, ProvisionOutcome::Verified);
    assert_eq!(f.downloader.calls().len(), 1);
    assert!(f.backend.path().join(SWAP_MODEL).exists());
}

#[tokio::test]
async fn test_missing_file_that_cannot_be_fetched_is_absent() {
    let f = fixture(RecordingDownloader::failing());

    let with_url = f.provisioner.ensure_model(SWAP_MODEL, f.backend.path()).await.unwrap();
    let without_url = f.provisioner.ensure_model(ARCHIVE_MODEL, f.backend.path()).await.unwrap();

    assert_eq!(with_url, ProvisionOutcome::Absent);
    assert_eq!(without_url, ProvisionOutcome::Absent);
    assert_eq!(f.downloader.calls().len(), 1);
}

#[tokio::test]
async fn test_unknown_model_is_unmanaged() {
    let f = fixture(RecordingDownloader::serving(GOOD));
    place(f.backend.path(), "models/yolov8/face_yolov8m-seg_60.pt", CORRUPT);

    let outcome = f
        .provisioner
        .ensure_model("models/yolov8/face_yolov8m-seg_60.pt", f.backend.path())
        .await
        .unwrap();

    assert_eq!(outcome, ProvisionOutcome::Unmanaged);
    assert!(f.store.is_empty());
}

#[tokio::test]
async fn test_backends_loop_skips_unusable_roots() {
    let f = fixture(RecordingDownloader::serving(GOOD));
    let disabled = TempDir::new().unwrap();
    place(f.backend.path(), SWAP_MODEL, GOOD);
    let backends = StaticBackends::new(vec![
        BackendRoot::new(f.backend.path(), BackendStatus::Running),
        BackendRoot::new(disabled.path(), BackendStatus::Disabled),
    ]);

    let reports = f
        .provisioner
        .ensure_models_for_backends(&[SWAP_MODEL.to_string()], &backends)
        .await
        .unwrap();

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].backend_root, f.backend.path());
    assert_eq!(reports[0].outcome, ProvisionOutcome::Verified);
    assert!(!disabled.path().join(SWAP_MODEL).exists());
}

#[tokio::test]
async fn test_store_is_flushed_when_backends_loop_fails() {
    let f = fixture(RecordingDownloader::serving(GOOD));
    let good = place(f.backend.path(), SWAP_MODEL, GOOD);
    place(f.backend.path(), ARCHIVE_MODEL, CORRUPT);
    let backends = StaticBackends::running([f.backend.path()]);

    let result = f
        .provisioner
        .ensure_models_for_backends(&[SWAP_MODEL.to_string(), ARCHIVE_MODEL.to_string()], &backends)
        .await;

    assert!(matches!(result, Err(FaceToolsError::Integrity { .. })));
    assert!(!f.store.is_dirty());
    let reloaded = HashStore::in_dir(f.data.path());
    assert_eq!(reloaded.entry(&good).unwrap().hash_sha256, sha256(GOOD));
}

#[tokio::test]
async fn test_cache_survives_restart() {
    let f = fixture(RecordingDownloader::serving(GOOD));
    place(f.backend.path(), SWAP_MODEL, GOOD);
    let backends = StaticBackends::running([f.backend.path()]);
    f.provisioner
        .ensure_models_for_backends(&[SWAP_MODEL.to_string()], &backends)
        .await
        .unwrap();

    let store = Arc::new(HashStore::in_dir(f.data.path()));
    let registry = Arc::new(f.provisioner.registry().clone());
    let restarted = Provisioner::new(store.clone(), registry, f.downloader.clone());
    let outcome = restarted.ensure_model(SWAP_MODEL, f.backend.path()).await.unwrap();

    assert_eq!(outcome, ProvisionOutcome::Verified);
    assert_eq!(store.stats().hits, 1);
    assert_eq!(store.stats().misses, 0);
}

#[tokio::test]
async fn test_redownload_that_still_mismatches_is_integrity_error() {
    let f = fixture(RecordingDownloader::serving(CORRUPT));
    let path = place(f.backend.path(), SWAP_MODEL, CORRUPT);

    let err = f
        .provisioner
        .ensure_model(SWAP_MODEL, f.backend.path())
        .await
        .unwrap_err();

    match &err {
        FaceToolsError::Integrity {
            expected_prefix,
            actual_prefix,
            ..
        } => {
            assert_eq!(expected_prefix, &sha256(GOOD)[..8]);
            assert_eq!(actual_prefix, &sha256(CORRUPT)[..8]);
        }
        other => panic!("expected integrity error, got {:?}", other),
    }
    // Only one recovery attempt
    assert_eq!(f.downloader.calls().len(), 1);
    assert_eq!(f.store.entry(&path).unwrap().hash_sha256, sha256(CORRUPT));
}

#[tokio::test]
async fn test_failed_redownload_after_delete_is_error() {
    let f = fixture(RecordingDownloader::failing());
    let path = place(f.backend.path(), SWAP_MODEL, CORRUPT);

    let err = f
        .provisioner
        .ensure_model(SWAP_MODEL, f.backend.path())
        .await
        .unwrap_err();

    assert!(matches!(err, FaceToolsError::DownloadFailed { .. }));
    assert_eq!(f.downloader.calls().len(), 1);
    assert!(!path.exists());
    assert!(f.store.entry(&path).is_none());
}

#[tokio::test]
async fn test_concurrent_recovery_of_same_path_downloads_once() {
    let f = fixture(RecordingDownloader::serving(GOOD));
    let path = place(f.backend.path(), SWAP_MODEL, CORRUPT);

    let (first, second) = tokio::join!(
        f.provisioner.ensure_model(SWAP_MODEL, f.backend.path()),
        f.provisioner.ensure_model(SWAP_MODEL, f.backend.path()),
    );

    let mut outcomes = vec![first.unwrap(), second.unwrap()];
    outcomes.sort_by_key(|o| format!("{:?}", o));
    assert_eq!(
        outcomes,
        vec![ProvisionOutcome::Recovered, ProvisionOutcome::Verified]
    );
    assert_eq!(f.downloader.calls().len(), 1);
    assert_eq!(std::fs::read(&path).unwrap(), GOOD);
}
