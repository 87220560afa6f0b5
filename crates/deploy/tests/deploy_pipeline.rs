//! End-to-end runs of the deployment state machine against the in-memory
//! object store and CDN.
//!
//! Covered:
//! - first and repeat deployments of a small site (targeted invalidation)
//! - transient upload failures that recover within the retry budget
//! - empty build output, forced upload failure, invalidation rejection
//! - verification: advisory vs blocking, timeouts, isolation
//! - cancellation before and during the upload, prune, completion polling
//! - single-stage commands

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tempfile::TempDir;

use sitepush_cdn::{CdnError, InvalidationStatus, MemoryCdnClient};
use sitepush_common::{CancellationFlag, RetrySettings};
use sitepush_deploy::{
    CommandBuild, DeployOptions, DeployState, DeploymentOrchestrator, DeploymentReport, ExistingOutput,
    HttpProbe, ProbeResponse, Stage, StageName, StageStatus, VerifyTarget,
};
use sitepush_filesystem::{DeployManifest, MANIFEST_VERSION};
use sitepush_storage::{
    store_manifest, BucketLocation, MemoryStorageClient, ObjectHeaders, ObjectInfo,
    StorageClient, StorageError, UploadOptions,
};

const BUCKET: &str = "www-example";
const DISTRIBUTION: &str = "E2EXAMPLE";
const MANIFEST_KEY: &str = ".sitepush/manifest.json";

/// Probe answering from a fixed table; unknown URLs are connection errors.
#[derive(Default)]
struct TableProbe {
    responses: HashMap<String, ProbeResponse>,
    /// URLs that never answer within any reasonable timeout.
    hanging: Vec<String>,
}

impl TableProbe {
    fn ok(mut self, url: &str, content_type: &str) -> Self {
        self.responses.insert(
            url.to_string(),
            ProbeResponse {
                status: 200,
                content_type: Some(content_type.to_string()),
            },
        );
        self
    }

    fn status(mut self, url: &str, status: u16) -> Self {
        self.responses.insert(
            url.to_string(),
            ProbeResponse {
                status,
                content_type: Some("text/html".to_string()),
            },
        );
        self
    }

    fn hang(mut self, url: &str) -> Self {
        self.hanging.push(url.to_string());
        self
    }
}

#[async_trait]
impl HttpProbe for TableProbe {
    async fn get(&self, url: &str) -> Result<ProbeResponse, String> {
        if self.hanging.iter().any(|u| u == url) {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        self.responses
            .get(url)
            .cloned()
            .ok_or_else(|| format!("connection refused: {}", url))
    }
}

/// Object store that raises the cancellation flag once its first put lands.
struct InterruptedStorage {
    inner: MemoryStorageClient,
    cancel: CancellationFlag,
}

#[async_trait]
impl StorageClient for InterruptedStorage {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: &[u8],
        headers: &ObjectHeaders,
    ) -> Result<(), StorageError> {
        self.inner.put_object(bucket, key, data, headers).await
    }

    async fn put_object_from_file(
        &self,
        bucket: &str,
        key: &str,
        file_path: &Path,
        headers: &ObjectHeaders,
    ) -> Result<(), StorageError> {
        let result = self.inner.put_object_from_file(bucket, key, file_path, headers).await;
        self.cancel.cancel();
        result
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        self.inner.get_object(bucket, key).await
    }

    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectInfo>, StorageError> {
        self.inner.list_objects(bucket, prefix).await
    }

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<(), StorageError> {
        self.inner.delete_objects(bucket, keys).await
    }
}

fn write_file(root: &Path, relative: &str, body: &str) {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, body).unwrap();
}

/// `index.html`, `about/index.html` and one content-hashed script.
fn small_site() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "index.html", "<h1>home</h1>");
    write_file(dir.path(), "about/index.html", "<h1>about</h1>");
    write_file(dir.path(), "_next/static/abc123.js", "console.log('abc123')");
    dir
}

fn location() -> BucketLocation {
    BucketLocation::new(BUCKET, "")
}

fn fast_retry() -> RetrySettings {
    RetrySettings::default().with_initial_backoff_ms(1)
}

fn options() -> DeployOptions {
    DeployOptions {
        upload: UploadOptions::new().with_retry(fast_retry()),
        invalidation_retry: fast_retry(),
        poll_interval: Duration::from_millis(5),
        ..DeployOptions::new(location(), DISTRIBUTION)
    }
}

/// Store a manifest describing an earlier deployment with no files.
async fn seed_empty_manifest(storage: &MemoryStorageClient) {
    let manifest = DeployManifest {
        version: MANIFEST_VERSION,
        created_at: Utc::now(),
        files: BTreeMap::new(),
    };
    store_manifest(storage, &location(), &manifest).await.unwrap();
}

async fn deploy(
    storage: &MemoryStorageClient,
    cdn: &MemoryCdnClient,
    site: &Path,
    probe: &TableProbe,
    options: DeployOptions,
) -> DeploymentReport {
    let build = ExistingOutput::new(site);
    DeploymentOrchestrator::new(storage, cdn, &build, probe, options)
        .run()
        .await
}

#[tokio::test]
async fn test_small_site_publishes_with_targeted_invalidation() {
    let site = small_site();
    let storage = MemoryStorageClient::new();
    let cdn = MemoryCdnClient::new();
    seed_empty_manifest(&storage).await;

    let report = deploy(&storage, &cdn, site.path(), &TableProbe::default(), options()).await;

    assert_eq!(report.final_state, DeployState::Succeeded, "{}", report);
    assert_eq!(
        report.transitions,
        vec![
            DeployState::Idle,
            DeployState::Building,
            DeployState::Uploading,
            DeployState::Invalidating,
            DeployState::Verifying,
            DeployState::Succeeded,
        ]
    );
    assert_eq!(report.upload.as_ref().unwrap().files_uploaded, 3);

    let index = storage.object(BUCKET, "index.html").unwrap();
    assert_eq!(index.headers.cache_control, "public, max-age=0, must-revalidate");
    assert_eq!(index.headers.content_type, "text/html; charset=utf-8");
    let about = storage.object(BUCKET, "about/index.html").unwrap();
    assert_eq!(about.headers.cache_control, "public, max-age=0, must-revalidate");
    let script = storage.object(BUCKET, "_next/static/abc123.js").unwrap();
    assert_eq!(script.headers.cache_control, "public, max-age=31536000, immutable");

    let submissions = cdn.submissions();
    assert_eq!(submissions.len(), 1);
    let paths = &submissions[0].paths;
    assert!(paths.contains(&"/".to_string()), "{:?}", paths);
    assert!(paths.contains(&"/about*".to_string()), "{:?}", paths);
    assert!(!paths.iter().any(|p| p.contains("abc123")), "{:?}", paths);
    assert!(!paths.contains(&"/*".to_string()));

    assert_eq!(
        report.stage(StageName::Verify).unwrap().status,
        StageStatus::Skipped
    );
}

#[tokio::test]
async fn test_first_deploy_without_manifest_invalidates_everything() {
    let site = small_site();
    let storage = MemoryStorageClient::new();
    let cdn = MemoryCdnClient::new();

    let report = deploy(&storage, &cdn, site.path(), &TableProbe::default(), options()).await;

    assert!(report.succeeded(), "{}", report);
    assert_eq!(cdn.submissions()[0].paths, vec!["/*"]);
    assert!(report.invalidation.as_ref().unwrap().wildcard);
    assert!(storage.object(BUCKET, MANIFEST_KEY).is_some());
}

#[tokio::test]
async fn test_repeat_deploy_only_invalidates_changes() {
    let site = small_site();
    let storage = MemoryStorageClient::new();
    let cdn = MemoryCdnClient::new();

    let first = deploy(&storage, &cdn, site.path(), &TableProbe::default(), options()).await;
    assert!(first.succeeded(), "{}", first);

    // Unchanged site: nothing to purge.
    let second = deploy(&storage, &cdn, site.path(), &TableProbe::default(), options()).await;
    assert!(second.succeeded(), "{}", second);
    assert_eq!(cdn.submissions().len(), 1);
    assert_eq!(
        second.stage(StageName::Invalidate).unwrap().status,
        StageStatus::Skipped
    );

    write_file(site.path(), "about/index.html", "<h1>about us</h1>");
    let third = deploy(&storage, &cdn, site.path(), &TableProbe::default(), options()).await;
    assert!(third.succeeded(), "{}", third);
    assert_eq!(cdn.submissions().len(), 2);
    assert_eq!(cdn.submissions()[1].paths, vec!["/about*"]);
}

#[tokio::test]
async fn test_transient_failures_recover_within_retry_budget() {
    let site = small_site();
    let storage = MemoryStorageClient::new();
    let cdn = MemoryCdnClient::new();
    storage.fail_key("about/index.html", 2);

    let report = deploy(&storage, &cdn, site.path(), &TableProbe::default(), options()).await;

    assert_eq!(report.final_state, DeployState::Succeeded, "{}", report);
    assert_eq!(storage.put_attempts("about/index.html"), 3);
    let upload = report.upload.as_ref().unwrap();
    assert_eq!(upload.files_uploaded, 3);
    assert_eq!(upload.retries, 2);
    assert!(upload.failed_keys.is_empty());
}

#[tokio::test]
async fn test_empty_build_fails_before_any_remote_call() {
    let site = tempfile::tempdir().unwrap();
    let storage = MemoryStorageClient::new();
    let cdn = MemoryCdnClient::new();

    let report = deploy(&storage, &cdn, site.path(), &TableProbe::default(), options()).await;

    assert_eq!(report.final_state, DeployState::Failed);
    assert_eq!(
        report.transitions,
        vec![DeployState::Idle, DeployState::Building, DeployState::Failed]
    );
    assert_eq!(storage.put_count(), 0);
    assert_eq!(cdn.create_calls(), 0);
    assert!(report.error.as_deref().unwrap().contains("no files"));
}

#[tokio::test]
async fn test_failed_upload_never_reaches_invalidation() {
    let site = small_site();
    let storage = MemoryStorageClient::new();
    let cdn = MemoryCdnClient::new();
    storage.fail_key("about/index.html", 100);

    let report = deploy(&storage, &cdn, site.path(), &TableProbe::default(), options()).await;

    assert_eq!(report.final_state, DeployState::Failed);
    assert!(!report.transitions.contains(&DeployState::Invalidating));
    assert_eq!(cdn.create_calls(), 0);
    assert_eq!(
        report.upload.as_ref().unwrap().failed_keys,
        vec!["about/index.html".to_string()]
    );
    assert_eq!(storage.put_attempts("about/index.html"), 3);
    assert!(storage.object(BUCKET, MANIFEST_KEY).is_none());
    assert!(report.to_string().contains("failed upload: about/index.html"));
}

#[tokio::test]
async fn test_rejected_invalidation_fails_after_origin_update() {
    let site = small_site();
    let storage = MemoryStorageClient::new();
    let cdn = MemoryCdnClient::new();
    cdn.fail_submissions(
        1,
        CdnError::Rejected {
            message: "InvalidArgument".into(),
        },
    );
    let probe = TableProbe::default().ok("https://example.com/", "text/html");
    let options = DeployOptions {
        verify_targets: vec![VerifyTarget::new("https://example.com/").unwrap()],
        ..options()
    };

    let report = deploy(&storage, &cdn, site.path(), &probe, options).await;

    assert_eq!(report.final_state, DeployState::Failed);
    assert!(!report.transitions.contains(&DeployState::Verifying));
    assert!(report.verification.is_empty());
    assert_eq!(cdn.create_calls(), 1);
    assert!(report.error.as_deref().unwrap().contains("origin already updated"));
    assert!(storage.object(BUCKET, "index.html").is_some());
    // The failed purge must be retried by the next run.
    assert!(storage.object(BUCKET, MANIFEST_KEY).is_none());
}

#[tokio::test]
async fn test_throttled_invalidation_is_retried() {
    let site = small_site();
    let storage = MemoryStorageClient::new();
    let cdn = MemoryCdnClient::new();
    cdn.fail_submissions(
        2,
        CdnError::Throttled {
            message: "TooManyInvalidationsInProgress".into(),
        },
    );

    let report = deploy(&storage, &cdn, site.path(), &TableProbe::default(), options()).await;

    assert!(report.succeeded(), "{}", report);
    assert_eq!(cdn.create_calls(), 3);
}

#[tokio::test]
async fn test_advisory_verification_failure_still_succeeds() {
    let site = small_site();
    let storage = MemoryStorageClient::new();
    let cdn = MemoryCdnClient::new();
    let probe = TableProbe::default()
        .ok("https://example.com/", "text/html; charset=utf-8")
        .status("https://example.com/about", 503);
    let options = DeployOptions {
        verify_targets: vec![
            VerifyTarget::new("https://example.com/").unwrap(),
            VerifyTarget::new("https://example.com/about").unwrap(),
        ],
        ..options()
    };

    let report = deploy(&storage, &cdn, site.path(), &probe, options).await;

    assert_eq!(report.final_state, DeployState::Succeeded, "{}", report);
    assert_eq!(
        report.stage(StageName::Verify).unwrap().status,
        StageStatus::Advisory
    );
    assert_eq!(report.verification.len(), 2);
    assert!(report.verification[0].passed);
    assert!(!report.verification[1].passed);
    assert_eq!(report.verification[1].actual_status, Some(503));
}

#[tokio::test]
async fn test_blocking_verification_failure_fails_run() {
    let site = small_site();
    let storage = MemoryStorageClient::new();
    let cdn = MemoryCdnClient::new();
    let probe = TableProbe::default().status("https://example.com/", 404);
    let options = DeployOptions {
        verify_targets: vec![VerifyTarget::new("https://example.com/").unwrap()],
        verify_blocking: true,
        ..options()
    };

    let report = deploy(&storage, &cdn, site.path(), &probe, options).await;

    assert_eq!(report.final_state, DeployState::Failed);
    assert!(report.transitions.contains(&DeployState::Verifying));
    assert_eq!(cdn.submissions().len(), 1);
    assert!(report.error.as_deref().unwrap().contains("1 of 1"));
}

#[tokio::test]
async fn test_timeout_counts_as_failure_and_does_not_stop_other_checks() {
    let probe = TableProbe::default()
        .hang("https://example.com/slow")
        .status("https://example.com/missing", 404)
        .ok("https://example.com/", "text/html");
    let targets: Vec<VerifyTarget> = vec![
        VerifyTarget::new("https://example.com/slow").unwrap(),
        VerifyTarget::new("https://example.com/missing").unwrap(),
        VerifyTarget::new("https://example.com/").unwrap(),
    ];
    let storage = MemoryStorageClient::new();
    let cdn = MemoryCdnClient::new();
    let build = ExistingOutput::new("unused");
    let options = DeployOptions {
        verify_targets: targets,
        verify_blocking: true,
        verify_timeout: Duration::from_millis(50),
        ..options()
    };

    let report = DeploymentOrchestrator::new(&storage, &cdn, &build, &probe, options)
        .run_stage(Stage::Verify)
        .await;

    assert_eq!(report.final_state, DeployState::Failed);
    let entries = &report.verification;
    assert_eq!(entries.len(), 3);
    assert!(!entries[0].passed);
    assert_eq!(entries[0].actual_status, None);
    assert!(entries[0].error.as_deref().unwrap().contains("timed out"));
    assert!(!entries[1].passed);
    assert!(entries[2].passed);
}

#[tokio::test]
async fn test_cancelled_run_does_not_publish() {
    let site = small_site();
    let storage = MemoryStorageClient::new();
    let cdn = MemoryCdnClient::new();
    let build = ExistingOutput::new(site.path());
    let probe = TableProbe::default();
    let cancel = CancellationFlag::new();
    cancel.cancel();

    let report = DeploymentOrchestrator::new(&storage, &cdn, &build, &probe, options())
        .with_cancellation(cancel)
        .run()
        .await;

    assert_eq!(report.final_state, DeployState::Failed);
    assert_eq!(storage.put_count(), 0);
    assert_eq!(cdn.create_calls(), 0);
}

#[tokio::test]
async fn test_cancel_during_upload_finishes_in_flight_put_then_fails() {
    let site = small_site();
    let cancel = CancellationFlag::new();
    let storage = InterruptedStorage {
        inner: MemoryStorageClient::new(),
        cancel: cancel.clone(),
    };
    let cdn = MemoryCdnClient::new();
    let build = ExistingOutput::new(site.path());
    let probe = TableProbe::default();
    let options = DeployOptions {
        upload: UploadOptions::new()
            .with_retry(fast_retry())
            .with_max_concurrency(1),
        ..options()
    };

    let report = DeploymentOrchestrator::new(&storage, &cdn, &build, &probe, options)
        .with_cancellation(cancel)
        .run()
        .await;

    assert_eq!(report.final_state, DeployState::Failed, "{}", report);
    assert_eq!(storage.inner.put_count(), 1);
    assert_eq!(cdn.create_calls(), 0);
    assert!(!report.transitions.contains(&DeployState::Invalidating));
    assert_eq!(
        report.stage(StageName::Upload).unwrap().status,
        StageStatus::Failed
    );
}

#[tokio::test]
async fn test_prune_removes_and_invalidates_stale_objects() {
    let site = small_site();
    let storage = MemoryStorageClient::new();
    let cdn = MemoryCdnClient::new();

    let first = deploy(&storage, &cdn, site.path(), &TableProbe::default(), options()).await;
    assert!(first.succeeded(), "{}", first);
    storage.insert(
        BUCKET,
        "old/page.html",
        b"stale",
        &ObjectHeaders::new("text/html", "public, max-age=0, must-revalidate"),
    );

    let options = DeployOptions {
        upload: UploadOptions::new().with_retry(fast_retry()).with_prune(true),
        ..options()
    };
    let report = deploy(&storage, &cdn, site.path(), &TableProbe::default(), options).await;

    assert!(report.succeeded(), "{}", report);
    assert_eq!(report.upload.as_ref().unwrap().pruned, vec!["old/page.html"]);
    assert!(storage.object(BUCKET, "old/page.html").is_none());
    assert!(storage.object(BUCKET, MANIFEST_KEY).is_some());
    assert_eq!(cdn.submissions()[1].paths, vec!["/old/page.html"]);
}

#[tokio::test]
async fn test_awaited_invalidation_reports_completion() {
    let site = small_site();
    let storage = MemoryStorageClient::new();
    let cdn = MemoryCdnClient::new().complete_after_polls(2);
    let options = DeployOptions {
        await_invalidation: true,
        ..options()
    };

    let report = deploy(&storage, &cdn, site.path(), &TableProbe::default(), options).await;

    assert!(report.succeeded(), "{}", report);
    assert_eq!(
        report.invalidation.as_ref().unwrap().status,
        Some(InvalidationStatus::Completed)
    );
    assert_eq!(cdn.status_calls(), 2);
}

#[tokio::test]
async fn test_invalidation_timeout_is_advisory() {
    let site = small_site();
    let storage = MemoryStorageClient::new();
    let cdn = MemoryCdnClient::new().complete_after_polls(u32::MAX);
    let options = DeployOptions {
        await_invalidation: true,
        invalidation_timeout: Duration::from_millis(30),
        ..options()
    };

    let report = deploy(&storage, &cdn, site.path(), &TableProbe::default(), options).await;

    assert_eq!(report.final_state, DeployState::Succeeded, "{}", report);
    assert_eq!(
        report.invalidation.as_ref().unwrap().status,
        Some(InvalidationStatus::TimedOut)
    );
    assert_eq!(
        report.stage(StageName::Invalidate).unwrap().status,
        StageStatus::Advisory
    );
}

#[tokio::test]
async fn test_invalidate_stage_alone_purges_everything() {
    let storage = MemoryStorageClient::new();
    let cdn = MemoryCdnClient::new();
    let build = ExistingOutput::new("unused");
    let probe = TableProbe::default();

    let report = DeploymentOrchestrator::new(&storage, &cdn, &build, &probe, options())
        .run_stage(Stage::Invalidate)
        .await;

    assert!(report.succeeded(), "{}", report);
    assert_eq!(
        report.transitions,
        vec![DeployState::Idle, DeployState::Invalidating, DeployState::Succeeded]
    );
    assert_eq!(cdn.submissions()[0].paths, vec!["/*"]);
    assert_eq!(storage.put_count(), 0);
}

#[tokio::test]
async fn test_upload_stage_alone_does_not_touch_cdn() {
    let site = small_site();
    let storage = MemoryStorageClient::new();
    let cdn = MemoryCdnClient::new();
    let build = ExistingOutput::new(site.path());
    let probe = TableProbe::default();

    let report = DeploymentOrchestrator::new(&storage, &cdn, &build, &probe, options())
        .run_stage(Stage::Upload)
        .await;

    assert!(report.succeeded(), "{}", report);
    assert_eq!(storage.put_count(), 3);
    assert_eq!(cdn.create_calls(), 0);
    assert!(storage.object(BUCKET, MANIFEST_KEY).is_none());
}

#[cfg(unix)]
#[tokio::test]
async fn test_upload_stage_publishes_earlier_build_without_rebuilding() {
    let workdir = tempfile::tempdir().unwrap();
    write_file(workdir.path(), "out/index.html", "<h1>built earlier</h1>");
    let storage = MemoryStorageClient::new();
    let cdn = MemoryCdnClient::new();
    let build = CommandBuild::new("touch BUILD_RAN && echo rebuilt > out/index.html", "out")
        .with_working_dir(workdir.path());
    let probe = TableProbe::default();

    let report = DeploymentOrchestrator::new(&storage, &cdn, &build, &probe, options())
        .run_stage(Stage::Upload)
        .await;

    assert!(report.succeeded(), "{}", report);
    let marker: PathBuf = workdir.path().join("BUILD_RAN");
    assert!(!marker.exists());
    assert_eq!(storage.put_count(), 1);
    assert_eq!(
        storage.object(BUCKET, "index.html").unwrap().data,
        b"<h1>built earlier</h1>"
    );
}
