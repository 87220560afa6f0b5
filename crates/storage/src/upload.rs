//! Site upload for any `StorageClient` implementation.
//!
//! This module publishes a [`BuildArtifactSet`] to a bucket location. It handles:
//!
//! - One put per file, keyed by the file's relative path
//! - Content-Type and Cache-Control per file
//! - Bounded parallelism (`buffer_unordered`)
//! - Per-file retry with exponential backoff
//! - Failure isolation: one failing file never stops its siblings
//! - Cancellation: no new file is started once the flag is raised
//! - Optional prune of remote objects with no local counterpart
//!
//! # Example
//!
//! ```ignore
//! use sitepush_storage::{BucketLocation, Uploader, UploadOptions};
//!
//! let uploader = Uploader::new(&client, BucketLocation::new("www-example", ""))
//!     .with_options(UploadOptions::default().with_prune(true));
//! let summary = uploader.upload(&artifacts, None).await?;
//! ```

use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use sitepush_common::{
    retry_counted, retry_with_backoff, CancellationFlag, ProgressCallback, RetrySettings,
    DEFAULT_REQUEST_TIMEOUT, DEFAULT_UPLOAD_CONCURRENCY,
};
use sitepush_filesystem::{ArtifactFile, BuildArtifactSet};

use crate::cache_policy::CachePolicySelector;
use crate::content_type::resolve_content_type;
use crate::error::{StorageError, TransferError};
use crate::traits::{ObjectHeaders, ObjectInfo, StorageClient};
use crate::types::{
    BucketLocation, OperationType, TransferProgress, TransferStatistics, UploadDescriptor,
    UploadSummary,
};

/// Maximum number of keys per delete request.
pub const DELETE_BATCH_SIZE: usize = 1000;

/// Options for upload operations.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Maximum concurrent file uploads.
    pub max_concurrency: usize,
    /// Retry settings applied to each file.
    pub retry: RetrySettings,
    /// Bound for each attempt of a put, list or delete.
    pub request_timeout: Duration,
    /// Delete remote objects that have no local file. Destructive; off by default.
    pub prune: bool,
    pub cache_policy: CachePolicySelector,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_UPLOAD_CONCURRENCY,
            retry: RetrySettings::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            prune: false,
            cache_policy: CachePolicySelector::default(),
        }
    }
}

impl UploadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_retry(mut self, retry: RetrySettings) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn with_prune(mut self, prune: bool) -> Self {
        self.prune = prune;
        self
    }

    pub fn with_cache_policy(mut self, cache_policy: CachePolicySelector) -> Self {
        self.cache_policy = cache_policy;
        self
    }
}

/// Bound one store request. Running out of time is a retryable network error.
pub async fn with_timeout<T, Fut>(
    limit: Duration,
    operation: &str,
    call: Fut,
) -> Result<T, StorageError>
where
    Fut: Future<Output = Result<T, StorageError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(StorageError::NetworkError {
            message: format!("{} timed out after {}ms", operation, limit.as_millis()),
            retryable: true,
        }),
    }
}

/// Result of one file's upload task.
enum FileOutcome {
    Done(TransferStatistics),
    /// Not started because the run was cancelled.
    Skipped,
}

/// Publishes build artifacts using any StorageClient implementation.
pub struct Uploader<'a, C: StorageClient> {
    client: &'a C,
    location: BucketLocation,
    options: UploadOptions,
    cancel: CancellationFlag,
}

impl<'a, C: StorageClient> Uploader<'a, C> {
    /// Create a new uploader.
    ///
    /// # Arguments
    /// * `client` - Storage client for object store operations
    /// * `location` - Bucket and prefix to publish under
    pub fn new(client: &'a C, location: BucketLocation) -> Self {
        Self {
            client,
            location,
            options: UploadOptions::default(),
            cancel: CancellationFlag::new(),
        }
    }

    pub fn with_options(mut self, options: UploadOptions) -> Self {
        self.options = options;
        self
    }

    /// Share a cancellation flag with the caller.
    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn location(&self) -> &BucketLocation {
        &self.location
    }

    /// Compute the upload descriptor for one artifact.
    pub fn descriptor_for(&self, file: &ArtifactFile) -> UploadDescriptor {
        UploadDescriptor {
            relative_path: file.relative_path.clone(),
            key: self.location.object_key(&file.relative_path),
            source: file.absolute_path.clone(),
            size: file.size,
            content_type: resolve_content_type(&file.relative_path),
            cache_control: self
                .options
                .cache_policy
                .select(&file.relative_path)
                .directive(),
        }
    }

    /// Upload every file of the artifact set exactly once (plus retries).
    ///
    /// Prune runs afterwards only if requested and every file succeeded.
    ///
    /// # Errors
    /// - `PartialUpload` if any file exhausted its retry budget; the
    ///   statistics list every failed key.
    /// - `Cancelled` if the cancellation flag (or the progress callback)
    ///   stopped the run before every file was started.
    pub async fn upload(
        &self,
        artifacts: &BuildArtifactSet,
        progress: Option<&dyn ProgressCallback<TransferProgress>>,
    ) -> Result<UploadSummary, StorageError> {
        let total_files: u64 = artifacts.len() as u64;
        let total_bytes: u64 = artifacts.total_bytes();

        let completed_count: Arc<AtomicU64> = Arc::new(AtomicU64::new(0));
        let completed_bytes: Arc<AtomicU64> = Arc::new(AtomicU64::new(0));
        let max_concurrency: usize = self.options.max_concurrency.max(1);

        tracing::info!(
            bucket = %self.location.bucket,
            prefix = %self.location.prefix,
            files = total_files,
            bytes = total_bytes,
            concurrency = max_concurrency,
            "Uploading build artifacts"
        );

        let outcomes: Vec<FileOutcome> = stream::iter(artifacts.files())
            .map(|file: &ArtifactFile| {
                let completed_count: Arc<AtomicU64> = Arc::clone(&completed_count);
                let completed_bytes: Arc<AtomicU64> = Arc::clone(&completed_bytes);

                async move {
                    if self.cancel.is_cancelled() {
                        return FileOutcome::Skipped;
                    }

                    let descriptor: UploadDescriptor = self.descriptor_for(file);

                    if let Some(cb) = progress {
                        let update: TransferProgress = TransferProgress {
                            operation: OperationType::Uploading,
                            current_key: descriptor.key.clone(),
                            current_total: descriptor.size,
                            overall_completed: completed_count.load(Ordering::Relaxed),
                            overall_total: total_files,
                            overall_bytes: completed_bytes.load(Ordering::Relaxed),
                            overall_total_bytes: total_bytes,
                        };
                        if !cb.on_progress(&update) {
                            self.cancel.cancel();
                            return FileOutcome::Skipped;
                        }
                    }

                    let stats: TransferStatistics = self.upload_one(&descriptor).await;

                    completed_count.fetch_add(1, Ordering::Relaxed);
                    completed_bytes.fetch_add(stats.bytes_transferred, Ordering::Relaxed);
                    FileOutcome::Done(stats)
                }
            })
            .buffer_unordered(max_concurrency)
            .collect()
            .await;

        let mut statistics: TransferStatistics = TransferStatistics::default();
        let mut skipped: u64 = 0;
        for outcome in outcomes {
            match outcome {
                FileOutcome::Done(stats) => statistics.merge(stats),
                FileOutcome::Skipped => skipped += 1,
            }
        }

        if !statistics.errors.is_empty() {
            tracing::error!(
                failed = statistics.errors.len(),
                keys = ?statistics.failed_keys(),
                "Upload incomplete"
            );
            return Err(StorageError::PartialUpload { statistics });
        }
        if skipped > 0 {
            tracing::warn!(
                uploaded = statistics.files_transferred,
                not_started = skipped,
                "Upload cancelled"
            );
            return Err(StorageError::Cancelled);
        }

        tracing::info!(
            files = statistics.files_transferred,
            bytes = statistics.bytes_transferred,
            retries = statistics.retries,
            "Upload complete"
        );

        let mut summary: UploadSummary = UploadSummary {
            statistics,
            ..Default::default()
        };

        if self.options.prune {
            match self.prune(artifacts, progress).await {
                Ok(pruned) => summary.pruned = pruned,
                Err(e) => {
                    tracing::warn!(error = %e, "Prune failed; stale objects remain");
                    summary.prune_error = Some(e.to_string());
                }
            }
        }

        Ok(summary)
    }

    /// Put one file, retrying transient failures.
    async fn upload_one(&self, descriptor: &UploadDescriptor) -> TransferStatistics {
        let headers: ObjectHeaders =
            ObjectHeaders::new(descriptor.content_type, descriptor.cache_control);

        let limit: Duration = self.options.request_timeout;
        let (result, attempts) = retry_counted(&self.options.retry, &descriptor.key, || {
            with_timeout(
                limit,
                "put",
                self.client.put_object_from_file(
                    &self.location.bucket,
                    &descriptor.key,
                    &descriptor.source,
                    &headers,
                ),
            )
        })
        .await;

        match result {
            Ok(()) => {
                tracing::debug!(
                    key = %descriptor.key,
                    content_type = descriptor.content_type,
                    cache_control = descriptor.cache_control,
                    attempts,
                    "Uploaded"
                );
                TransferStatistics::uploaded(descriptor.size, attempts)
            }
            Err(error) => {
                tracing::warn!(key = %descriptor.key, attempts, error = %error, "Upload failed");
                TransferStatistics::failed(TransferError::new(
                    descriptor.key.clone(),
                    error,
                    attempts,
                ))
            }
        }
    }

    /// Delete remote objects under the location that have no local file.
    ///
    /// The stored deploy manifest is never deleted.
    ///
    /// # Returns
    /// Relative paths of the deleted objects, sorted.
    pub async fn prune(
        &self,
        artifacts: &BuildArtifactSet,
        progress: Option<&dyn ProgressCallback<TransferProgress>>,
    ) -> Result<Vec<String>, StorageError> {
        let bucket: &str = &self.location.bucket;
        let list_prefix: String = self.location.list_prefix();
        let manifest_key: String = self.location.manifest_key();

        let limit: Duration = self.options.request_timeout;
        let remote: Vec<ObjectInfo> = retry_with_backoff(&self.options.retry, "list", || {
            with_timeout(limit, "list", self.client.list_objects(bucket, &list_prefix))
        })
        .await?;

        let local: HashSet<&str> = artifacts
            .files()
            .iter()
            .map(|f: &ArtifactFile| f.relative_path.as_str())
            .collect();

        let mut stale: Vec<(String, String)> = remote
            .iter()
            .filter(|obj: &&ObjectInfo| obj.key != manifest_key)
            .filter_map(|obj: &ObjectInfo| {
                let relative: &str = self.location.relative_path(&obj.key)?;
                (!local.contains(relative)).then(|| (obj.key.clone(), relative.to_string()))
            })
            .collect();
        stale.sort();

        if stale.is_empty() {
            tracing::info!("Prune: destination has no stale objects");
            return Ok(Vec::new());
        }

        tracing::info!(count = stale.len(), "Pruning stale objects");
        let total: u64 = stale.len() as u64;
        let mut deleted: Vec<String> = Vec::with_capacity(stale.len());

        for batch in stale.chunks(DELETE_BATCH_SIZE) {
            if self.cancel.is_cancelled() {
                return Err(StorageError::Cancelled);
            }

            let keys: Vec<String> = batch.iter().map(|(key, _)| key.clone()).collect();
            retry_with_backoff(&self.options.retry, "delete", || {
                with_timeout(limit, "delete", self.client.delete_objects(bucket, &keys))
            })
            .await?;

            deleted.extend(batch.iter().map(|(_, relative)| relative.clone()));

            if let Some(cb) = progress {
                let update: TransferProgress = TransferProgress {
                    operation: OperationType::Pruning,
                    current_key: keys.last().cloned().unwrap_or_default(),
                    current_total: 0,
                    overall_completed: deleted.len() as u64,
                    overall_total: total,
                    overall_bytes: 0,
                    overall_total_bytes: 0,
                };
                if !cb.on_progress(&update) {
                    self.cancel.cancel();
                }
            }
        }

        Ok(deleted)
    }
}
