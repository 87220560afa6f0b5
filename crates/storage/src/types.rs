//! Shared data structures for storage operations.

use std::path::PathBuf;
use std::time::Duration;

use sitepush_common::{join_key, RetrySettings, DEFAULT_REQUEST_TIMEOUT, DEPLOY_MANIFEST_KEY};

use crate::error::TransferError;

/// Configuration settings for storage backends.
#[derive(Debug, Clone)]
pub struct StorageSettings {
    /// Region of the bucket.
    pub region: String,
    /// Bound for one request including the backend's own retries.
    pub request_timeout: Duration,
    /// Reject requests if the bucket is owned by another account.
    pub expected_bucket_owner: Option<String>,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            region: "us-east-1".into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            expected_bucket_owner: None,
        }
    }
}

/// Bucket and key prefix the site is published under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketLocation {
    pub bucket: String,
    /// Key prefix, without leading or trailing slash. Empty = bucket root.
    pub prefix: String,
}

impl BucketLocation {
    pub fn new(bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: prefix.into().trim_matches('/').to_string(),
        }
    }

    /// Remote key for a relative build path. One-to-one with the path.
    pub fn object_key(&self, relative_path: &str) -> String {
        join_key(&self.prefix, relative_path)
    }

    /// Prefix to list when enumerating the published site.
    pub fn list_prefix(&self) -> String {
        if self.prefix.is_empty() {
            String::new()
        } else {
            format!("{}/", self.prefix)
        }
    }

    /// Inverse of [`object_key`](Self::object_key); `None` for keys outside the prefix.
    pub fn relative_path<'k>(&self, key: &'k str) -> Option<&'k str> {
        let relative: &str = key.strip_prefix(self.list_prefix().as_str())?;
        if relative.is_empty() {
            None
        } else {
            Some(relative)
        }
    }

    /// Key of the stored deploy manifest.
    pub fn manifest_key(&self) -> String {
        self.object_key(DEPLOY_MANIFEST_KEY)
    }
}

/// Everything needed to publish one file. Lives only for one upload call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadDescriptor {
    pub relative_path: String,
    pub key: String,
    /// Local file, streamed by the backend.
    pub source: PathBuf,
    pub size: u64,
    pub content_type: &'static str,
    pub cache_control: &'static str,
}

/// Aggregated statistics for batch operations.
#[derive(Debug, Clone, Default)]
pub struct TransferStatistics {
    /// Files whose upload was attempted.
    pub files_processed: u64,
    /// Files acknowledged by the store.
    pub files_transferred: u64,
    /// Bytes acknowledged by the store.
    pub bytes_transferred: u64,
    /// Extra attempts spent on transient failures.
    pub retries: u64,
    /// Files that exhausted their retry budget.
    pub errors: Vec<TransferError>,
}

impl TransferStatistics {
    /// Statistics for a file acknowledged after `attempts` tries.
    pub fn uploaded(size: u64, attempts: u32) -> Self {
        Self {
            files_processed: 1,
            files_transferred: 1,
            bytes_transferred: size,
            retries: u64::from(attempts.saturating_sub(1)),
            ..Default::default()
        }
    }

    /// Statistics for a file that failed for good.
    pub fn failed(error: TransferError) -> Self {
        Self {
            files_processed: 1,
            retries: u64::from(error.attempts.saturating_sub(1)),
            errors: vec![error],
            ..Default::default()
        }
    }

    /// Merge another statistics into this one.
    pub fn merge(&mut self, other: Self) {
        self.files_processed += other.files_processed;
        self.files_transferred += other.files_transferred;
        self.bytes_transferred += other.bytes_transferred;
        self.retries += other.retries;
        self.errors.extend(other.errors);
    }

    /// Keys of every failed file, sorted.
    pub fn failed_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.errors.iter().map(|e| e.key.clone()).collect();
        keys.sort();
        keys
    }
}

/// Outcome of a complete upload (and optional prune).
#[derive(Debug, Clone, Default)]
pub struct UploadSummary {
    pub statistics: TransferStatistics,
    /// Relative paths deleted from the destination by prune.
    pub pruned: Vec<String>,
    /// Prune failure, if any. The upload itself still succeeded.
    pub prune_error: Option<String>,
}

/// Progress update for transfer operations.
#[derive(Debug, Clone)]
pub struct TransferProgress {
    pub operation: OperationType,
    /// Current object being processed.
    pub current_key: String,
    pub current_total: u64,
    /// Objects finished so far.
    pub overall_completed: u64,
    pub overall_total: u64,
    pub overall_bytes: u64,
    pub overall_total_bytes: u64,
}

/// Type of operation in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationType {
    Uploading,
    Pruning,
}
