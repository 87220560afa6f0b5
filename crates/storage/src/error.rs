//! Error types for storage operations.

use sitepush_common::Retryable;
use thiserror::Error;

use crate::types::TransferStatistics;

/// Errors that can occur during storage operations.
#[derive(Error, Debug, Clone)]
pub enum StorageError {
    /// Object not found.
    #[error("Object not found: s3://{bucket}/{key}")]
    NotFound { bucket: String, key: String },

    /// Access denied.
    #[error("Access denied to s3://{bucket}/{key}: {message}")]
    AccessDenied {
        bucket: String,
        key: String,
        message: String,
    },

    /// Network error.
    #[error("Network error: {message}")]
    NetworkError { message: String, retryable: bool },

    /// Local I/O error.
    #[error("I/O error for {path}: {message}")]
    IoError { path: String, message: String },

    /// One or more files exhausted their retry budget.
    #[error(
        "{} of {} files failed to upload",
        .statistics.errors.len(),
        .statistics.files_processed
    )]
    PartialUpload { statistics: TransferStatistics },

    /// Operation cancelled before every file was started.
    #[error("Operation cancelled")]
    Cancelled,

    /// Other error.
    #[error("{message}")]
    Other { message: String },
}

impl StorageError {
    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            StorageError::NetworkError { retryable, .. } => *retryable,
            StorageError::NotFound { .. } => false,
            StorageError::AccessDenied { .. } => false,
            StorageError::IoError { .. } => false,
            StorageError::PartialUpload { .. } => false,
            StorageError::Cancelled => false,
            StorageError::Other { .. } => false,
        }
    }
}

impl Retryable for StorageError {
    fn is_retryable(&self) -> bool {
        StorageError::is_retryable(self)
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::IoError {
            path: String::new(),
            message: err.to_string(),
        }
    }
}

/// A single file or object that could not be transferred.
#[derive(Debug, Clone)]
pub struct TransferError {
    /// The object key that failed.
    pub key: String,
    /// The error from the last attempt.
    pub error: StorageError,
    /// Attempts made before giving up.
    pub attempts: u32,
}

impl TransferError {
    pub fn new(key: impl Into<String>, error: StorageError, attempts: u32) -> Self {
        Self {
            key: key.into(),
            error,
            attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let transient: StorageError = StorageError::NetworkError {
            message: "connection reset".into(),
            retryable: true,
        };
        let denied: StorageError = StorageError::AccessDenied {
            bucket: "site".into(),
            key: "index.html".into(),
            message: "forbidden".into(),
        };
        assert!(transient.is_retryable());
        assert!(!denied.is_retryable());
        assert!(!StorageError::Cancelled.is_retryable());
    }

    #[test]
    fn test_partial_upload_message_counts_failures() {
        let mut statistics: TransferStatistics = TransferStatistics::default();
        statistics.files_processed = 3;
        statistics.errors.push(TransferError::new(
            "about/index.html",
            StorageError::Other {
                message: "boom".into(),
            },
            3,
        ));

        let err: StorageError = StorageError::PartialUpload { statistics };
        assert_eq!(err.to_string(), "1 of 3 files failed to upload");
    }
}
