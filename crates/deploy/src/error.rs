//! Error types for deployment runs.

use std::path::PathBuf;

use sitepush_cdn::CdnError;
use sitepush_filesystem::FileSystemError;
use sitepush_storage::StorageError;
use thiserror::Error;

/// Errors that end a deployment run (or a single-stage command).
#[derive(Debug, Error)]
pub enum DeployError {
    /// Environment could not be parsed into a configuration.
    #[error("Invalid environment: {0}")]
    Env(#[from] envy::Error),

    /// Configuration parsed but is unusable for the requested stage.
    #[error("Invalid configuration: {message}")]
    Config { message: String },

    /// The build step failed.
    #[error("Build failed: {message}")]
    Build { message: String },

    /// The build succeeded but produced nothing to publish.
    #[error("Build produced no files in {}", path.display())]
    EmptyBuild { path: PathBuf },

    /// Scanning the build output failed.
    #[error("Scan failed: {0}")]
    Scan(#[from] FileSystemError),

    /// Upload did not complete. For a partial upload the failing keys are
    /// listed in the report.
    #[error("Upload failed: {0}")]
    Upload(#[from] StorageError),

    /// The invalidation could not be submitted. The origin is already
    /// updated at this point.
    #[error("Invalidation failed (origin already updated): {0}")]
    Invalidation(#[from] CdnError),

    /// Blocking verification found failing targets.
    #[error("Verification failed for {failed} of {total} targets")]
    Verification { failed: usize, total: usize },

    /// The run was cancelled before the named stage.
    #[error("Cancelled before {stage}")]
    Cancelled { stage: &'static str },

    /// Local I/O failure outside the scanner (report file, HTTP client setup).
    #[error("I/O error for {path}: {message}")]
    Io { path: String, message: String },
}
