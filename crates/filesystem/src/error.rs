//! Error types for build output scanning.

use std::path::PathBuf;

use sitepush_common::PathError;
use thiserror::Error;

/// Errors raised while scanning a build tree or handling deploy manifests.
#[derive(Debug, Error)]
pub enum FileSystemError {
    /// The build output directory does not exist or is not a directory.
    #[error("Build output directory not found: {}", path.display())]
    RootNotFound { path: PathBuf },

    /// A glob pattern could not be compiled.
    #[error("Invalid glob pattern '{pattern}': {reason}")]
    InvalidGlobPattern { pattern: String, reason: String },

    /// Reading the tree or a file failed.
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Path could not be expressed relative to the build root.
    #[error(transparent)]
    Path(#[from] PathError),

    /// A deploy manifest could not be encoded or decoded.
    #[error("Invalid deploy manifest: {message}")]
    InvalidManifest { message: String },
}
