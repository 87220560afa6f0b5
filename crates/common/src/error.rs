//! Errors raised while mapping build output paths to object keys.

use thiserror::Error;

/// Failure to turn a local file path into a site-relative key.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathError {
    /// The file does not live under the build output root.
    #[error("{path} is not inside build output {root}")]
    PathOutsideRoot { path: String, root: String },

    /// The path normalizes to nothing usable as a key (e.g. the root itself).
    #[error("Cannot derive an object key from {path}")]
    InvalidPath { path: String },

    /// Resolving the path against the working directory failed.
    #[error("Cannot resolve {path}: {message}")]
    IoError { path: String, message: String },
}

impl PathError {
    pub fn from_io(path: impl Into<String>, err: std::io::Error) -> Self {
        Self::IoError {
            path: path.into(),
            message: err.to_string(),
        }
    }
}
