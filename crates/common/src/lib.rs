//! Shared types and utilities for sitepush.
//!
//! This crate provides common functionality used across all sitepush crates:
//! - Path normalization utilities (local paths to object keys and URL paths)
//! - Hash computation functions
//! - Generic progress callback trait and cancellation flag
//! - Bounded exponential-backoff retry for network calls
//! - Shared constants and error types

pub mod constants;
pub mod error;
pub mod hash;
pub mod path_utils;
pub mod progress;
pub mod retry;

// Re-export commonly used items at crate root
pub use constants::*;
pub use error::PathError;
pub use hash::{hash_bytes, hash_file, Xxh3Hasher};
pub use path_utils::{
    is_within_root, join_key, lexical_normalize, normalize_relative, to_absolute, to_posix_path,
};
pub use progress::{progress_fn, CancellationFlag, FnProgress, NoOpProgress, ProgressCallback};
pub use retry::{retry_counted, retry_with_backoff, RetrySettings, Retryable};
