//! Error types for CDN operations.

use sitepush_common::Retryable;
use thiserror::Error;

/// Errors that can occur while submitting or tracking invalidations.
#[derive(Error, Debug, Clone)]
pub enum CdnError {
    /// The CDN refused the request for good (malformed batch, unknown
    /// distribution, missing permission).
    #[error("Invalidation rejected: {message}")]
    Rejected { message: String },

    /// Too many invalidations in flight; worth retrying later.
    #[error("Invalidation throttled: {message}")]
    Throttled { message: String },

    /// Network error.
    #[error("Network error: {message}")]
    NetworkError { message: String, retryable: bool },

    /// The invalidation id is unknown to the CDN.
    #[error("Invalidation not found: {distribution_id}/{id}")]
    NotFound { distribution_id: String, id: String },

    /// Refused locally: a batch must carry at least one path.
    #[error("Invalidation batch has no paths")]
    EmptyBatch,
}

impl CdnError {
    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            CdnError::Throttled { .. } => true,
            CdnError::NetworkError { retryable, .. } => *retryable,
            CdnError::Rejected { .. } => false,
            CdnError::NotFound { .. } => false,
            CdnError::EmptyBatch => false,
        }
    }
}

impl Retryable for CdnError {
    fn is_retryable(&self) -> bool {
        CdnError::is_retryable(self)
    }
}
