//! CDN client interface.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::CdnError;

/// Identifies a submitted invalidation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidationHandle {
    pub distribution_id: String,
    pub id: String,
}

/// Lifecycle state of an invalidation as seen by this tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InvalidationStatus {
    /// Edge caches are purged.
    Completed,
    /// Still propagating (also reported when polling was not requested).
    InProgress,
    /// Polling gave up before the CDN reported completion.
    TimedOut,
    /// Status could not be determined.
    Failed,
}

impl InvalidationStatus {
    /// Map a CDN status string. Unknown values count as in progress.
    pub fn from_remote(status: &str) -> Self {
        match status {
            "Completed" => InvalidationStatus::Completed,
            _ => InvalidationStatus::InProgress,
        }
    }
}

impl std::fmt::Display for InvalidationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name: &str = match self {
            InvalidationStatus::Completed => "Completed",
            InvalidationStatus::InProgress => "InProgress",
            InvalidationStatus::TimedOut => "TimedOut",
            InvalidationStatus::Failed => "Failed",
        };
        f.write_str(name)
    }
}

/// Low-level CDN operations - implemented by each backend.
#[async_trait]
pub trait CdnClient: Send + Sync {
    /// Create an invalidation. `caller_reference` makes the call idempotent
    /// on the CDN side.
    async fn create_invalidation(
        &self,
        distribution_id: &str,
        paths: &[String],
        caller_reference: &str,
    ) -> Result<InvalidationHandle, CdnError>;

    /// Fetch the current status of an invalidation.
    async fn get_invalidation_status(
        &self,
        handle: &InvalidationHandle,
    ) -> Result<InvalidationStatus, CdnError>;
}
