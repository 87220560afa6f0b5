//! Storage traits/interfaces for object store operations.

use std::path::Path;

use async_trait::async_trait;

use crate::error::StorageError;

/// Information about a stored object from list operations.
#[derive(Debug, Clone)]
pub struct ObjectInfo {
    /// Object key.
    pub key: String,
    /// Object size in bytes.
    pub size: u64,
    /// Last modified timestamp (Unix epoch seconds).
    pub last_modified: Option<i64>,
    /// ETag reported by the store.
    pub etag: Option<String>,
}

/// HTTP headers attached to an object when it is published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHeaders {
    pub content_type: String,
    pub cache_control: String,
}

impl ObjectHeaders {
    pub fn new(content_type: impl Into<String>, cache_control: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            cache_control: cache_control.into(),
        }
    }
}

/// Low-level object store operations - implemented by each backend.
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Expected bucket owner guard, if the backend enforces one.
    fn expected_bucket_owner(&self) -> Option<&str> {
        None
    }

    /// Upload bytes held in memory.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: &[u8],
        headers: &ObjectHeaders,
    ) -> Result<(), StorageError>;

    /// Upload a local file, streaming its content from disk.
    async fn put_object_from_file(
        &self,
        bucket: &str,
        key: &str,
        file_path: &Path,
        headers: &ObjectHeaders,
    ) -> Result<(), StorageError>;

    /// Download an object to bytes.
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError>;

    /// List all objects under a prefix.
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<ObjectInfo>, StorageError>;

    /// Delete a batch of objects. Implementations may cap the batch size;
    /// callers pass at most [`crate::DELETE_BATCH_SIZE`] keys.
    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<(), StorageError>;
}
