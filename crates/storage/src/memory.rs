//! In-memory `StorageClient` used for dry runs and tests.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use sitepush_common::hash_bytes;

use crate::error::StorageError;
use crate::traits::{ObjectHeaders, ObjectInfo, StorageClient};

/// An object held by [`MemoryStorageClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub headers: ObjectHeaders,
}

#[derive(Debug, Default)]
struct MemoryState {
    /// (bucket, key) -> object
    objects: BTreeMap<(String, String), StoredObject>,
    /// key -> remaining injected put failures
    failures: HashMap<String, u32>,
    /// key -> put attempts seen
    attempts: HashMap<String, u32>,
    puts: u64,
    deletes: u64,
}

/// Object store kept in process memory.
///
/// Failures can be injected per key with [`fail_key`](Self::fail_key); each
/// injected failure is a retryable network error.
#[derive(Debug, Default)]
pub struct MemoryStorageClient {
    state: Mutex<MemoryState>,
}

impl MemoryStorageClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `times` puts of `key` fail with a transient error.
    pub fn fail_key(&self, key: impl Into<String>, times: u32) {
        self.lock().failures.insert(key.into(), times);
    }

    /// Store an object directly, bypassing failure injection and counters.
    pub fn insert(&self, bucket: &str, key: &str, data: &[u8], headers: &ObjectHeaders) {
        self.lock().objects.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                data: data.to_vec(),
                headers: headers.clone(),
            },
        );
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.lock()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// Keys stored in `bucket`, sorted.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.lock()
            .objects
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect()
    }

    /// Number of successful puts.
    pub fn put_count(&self) -> u64 {
        self.lock().puts
    }

    /// Number of put attempts (successful or not) for `key`.
    pub fn put_attempts(&self, key: &str) -> u32 {
        self.lock().attempts.get(key).copied().unwrap_or(0)
    }

    /// Number of delete requests served.
    pub fn delete_count(&self) -> u64 {
        self.lock().deletes
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        // A poisoned lock only means another test thread panicked mid-call;
        // the map itself is still consistent.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn store(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        headers: &ObjectHeaders,
    ) -> Result<(), StorageError> {
        let mut state = self.lock();
        *state.attempts.entry(key.to_string()).or_insert(0) += 1;

        if let Some(remaining) = state.failures.get_mut(key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(StorageError::NetworkError {
                    message: format!("injected failure for {}", key),
                    retryable: true,
                });
            }
        }

        state.puts += 1;
        state.objects.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                data,
                headers: headers.clone(),
            },
        );
        Ok(())
    }
}

#[async_trait]
impl StorageClient for MemoryStorageClient {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: &[u8],
        headers: &ObjectHeaders,
    ) -> Result<(), StorageError> {
        self.store(bucket, key, data.to_vec(), headers)
    }

    async fn put_object_from_file(
        &self,
        bucket: &str,
        key: &str,
        file_path: &Path,
        headers: &ObjectHeaders,
    ) -> Result<(), StorageError> {
        let data: Vec<u8> =
            tokio::fs::read(file_path)
                .await
                .map_err(|e| StorageError::IoError {
                    path: file_path.display().to_string(),
                    message: e.to_string(),
                })?;
        self.store(bucket, key, data, headers)
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        self.object(bucket, key)
            .map(|obj| obj.data)
            .ok_or_else(|| StorageError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<ObjectInfo>, StorageError> {
        Ok(self
            .lock()
            .objects
            .iter()
            .filter(|((b, k), _)| b == bucket && k.starts_with(prefix))
            .map(|((_, k), obj)| ObjectInfo {
                key: k.clone(),
                size: obj.data.len() as u64,
                last_modified: None,
                etag: Some(hash_bytes(&obj.data)),
            })
            .collect())
    }

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<(), StorageError> {
        let mut state = self.lock();
        state.deletes += 1;
        for key in keys {
            state.objects.remove(&(bucket.to_string(), key.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn html() -> ObjectHeaders {
        ObjectHeaders::new("text/html", "public, max-age=0, must-revalidate")
    }

    #[tokio::test]
    async fn test_put_get_list_delete() {
        let client: MemoryStorageClient = MemoryStorageClient::new();
        client.put_object("www", "a.html", b"a", &html()).await.unwrap();
        client.put_object("www", "dir/b.html", b"bb", &html()).await.unwrap();
        client.put_object("other", "dir/c.html", b"c", &html()).await.unwrap();

        assert_eq!(client.get_object("www", "a.html").await.unwrap(), b"a");
        let listed: Vec<ObjectInfo> = client.list_objects("www", "dir/").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].key, "dir/b.html");
        assert_eq!(listed[0].size, 2);

        client
            .delete_objects("www", &["a.html".to_string()])
            .await
            .unwrap();
        assert!(matches!(
            client.get_object("www", "a.html").await,
            Err(StorageError::NotFound { .. })
        ));
        assert_eq!(client.keys("www"), vec!["dir/b.html"]);
    }

    #[tokio::test]
    async fn test_injected_failures_then_success() {
        let client: MemoryStorageClient = MemoryStorageClient::new();
        client.fail_key("index.html", 1);

        let first = client.put_object("www", "index.html", b"x", &html()).await;
        assert!(first.unwrap_err().is_retryable());
        client.put_object("www", "index.html", b"x", &html()).await.unwrap();

        assert_eq!(client.put_attempts("index.html"), 2);
        assert_eq!(client.put_count(), 1);
    }
}
