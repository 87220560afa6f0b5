//! Storage of the deploy manifest alongside the published site.
//!
//! The manifest lives at `{prefix}/.sitepush/manifest.json` and is written
//! only after every file of a deployment has been acknowledged.

use sitepush_common::{CACHE_CONTROL_REVALIDATE, DEPLOY_MANIFEST_CONTENT_TYPE};
use sitepush_filesystem::DeployManifest;

use crate::error::StorageError;
use crate::traits::{ObjectHeaders, StorageClient};
use crate::types::BucketLocation;

/// Load the manifest of the previous deployment.
///
/// # Returns
/// `Ok(None)` when no deployment has stored a manifest yet.
///
/// # Errors
/// Network failures, and manifests that cannot be decoded.
pub async fn load_previous_manifest<C: StorageClient>(
    client: &C,
    location: &BucketLocation,
) -> Result<Option<DeployManifest>, StorageError> {
    let key: String = location.manifest_key();
    let data: Vec<u8> = match client.get_object(&location.bucket, &key).await {
        Ok(data) => data,
        Err(StorageError::NotFound { .. }) => return Ok(None),
        Err(e) => return Err(e),
    };

    DeployManifest::from_json(&data)
        .map(Some)
        .map_err(|e| StorageError::Other {
            message: format!("s3://{}/{}: {}", location.bucket, key, e),
        })
}

/// Store the manifest describing the deployment just published.
pub async fn store_manifest<C: StorageClient>(
    client: &C,
    location: &BucketLocation,
    manifest: &DeployManifest,
) -> Result<(), StorageError> {
    let body: Vec<u8> = manifest.to_json().map_err(|e| StorageError::Other {
        message: e.to_string(),
    })?;
    let headers: ObjectHeaders =
        ObjectHeaders::new(DEPLOY_MANIFEST_CONTENT_TYPE, CACHE_CONTROL_REVALIDATE);

    client
        .put_object(&location.bucket, &location.manifest_key(), &body, &headers)
        .await
}
