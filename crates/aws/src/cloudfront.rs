//! AWS SDK CloudFront client implementation.

use async_trait::async_trait;
use aws_sdk_cloudfront::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_cloudfront::types::{InvalidationBatch, Paths};
use aws_sdk_cloudfront::Client as CloudFrontSdkClient;

use sitepush_cdn::{CdnClient, CdnError, InvalidationHandle, InvalidationStatus};
use sitepush_storage::StorageSettings;

use crate::config::load_sdk_config;
use crate::error::AwsError;

/// CdnClient implementation using AWS SDK for Rust.
pub struct CloudFrontClient {
    client: CloudFrontSdkClient,
}

impl CloudFrontClient {
    /// Create a new CloudFront client. CloudFront is a global service; the
    /// region only affects where requests are signed.
    pub async fn new(settings: &StorageSettings) -> Self {
        let sdk_config = load_sdk_config(settings).await;
        Self {
            client: CloudFrontSdkClient::new(&sdk_config),
        }
    }

    /// Create a client from an existing SDK client.
    pub fn from_client(client: CloudFrontSdkClient) -> Self {
        Self { client }
    }
}

fn is_transport_failure<E, R>(err: &SdkError<E, R>) -> bool {
    matches!(
        err,
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_)
    )
}

fn generic_error<E, R>(err: SdkError<E, R>) -> CdnError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    let retryable: bool = is_transport_failure(&err);
    match err.as_service_error() {
        Some(service_err) => {
            let message: String = service_err
                .message()
                .map(str::to_string)
                .unwrap_or_else(|| service_err.to_string());
            AwsError::sdk("cloudfront", service_err.code(), message, retryable).into()
        }
        None => AwsError::sdk("cloudfront", None, err.to_string(), retryable).into(),
    }
}

#[async_trait]
impl CdnClient for CloudFrontClient {
    async fn create_invalidation(
        &self,
        distribution_id: &str,
        paths: &[String],
        caller_reference: &str,
    ) -> Result<InvalidationHandle, CdnError> {
        if paths.is_empty() {
            return Err(CdnError::EmptyBatch);
        }

        let sdk_paths: Paths = Paths::builder()
            .quantity(paths.len() as i32)
            .set_items(Some(paths.to_vec()))
            .build()
            .map_err(|e| CdnError::from(AwsError::RequestBuild(e.to_string())))?;

        let batch: InvalidationBatch = InvalidationBatch::builder()
            .paths(sdk_paths)
            .caller_reference(caller_reference)
            .build()
            .map_err(|e| CdnError::from(AwsError::RequestBuild(e.to_string())))?;

        let output = self
            .client
            .create_invalidation()
            .distribution_id(distribution_id)
            .invalidation_batch(batch)
            .send()
            .await
            .map_err(|err| {
                if let Some(e) = err.as_service_error() {
                    if e.is_too_many_invalidations_in_progress() {
                        return CdnError::Throttled {
                            message: e
                                .message()
                                .unwrap_or("too many invalidations in progress")
                                .to_string(),
                        };
                    }
                    if e.is_no_such_distribution() {
                        return CdnError::Rejected {
                            message: format!("no such distribution: {}", distribution_id),
                        };
                    }
                }
                generic_error(err)
            })?;

        let invalidation = output.invalidation().ok_or_else(|| CdnError::Rejected {
            message: "response carried no invalidation".to_string(),
        })?;

        tracing::debug!(
            distribution_id,
            invalidation_id = invalidation.id(),
            status = invalidation.status(),
            "CloudFront accepted invalidation"
        );

        Ok(InvalidationHandle {
            distribution_id: distribution_id.to_string(),
            id: invalidation.id().to_string(),
        })
    }

    async fn get_invalidation_status(
        &self,
        handle: &InvalidationHandle,
    ) -> Result<InvalidationStatus, CdnError> {
        let output = self
            .client
            .get_invalidation()
            .distribution_id(&handle.distribution_id)
            .id(&handle.id)
            .send()
            .await
            .map_err(|err| {
                if let Some(e) = err.as_service_error() {
                    if e.is_no_such_invalidation() || e.is_no_such_distribution() {
                        return CdnError::NotFound {
                            distribution_id: handle.distribution_id.clone(),
                            id: handle.id.clone(),
                        };
                    }
                }
                generic_error(err)
            })?;

        let status: &str = output
            .invalidation()
            .map(|invalidation| invalidation.status())
            .unwrap_or_default();
        Ok(InvalidationStatus::from_remote(status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cloudfront_client_implements_cdn_client() {
        fn assert_cdn_client<T: CdnClient>() {}
        assert_cdn_client::<CloudFrontClient>();
    }
}
