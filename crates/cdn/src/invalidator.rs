//! Submits invalidation batches and optionally waits for completion.

use std::time::Duration;

use sitepush_common::{retry_with_backoff, CancellationFlag, RetrySettings, DEFAULT_REQUEST_TIMEOUT};
use tokio::time::Instant;

use crate::error::CdnError;
use crate::planner::InvalidationBatch;
use crate::traits::{CdnClient, InvalidationHandle, InvalidationStatus};

/// Default polling bound for [`Invalidator::await_completion`].
pub const DEFAULT_INVALIDATION_TIMEOUT: Duration = Duration::from_secs(300);

/// Default delay between status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Drives one distribution's invalidations through a [`CdnClient`].
pub struct Invalidator<'a, C: CdnClient> {
    client: &'a C,
    distribution_id: String,
    retry: RetrySettings,
    request_timeout: Duration,
    poll_interval: Duration,
    cancel: CancellationFlag,
}

impl<'a, C: CdnClient> Invalidator<'a, C> {
    /// Create a new invalidator.
    ///
    /// # Arguments
    /// * `client` - CDN client
    /// * `distribution_id` - Distribution whose caches are purged
    pub fn new(client: &'a C, distribution_id: impl Into<String>) -> Self {
        Self {
            client,
            distribution_id: distribution_id.into(),
            retry: RetrySettings::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            cancel: CancellationFlag::new(),
        }
    }

    pub fn with_retry(mut self, retry: RetrySettings) -> Self {
        self.retry = retry;
        self
    }

    /// Bound for each submission attempt.
    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Share a cancellation flag with the caller. Raising it stops polling;
    /// the remote invalidation carries on regardless.
    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn distribution_id(&self) -> &str {
        &self.distribution_id
    }

    /// Submit a batch. Transient failures are retried with backoff; a
    /// rejection is returned immediately.
    ///
    /// # Errors
    /// - `EmptyBatch` if the batch carries no paths (nothing is sent)
    /// - the last `CdnError` once retries are exhausted or on rejection
    pub async fn submit(&self, batch: &InvalidationBatch) -> Result<InvalidationHandle, CdnError> {
        if batch.is_empty() {
            return Err(CdnError::EmptyBatch);
        }

        tracing::info!(
            distribution_id = %self.distribution_id,
            paths = batch.len(),
            wildcard = batch.wildcard,
            caller_reference = %batch.caller_reference,
            "Submitting invalidation"
        );

        let limit: Duration = self.request_timeout;
        let handle: InvalidationHandle = retry_with_backoff(&self.retry, "create_invalidation", || async move {
            let call = self.client.create_invalidation(
                &self.distribution_id,
                &batch.paths,
                &batch.caller_reference,
            );
            match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => Err(CdnError::NetworkError {
                    message: format!("create_invalidation timed out after {}ms", limit.as_millis()),
                    retryable: true,
                }),
            }
        })
        .await?;

        tracing::info!(invalidation_id = %handle.id, "Invalidation submitted");
        Ok(handle)
    }

    /// Poll until the invalidation completes, `timeout` elapses, or the
    /// cancellation flag is raised.
    ///
    /// Never fails: a status lookup error is reported as
    /// [`InvalidationStatus::Failed`], running out of time as `TimedOut`,
    /// and cancellation as `InProgress`.
    pub async fn await_completion(
        &self,
        handle: &InvalidationHandle,
        timeout: Duration,
    ) -> InvalidationStatus {
        let deadline: Instant = Instant::now() + timeout;

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!(invalidation_id = %handle.id, "Polling cancelled");
                return InvalidationStatus::InProgress;
            }

            let remaining: Duration = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                tracing::warn!(invalidation_id = %handle.id, "Invalidation still in flight at timeout");
                return InvalidationStatus::TimedOut;
            }

            let status: InvalidationStatus = match tokio::time::timeout(
                remaining,
                retry_with_backoff(&self.retry, "get_invalidation", || {
                    self.client.get_invalidation_status(handle)
                }),
            )
            .await
            {
                Ok(Ok(status)) => status,
                Ok(Err(err)) => {
                    tracing::warn!(invalidation_id = %handle.id, error = %err, "Invalidation status lookup failed");
                    return InvalidationStatus::Failed;
                }
                Err(_) => {
                    tracing::warn!(invalidation_id = %handle.id, "Invalidation still in flight at timeout");
                    return InvalidationStatus::TimedOut;
                }
            };

            tracing::debug!(invalidation_id = %handle.id, %status, "Polled invalidation");
            if status == InvalidationStatus::Completed {
                return status;
            }

            let remaining: Duration = deadline.saturating_duration_since(Instant::now());
            tokio::time::sleep(self.poll_interval.min(remaining)).await;
        }
    }
}
