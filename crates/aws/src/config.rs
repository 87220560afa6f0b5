//! Shared SDK configuration loading.

use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, SdkConfig};
use sitepush_storage::StorageSettings;

/// Load an SDK configuration for `settings`. Credentials come from the
/// environment's default chain. Every operation, SDK retries included, is
/// bounded by `settings.request_timeout`.
pub async fn load_sdk_config(settings: &StorageSettings) -> SdkConfig {
    aws_config::defaults(BehaviorVersion::latest())
        .region(aws_config::Region::new(settings.region.clone()))
        .timeout_config(timeout_config(settings))
        .load()
        .await
}

fn timeout_config(settings: &StorageSettings) -> TimeoutConfig {
    TimeoutConfig::builder()
        .operation_timeout(settings.request_timeout)
        .operation_attempt_timeout(settings.request_timeout)
        .build()
}
