//! AWS SDK backends for sitepush.
//!
//! - [`S3StorageClient`] implements `StorageClient` on Amazon S3
//! - [`CloudFrontClient`] implements `CdnClient` on Amazon CloudFront
//!
//! # Example
//!
//! ```ignore
//! use sitepush_aws::{CloudFrontClient, S3StorageClient};
//! use sitepush_storage::{BucketLocation, StorageSettings, Uploader};
//!
//! let settings = StorageSettings::default();
//! let s3 = S3StorageClient::new(settings.clone()).await?;
//! let uploader = Uploader::new(&s3, BucketLocation::new("my-site", ""));
//! ```

mod cloudfront;
mod config;
mod error;
mod s3;

pub use cloudfront::CloudFrontClient;
pub use config::load_sdk_config;
pub use error::AwsError;
pub use s3::S3StorageClient;
