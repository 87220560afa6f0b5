//! Object store abstraction and site uploader for sitepush.
//!
//! This crate provides a platform-agnostic interface for publishing a built
//! static site to an object store. Backends implement [`StorageClient`]; the
//! AWS S3 backend lives in `sitepush-aws` and an in-memory backend used for
//! dry runs lives in [`memory`].
//!
//! On top of the trait it provides:
//!
//! - **Content types** - extension to MIME mapping
//! - **Cache policy** - Cache-Control per path
//! - **Uploader** - parallel, retrying, cancellable publish with optional prune
//! - **Manifest storage** - the record of what the last deployment published

mod cache_policy;
mod content_type;
mod error;
pub mod manifest_storage;
pub mod memory;
mod traits;
mod types;
mod upload;

pub use cache_policy::{CachePolicy, CachePolicySelector};
pub use content_type::resolve_content_type;
pub use error::{StorageError, TransferError};
pub use manifest_storage::{load_previous_manifest, store_manifest};
pub use memory::{MemoryStorageClient, StoredObject};
pub use traits::{ObjectHeaders, ObjectInfo, StorageClient};
pub use types::{
    BucketLocation, OperationType, StorageSettings, TransferProgress,
    TransferStatistics, UploadDescriptor, UploadSummary,
};
pub use upload::{with_timeout, UploadOptions, Uploader, DELETE_BATCH_SIZE};
