//! CDN invalidation for sitepush.
//!
//! Backends implement [`CdnClient`]; CloudFront lives in `sitepush-aws` and
//! an in-memory CDN used for dry runs lives in [`memory`]. On top of the
//! trait this crate provides:
//!
//! - **Edge rewrite** - which stored object answers a request path
//! - **Planner** - changed build paths to URL patterns, with wildcard collapse
//! - **Invalidator** - bounded-retry submission and optional completion polling

mod error;
mod invalidator;
pub mod memory;
mod planner;
pub mod rewrite;
mod traits;

pub use error::CdnError;
pub use invalidator::{Invalidator, DEFAULT_INVALIDATION_TIMEOUT, DEFAULT_POLL_INTERVAL};
pub use memory::{MemoryCdnClient, RecordedInvalidation};
pub use planner::{new_caller_reference, ChangeScope, InvalidationBatch, InvalidationPlanner};
pub use rewrite::{object_path_for_request, request_paths_for, rewrite_request_path};
pub use traits::{CdnClient, InvalidationHandle, InvalidationStatus};
