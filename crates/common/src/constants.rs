//! Shared constants used across sitepush crates.

use std::time::Duration;

/// Directory emitted by the site build for content-hashed assets.
pub const DEFAULT_IMMUTABLE_PREFIX: &str = "_next/static/";

/// Cache-Control for content-hashed assets that never change under their URL.
pub const CACHE_CONTROL_IMMUTABLE: &str = "public, max-age=31536000, immutable";

/// Cache-Control for documents that reference hashed assets (HTML, XML, TXT).
pub const CACHE_CONTROL_REVALIDATE: &str = "public, max-age=0, must-revalidate";

/// Cache-Control for static assets whose names are not guaranteed to be hashed.
pub const CACHE_CONTROL_MEDIUM: &str = "public, max-age=86400";

/// Fallback MIME type for unknown extensions.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Upper bound for a single object store or CDN request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Default number of in-flight uploads.
pub const DEFAULT_UPLOAD_CONCURRENCY: usize = 8;

/// Default maximum number of paths in one invalidation batch.
pub const DEFAULT_MAX_INVALIDATION_PATHS: usize = 1000;

/// Maximum number of wildcard paths the CDN accepts in flight.
pub const MAX_WILDCARD_PATHS: usize = 15;

/// Wildcard pattern covering the whole distribution.
pub const WILDCARD_ALL: &str = "/*";

/// Object key (relative to the deploy prefix) of the stored deploy manifest.
pub const DEPLOY_MANIFEST_KEY: &str = ".sitepush/manifest.json";

/// Content type used for the stored deploy manifest.
pub const DEPLOY_MANIFEST_CONTENT_TYPE: &str = "application/json";
