//! Cache-Control selection per published path.
//!
//! Rules, first match wins:
//! 1. Under the immutable asset prefix (content-hashed names): cache for a year.
//! 2. HTML, XML and TXT documents: always revalidate.
//! 3. Everything else: one day, since hashing is not guaranteed outside rule 1.

use std::path::Path;

use sitepush_common::{
    CACHE_CONTROL_IMMUTABLE, CACHE_CONTROL_MEDIUM, CACHE_CONTROL_REVALIDATE,
    DEFAULT_IMMUTABLE_PREFIX,
};

/// Cache class of a published file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    Immutable,
    Revalidate,
    Medium,
}

impl CachePolicy {
    /// Cache-Control header value.
    pub fn directive(self) -> &'static str {
        match self {
            CachePolicy::Immutable => CACHE_CONTROL_IMMUTABLE,
            CachePolicy::Revalidate => CACHE_CONTROL_REVALIDATE,
            CachePolicy::Medium => CACHE_CONTROL_MEDIUM,
        }
    }
}

/// Maps relative build paths to a [`CachePolicy`]. Pure: the same path
/// always yields the same policy for a given selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicySelector {
    immutable_prefix: String,
}

impl Default for CachePolicySelector {
    fn default() -> Self {
        Self::new(DEFAULT_IMMUTABLE_PREFIX)
    }
}

impl CachePolicySelector {
    /// `immutable_prefix` is a relative directory such as `_next/static`;
    /// a trailing slash is implied.
    pub fn new(immutable_prefix: &str) -> Self {
        let trimmed: &str = immutable_prefix.trim_matches('/');
        let immutable_prefix: String = if trimmed.is_empty() {
            String::new()
        } else {
            format!("{}/", trimmed)
        };
        Self { immutable_prefix }
    }

    pub fn immutable_prefix(&self) -> &str {
        &self.immutable_prefix
    }

    /// True for content-hashed assets that never need invalidation.
    pub fn is_immutable(&self, relative_path: &str) -> bool {
        !self.immutable_prefix.is_empty()
            && relative_path
                .trim_start_matches('/')
                .starts_with(self.immutable_prefix.as_str())
    }

    pub fn select(&self, relative_path: &str) -> CachePolicy {
        if self.is_immutable(relative_path) {
            return CachePolicy::Immutable;
        }

        let extension: Option<String> = Path::new(relative_path)
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase());
        match extension.as_deref() {
            Some("html") | Some("htm") | Some("xml") | Some("txt") => CachePolicy::Revalidate,
            _ => CachePolicy::Medium,
        }
    }
}
