//! Turns changed build paths into an invalidation batch.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sitepush_common::{
    DEFAULT_MAX_INVALIDATION_PATHS, DEPLOY_MANIFEST_KEY, MAX_WILDCARD_PATHS, WILDCARD_ALL,
};
use sitepush_storage::CachePolicySelector;

use crate::rewrite::index_directory;

/// What the planner is asked to cover.
#[derive(Debug, Clone, Copy)]
pub enum ChangeScope<'a> {
    /// Full refresh, or no prior deployment to diff against.
    All,
    /// Relative build paths that were added, modified or deleted.
    Paths(&'a [String]),
}

/// A planned invalidation, ready for submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidationBatch {
    /// Sorted, de-duplicated URL patterns.
    pub paths: Vec<String>,
    /// Idempotency token for the CDN.
    pub caller_reference: String,
    pub created_at: DateTime<Utc>,
    /// True when the batch is the single `/*` pattern.
    pub wildcard: bool,
    /// Number of distinct patterns before any collapse.
    pub candidate_count: usize,
}

impl InvalidationBatch {
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }
}

/// Maps changed relative paths to CDN URL patterns.
///
/// Immutable assets and the deploy manifest never produce a pattern. The
/// candidate set collapses to `/*` when it exceeds `max_paths` or would use
/// more than `max_wildcards` wildcard patterns; it is never split.
#[derive(Debug, Clone)]
pub struct InvalidationPlanner {
    max_paths: usize,
    max_wildcards: usize,
    cache_policy: CachePolicySelector,
}

impl Default for InvalidationPlanner {
    fn default() -> Self {
        Self::new(CachePolicySelector::default())
    }
}

impl InvalidationPlanner {
    pub fn new(cache_policy: CachePolicySelector) -> Self {
        Self {
            max_paths: DEFAULT_MAX_INVALIDATION_PATHS,
            max_wildcards: MAX_WILDCARD_PATHS,
            cache_policy,
        }
    }

    pub fn with_max_paths(mut self, max_paths: usize) -> Self {
        self.max_paths = max_paths.max(1);
        self
    }

    pub fn with_max_wildcards(mut self, max_wildcards: usize) -> Self {
        self.max_wildcards = max_wildcards;
        self
    }

    pub fn max_paths(&self) -> usize {
        self.max_paths
    }

    /// Plan a batch for `scope` with a fresh caller reference.
    ///
    /// An explicit scope with nothing to invalidate yields an empty batch;
    /// callers skip submission in that case.
    pub fn plan(&self, scope: ChangeScope<'_>) -> InvalidationBatch {
        let created_at: DateTime<Utc> = Utc::now();
        let caller_reference: String = new_caller_reference(created_at);

        let changed: &[String] = match scope {
            ChangeScope::All => {
                return InvalidationBatch {
                    paths: vec![WILDCARD_ALL.to_string()],
                    caller_reference,
                    created_at,
                    wildcard: true,
                    candidate_count: 1,
                };
            }
            ChangeScope::Paths(changed) => changed,
        };

        let patterns: BTreeSet<String> = changed
            .iter()
            .flat_map(|path| self.patterns_for(path))
            .collect();
        let candidate_count: usize = patterns.len();
        let wildcards: usize = patterns.iter().filter(|p| p.ends_with('*')).count();

        if candidate_count > self.max_paths || wildcards > self.max_wildcards {
            tracing::info!(
                candidate_count,
                wildcards,
                max_paths = self.max_paths,
                max_wildcards = self.max_wildcards,
                "Invalidation candidates exceed limits, collapsing to wildcard"
            );
            return InvalidationBatch {
                paths: vec![WILDCARD_ALL.to_string()],
                caller_reference,
                created_at,
                wildcard: true,
                candidate_count,
            };
        }

        let paths: Vec<String> = patterns.into_iter().collect();
        let wildcard: bool = paths.len() == 1 && paths[0] == WILDCARD_ALL;
        InvalidationBatch {
            paths,
            caller_reference,
            created_at,
            wildcard,
            candidate_count,
        }
    }

    /// URL patterns that must be purged when `relative_path` changes.
    ///
    /// - `index.html` at the root: `/` and `/index.html`
    /// - `<dir>/index.html`: `/<dir>*`, covering `/<dir>`, `/<dir>/` and the
    ///   file itself; when `<dir>` contains a `.` the extensionless form is
    ///   not served, so `/<dir>/` and `/<dir>/index.html` are listed instead
    /// - anything else: its own URL
    pub fn patterns_for(&self, relative_path: &str) -> Vec<String> {
        let relative_path: &str = relative_path.trim_start_matches('/');
        if relative_path.is_empty()
            || relative_path == DEPLOY_MANIFEST_KEY
            || self.cache_policy.is_immutable(relative_path)
        {
            return Vec::new();
        }

        match index_directory(relative_path) {
            Some("") => vec!["/".to_string(), "/index.html".to_string()],
            Some(dir) if dir.contains('.') => vec![
                format!("/{}/", encode_path(dir)),
                format!("/{}", encode_path(relative_path)),
            ],
            Some(dir) => vec![format!("/{}*", encode_path(dir))],
            None => vec![format!("/{}", encode_path(relative_path))],
        }
    }
}

/// Caller reference of the form `sitepush-<utc timestamp>-<random hex>`.
pub fn new_caller_reference(now: DateTime<Utc>) -> String {
    let suffix: u32 = rand::random();
    format!("sitepush-{}-{:08x}", now.format("%Y%m%dT%H%M%S%.3fZ"), suffix)
}

/// Percent-encode characters the CDN does not accept literally in a path.
fn encode_path(path: &str) -> String {
    let mut encoded: String = String::with_capacity(path.len());
    for byte in path.bytes() {
        match byte {
            b'A'..=b'Z'
            | b'a'..=b'z'
            | b'0'..=b'9'
            | b'-'
            | b'.'
            | b'_'
            | b'~'
            | b'/'
            | b'!'
            | b'$'
            | b'&'
            | b'\''
            | b'('
            | b')'
            | b'+'
            | b','
            | b';'
            | b'='
            | b':'
            | b'@' => encoded.push(byte as char),
            other => encoded.push_str(&format!("%{:02X}", other)),
        }
    }
    encoded
}
