//! Glob pattern matching for build output filtering.
//!
//! Patterns are matched against POSIX relative paths (`about/index.html`)
//! using `globset` semantics: `*` crosses directory separators, `**/x`
//! also matches `x` at the root, and brace expansion is supported.

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::error::FileSystemError;

/// Include/exclude filter applied to every file found in the build tree.
#[derive(Debug, Clone, Default)]
pub struct GlobFilter {
    /// Patterns for files to include (empty = include all).
    include: Vec<String>,
    /// Patterns for files to exclude.
    exclude: Vec<String>,
    include_set: Option<GlobSet>,
    exclude_set: Option<GlobSet>,
}

impl GlobFilter {
    /// Create a new filter with no patterns (matches everything).
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a filter with exclude patterns only.
    ///
    /// # Errors
    /// Returns error if any pattern is invalid.
    pub fn exclude(patterns: Vec<String>) -> Result<Self, FileSystemError> {
        Self::with_patterns(vec![], patterns)
    }

    /// Create a filter with both include and exclude patterns.
    ///
    /// # Errors
    /// Returns error if any pattern is invalid.
    pub fn with_patterns(
        include: Vec<String>,
        exclude: Vec<String>,
    ) -> Result<Self, FileSystemError> {
        let include_set: Option<GlobSet> = compile(&include)?;
        let exclude_set: Option<GlobSet> = compile(&exclude)?;
        Ok(Self {
            include,
            exclude,
            include_set,
            exclude_set,
        })
    }

    /// Check whether a POSIX relative path passes the filter.
    pub fn matches(&self, path: &str) -> bool {
        let included: bool = self
            .include_set
            .as_ref()
            .map_or(true, |set: &GlobSet| set.is_match(path));
        let excluded: bool = self
            .exclude_set
            .as_ref()
            .map_or(false, |set: &GlobSet| set.is_match(path));

        included && !excluded
    }

    /// Check if the filter has any patterns.
    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    pub fn exclude_patterns(&self) -> &[String] {
        &self.exclude
    }
}

fn compile(patterns: &[String]) -> Result<Option<GlobSet>, FileSystemError> {
    if patterns.is_empty() {
        return Ok(None);
    }

    let mut builder: GlobSetBuilder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob: Glob = Glob::new(pattern).map_err(|e| FileSystemError::InvalidGlobPattern {
            pattern: pattern.clone(),
            reason: e.to_string(),
        })?;
        builder.add(glob);
    }

    let set: GlobSet = builder
        .build()
        .map_err(|e| FileSystemError::InvalidGlobPattern {
            pattern: patterns.join(", "),
            reason: e.to_string(),
        })?;
    Ok(Some(set))
}
