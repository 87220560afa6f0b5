//! Environment-driven configuration.
//!
//! Every setting is read from a `SITEPUSH_`-prefixed environment variable;
//! see [`DeployConfig`] for names and defaults.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use sitepush_cdn::InvalidationPlanner;
use sitepush_common::{
    RetrySettings, DEFAULT_IMMUTABLE_PREFIX, DEFAULT_MAX_INVALIDATION_PATHS,
    DEFAULT_REQUEST_TIMEOUT, DEFAULT_UPLOAD_CONCURRENCY,
};
use sitepush_filesystem::GlobFilter;
use sitepush_storage::{BucketLocation, CachePolicySelector, StorageSettings, UploadOptions};

use crate::error::DeployError;
use crate::verify::VerifyTarget;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "SITEPUSH_";

/// Which part of the pipeline a command runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Build,
    Upload,
    Invalidate,
    Verify,
    Deploy,
}

impl Stage {
    fn needs_bucket(self) -> bool {
        matches!(self, Stage::Upload | Stage::Deploy)
    }

    fn needs_distribution(self) -> bool {
        matches!(self, Stage::Invalidate | Stage::Deploy)
    }
}

/// Deployment settings, one field per `SITEPUSH_<FIELD>` variable.
#[derive(Debug, Clone, Deserialize)]
pub struct DeployConfig {
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default = "default_region")]
    pub region: String,
    pub expected_bucket_owner: Option<String>,
    pub distribution_id: Option<String>,

    /// Shell command producing the site; absent means the output already exists.
    pub build_command: Option<String>,
    #[serde(default = "default_build_dir")]
    pub build_dir: PathBuf,
    /// Comma-separated glob patterns excluded from the scan.
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,
    #[serde(default = "default_immutable_prefix")]
    pub immutable_prefix: String,

    #[serde(default = "default_upload_concurrency")]
    pub upload_concurrency: usize,
    #[serde(default = "default_upload_max_attempts")]
    pub upload_max_attempts: u32,
    #[serde(default)]
    pub prune: bool,
    /// Bound for each object store or CDN request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_invalidation_max_paths")]
    pub invalidation_max_paths: usize,
    #[serde(default)]
    pub await_invalidation: bool,
    #[serde(default = "default_invalidation_timeout_secs")]
    pub invalidation_timeout_secs: u64,

    pub site_url: Option<String>,
    /// Comma-separated absolute URLs or site-relative paths.
    #[serde(default)]
    pub verify_targets: Vec<String>,
    #[serde(default)]
    pub verify_blocking: bool,
    #[serde(default = "default_verify_timeout_secs")]
    pub verify_timeout_secs: u64,

    #[serde(default)]
    pub dry_run: bool,
    pub report_path: Option<PathBuf>,
    #[serde(default)]
    pub log_json: bool,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_build_dir() -> PathBuf {
    PathBuf::from("out")
}

fn default_exclude() -> Vec<String> {
    vec!["**/.DS_Store".to_string()]
}

fn default_immutable_prefix() -> String {
    DEFAULT_IMMUTABLE_PREFIX.to_string()
}

fn default_upload_concurrency() -> usize {
    DEFAULT_UPLOAD_CONCURRENCY
}

fn default_upload_max_attempts() -> u32 {
    3
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT.as_secs()
}

fn default_invalidation_max_paths() -> usize {
    DEFAULT_MAX_INVALIDATION_PATHS
}

fn default_invalidation_timeout_secs() -> u64 {
    300
}

fn default_verify_timeout_secs() -> u64 {
    10
}

impl DeployConfig {
    /// Load configuration from `SITEPUSH_*` environment variables.
    pub fn from_env() -> Result<Self, DeployError> {
        Ok(envy::prefixed(ENV_PREFIX).from_env::<DeployConfig>()?)
    }

    /// Load configuration from explicit `(NAME, value)` pairs, names
    /// including the prefix.
    pub fn from_pairs<I>(pairs: I) -> Result<Self, DeployError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Ok(envy::prefixed(ENV_PREFIX).from_iter::<_, DeployConfig>(pairs)?)
    }

    /// Check that the settings can drive `stage`.
    ///
    /// # Errors
    /// `Config` naming the first offending setting.
    pub fn validate(&self, stage: Stage) -> Result<(), DeployError> {
        if stage.needs_bucket() && self.bucket.trim().is_empty() {
            return Err(config_error("SITEPUSH_BUCKET is required"));
        }
        if stage.needs_distribution() && !self.dry_run && self.distribution_id().is_none() {
            return Err(config_error("SITEPUSH_DISTRIBUTION_ID is required"));
        }
        if self.upload_concurrency == 0 {
            return Err(config_error("SITEPUSH_UPLOAD_CONCURRENCY must be at least 1"));
        }
        if self.upload_max_attempts == 0 {
            return Err(config_error("SITEPUSH_UPLOAD_MAX_ATTEMPTS must be at least 1"));
        }
        if self.invalidation_max_paths == 0 {
            return Err(config_error("SITEPUSH_INVALIDATION_MAX_PATHS must be at least 1"));
        }
        if matches!(stage, Stage::Verify | Stage::Deploy) {
            self.verify_targets()?;
        }
        Ok(())
    }

    /// Distribution id, treating an empty value as unset.
    pub fn distribution_id(&self) -> Option<&str> {
        self.distribution_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    pub fn storage_settings(&self) -> StorageSettings {
        StorageSettings {
            region: self.region.clone(),
            request_timeout: self.request_timeout(),
            expected_bucket_owner: self.expected_bucket_owner.clone(),
        }
    }

    pub fn bucket_location(&self) -> BucketLocation {
        BucketLocation::new(self.bucket.trim(), self.prefix.as_str())
    }

    pub fn cache_policy(&self) -> CachePolicySelector {
        CachePolicySelector::new(&self.immutable_prefix)
    }

    pub fn upload_options(&self) -> UploadOptions {
        UploadOptions::new()
            .with_max_concurrency(self.upload_concurrency)
            .with_retry(RetrySettings::default().with_max_attempts(self.upload_max_attempts))
            .with_request_timeout(self.request_timeout())
            .with_prune(self.prune)
            .with_cache_policy(self.cache_policy())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn planner(&self) -> InvalidationPlanner {
        InvalidationPlanner::new(self.cache_policy()).with_max_paths(self.invalidation_max_paths)
    }

    pub fn scan_filter(&self) -> Result<GlobFilter, DeployError> {
        let patterns: Vec<String> = non_empty(&self.exclude);
        Ok(GlobFilter::exclude(patterns)?)
    }

    pub fn invalidation_timeout(&self) -> Duration {
        Duration::from_secs(self.invalidation_timeout_secs)
    }

    pub fn verify_timeout(&self) -> Duration {
        Duration::from_secs(self.verify_timeout_secs.max(1))
    }

    /// Resolve the configured verification targets against `site_url`.
    ///
    /// # Errors
    /// `Config` if a relative path is given without a site URL, or an entry
    /// is not a valid URL.
    pub fn verify_targets(&self) -> Result<Vec<VerifyTarget>, DeployError> {
        non_empty(&self.verify_targets)
            .iter()
            .map(|entry| VerifyTarget::resolve(entry, self.site_url.as_deref()))
            .collect()
    }
}

fn non_empty(items: &[String]) -> Vec<String> {
    items
        .iter()
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn config_error(message: &str) -> DeployError {
    DeployError::Config {
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = DeployConfig::from_pairs(pairs(&[("SITEPUSH_BUCKET", "www-example")])).unwrap();

        assert_eq!(config.bucket, "www-example");
        assert_eq!(config.region, "us-east-1");
        assert_eq!(config.build_dir, PathBuf::from("out"));
        assert_eq!(config.exclude, vec!["**/.DS_Store"]);
        assert_eq!(config.immutable_prefix, "_next/static/");
        assert_eq!(config.upload_concurrency, 8);
        assert_eq!(config.upload_max_attempts, 3);
        assert!(!config.prune);
        assert_eq!(config.request_timeout(), Duration::from_secs(120));
        assert_eq!(config.invalidation_max_paths, 1000);
        assert_eq!(config.invalidation_timeout(), Duration::from_secs(300));
        assert!(!config.verify_blocking);
        assert!(!config.dry_run);
        assert!(config.verify_targets().unwrap().is_empty());
    }

    #[test]
    fn test_lists_and_flags() {
        let config = DeployConfig::from_pairs(pairs(&[
            ("SITEPUSH_BUCKET", "www-example"),
            ("SITEPUSH_PREFIX", "/live/"),
            ("SITEPUSH_PRUNE", "true"),
            ("SITEPUSH_SITE_URL", "https://example.com"),
            ("SITEPUSH_VERIFY_TARGETS", "/,/about,https://cdn.example.com/robots.txt"),
            ("SITEPUSH_UPLOAD_CONCURRENCY", "16"),
        ]))
        .unwrap();

        assert!(config.prune);
        assert_eq!(config.upload_concurrency, 16);
        assert_eq!(config.bucket_location().prefix, "live");

        let targets = config.verify_targets().unwrap();
        let urls: Vec<&str> = targets.iter().map(|t| t.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://example.com/",
                "https://example.com/about",
                "https://cdn.example.com/robots.txt"
            ]
        );
    }

    #[test]
    fn test_request_timeout_reaches_store_and_uploader() {
        let config = DeployConfig::from_pairs(pairs(&[
            ("SITEPUSH_BUCKET", "www-example"),
            ("SITEPUSH_REQUEST_TIMEOUT_SECS", "15"),
        ]))
        .unwrap();

        assert_eq!(config.storage_settings().request_timeout, Duration::from_secs(15));
        assert_eq!(config.upload_options().request_timeout, Duration::from_secs(15));
    }

    #[test]
    fn test_validate_requires_bucket_for_upload() {
        let config = DeployConfig::from_pairs(Vec::new()).unwrap();
        assert!(matches!(
            config.validate(Stage::Upload),
            Err(DeployError::Config { .. })
        ));
        assert!(config.validate(Stage::Build).is_ok());
    }

    #[test]
    fn test_validate_requires_distribution_unless_dry_run() {
        let config = DeployConfig::from_pairs(pairs(&[("SITEPUSH_BUCKET", "b")])).unwrap();
        assert!(config.validate(Stage::Deploy).is_err());
        assert!(config.validate(Stage::Upload).is_ok());

        let config = DeployConfig::from_pairs(pairs(&[
            ("SITEPUSH_BUCKET", "b"),
            ("SITEPUSH_DRY_RUN", "true"),
        ]))
        .unwrap();
        assert!(config.validate(Stage::Deploy).is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let config = DeployConfig::from_pairs(pairs(&[
            ("SITEPUSH_BUCKET", "b"),
            ("SITEPUSH_UPLOAD_CONCURRENCY", "0"),
        ]))
        .unwrap();
        assert!(config.validate(Stage::Upload).is_err());
    }

    #[test]
    fn test_relative_target_needs_site_url() {
        let config = DeployConfig::from_pairs(pairs(&[
            ("SITEPUSH_BUCKET", "b"),
            ("SITEPUSH_DISTRIBUTION_ID", "E123"),
            ("SITEPUSH_VERIFY_TARGETS", "/about"),
        ]))
        .unwrap();
        assert!(matches!(
            config.validate(Stage::Deploy),
            Err(DeployError::Config { .. })
        ));
    }

    #[test]
    fn test_invalid_number_is_env_error() {
        let result = DeployConfig::from_pairs(pairs(&[("SITEPUSH_UPLOAD_CONCURRENCY", "many")]));
        assert!(matches!(result, Err(DeployError::Env(_))));
    }
}
