//! Post-deploy verification of sampled URLs.
//!
//! Every target is fetched independently with a bounded timeout. A timeout,
//! a transport error, an unexpected status or a content type mismatch all
//! produce a failing [`VerificationEntry`]; nothing here returns an error.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::Url;
use serde::Serialize;
use sitepush_cdn::object_path_for_request;
use sitepush_storage::resolve_content_type;

use crate::error::DeployError;

/// Targets fetched concurrently.
pub const DEFAULT_VERIFY_CONCURRENCY: usize = 4;

/// Status line and content type of a fetched URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResponse {
    pub status: u16,
    pub content_type: Option<String>,
}

/// Performs one HTTP GET.
#[async_trait]
pub trait HttpProbe: Send + Sync {
    /// Fetch `url`. Transport failures are returned as a message.
    async fn get(&self, url: &str) -> Result<ProbeResponse, String>;
}

/// [`HttpProbe`] backed by `reqwest`.
pub struct ReqwestProbe {
    client: reqwest::Client,
}

impl ReqwestProbe {
    pub fn new() -> Result<Self, DeployError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("sitepush/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DeployError::Io {
                path: "http client".to_string(),
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpProbe for ReqwestProbe {
    async fn get(&self, url: &str) -> Result<ProbeResponse, String> {
        let response = self.client.get(url).send().await.map_err(|e| e.to_string())?;
        let content_type: Option<String> = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        Ok(ProbeResponse {
            status: response.status().as_u16(),
            content_type,
        })
    }
}

/// One URL to check after a deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyTarget {
    pub url: String,
    pub expected_status: u16,
    /// Expected media type prefix, e.g. `text/html`.
    pub expected_content_type: String,
}

impl VerifyTarget {
    /// Build a target for `url`, deriving the expected content type from
    /// the object the edge rewrite serves for its path.
    ///
    /// # Errors
    /// `Config` if `url` is not an absolute URL.
    pub fn new(url: &str) -> Result<Self, DeployError> {
        let parsed: Url = Url::parse(url).map_err(|e| DeployError::Config {
            message: format!("invalid verification target '{}': {}", url, e),
        })?;
        let object_path: String = object_path_for_request(parsed.path());

        Ok(Self {
            url: parsed.to_string(),
            expected_status: 200,
            expected_content_type: media_type(resolve_content_type(&object_path)).to_string(),
        })
    }

    /// Resolve a configured entry: absolute URLs are used as is, anything
    /// else is a path under `site_url`.
    pub fn resolve(entry: &str, site_url: Option<&str>) -> Result<Self, DeployError> {
        if entry.starts_with("http://") || entry.starts_with("https://") {
            return Self::new(entry);
        }

        let site_url: &str = site_url.ok_or_else(|| DeployError::Config {
            message: format!(
                "verification target '{}' is relative but SITEPUSH_SITE_URL is not set",
                entry
            ),
        })?;
        let base: String = format!("{}/", site_url.trim_end_matches('/'));
        let base: Url = Url::parse(&base).map_err(|e| DeployError::Config {
            message: format!("invalid SITEPUSH_SITE_URL '{}': {}", site_url, e),
        })?;
        let joined: Url = base
            .join(entry.trim_start_matches('/'))
            .map_err(|e| DeployError::Config {
                message: format!("invalid verification target '{}': {}", entry, e),
            })?;

        Self::new(joined.as_str())
    }

    pub fn with_expected_status(mut self, status: u16) -> Self {
        self.expected_status = status;
        self
    }

    pub fn with_expected_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.expected_content_type = content_type.into();
        self
    }
}

/// Result of checking one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationEntry {
    pub target: String,
    pub expected_status: u16,
    pub actual_status: Option<u16>,
    pub expected_content_type: String,
    pub actual_content_type: Option<String>,
    pub passed: bool,
    /// Why the check failed, when it did.
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

/// Checks a list of targets through an [`HttpProbe`].
pub struct Verifier<'a> {
    probe: &'a dyn HttpProbe,
    timeout: Duration,
    max_concurrency: usize,
}

impl<'a> Verifier<'a> {
    pub fn new(probe: &'a dyn HttpProbe, timeout: Duration) -> Self {
        Self {
            probe,
            timeout,
            max_concurrency: DEFAULT_VERIFY_CONCURRENCY,
        }
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Check every target. Entries come back in target order.
    pub async fn verify(&self, targets: &[VerifyTarget]) -> Vec<VerificationEntry> {
        stream::iter(targets)
            .map(|target: &VerifyTarget| self.check(target))
            .buffered(self.max_concurrency)
            .collect()
            .await
    }

    async fn check(&self, target: &VerifyTarget) -> VerificationEntry {
        let started: Instant = Instant::now();
        let outcome = tokio::time::timeout(self.timeout, self.probe.get(&target.url)).await;
        let elapsed_ms: u64 = started.elapsed().as_millis() as u64;

        let mut entry: VerificationEntry = VerificationEntry {
            target: target.url.clone(),
            expected_status: target.expected_status,
            actual_status: None,
            expected_content_type: target.expected_content_type.clone(),
            actual_content_type: None,
            passed: false,
            error: None,
            elapsed_ms,
        };

        match outcome {
            Err(_) => {
                entry.error = Some(format!("timed out after {}ms", self.timeout.as_millis()));
            }
            Ok(Err(message)) => {
                entry.error = Some(message);
            }
            Ok(Ok(response)) => {
                entry.actual_status = Some(response.status);
                entry.actual_content_type = response.content_type.clone();

                let status_ok: bool = response.status == target.expected_status;
                let content_type_ok: bool = response
                    .content_type
                    .as_deref()
                    .map(|actual| content_type_matches(actual, &target.expected_content_type))
                    .unwrap_or(false);

                entry.passed = status_ok && content_type_ok;
                if !status_ok {
                    entry.error = Some(format!(
                        "expected status {}, got {}",
                        target.expected_status, response.status
                    ));
                } else if !content_type_ok {
                    entry.error = Some(format!(
                        "expected content type {}, got {}",
                        target.expected_content_type,
                        response.content_type.as_deref().unwrap_or("none")
                    ));
                }
            }
        }

        if entry.passed {
            tracing::info!(target = %entry.target, elapsed_ms, "Verification passed");
        } else {
            tracing::warn!(
                target = %entry.target,
                error = entry.error.as_deref().unwrap_or_default(),
                "Verification failed"
            );
        }
        entry
    }
}

/// `text/html; charset=utf-8` -> `text/html`
fn media_type(content_type: &str) -> &str {
    content_type.split(';').next().unwrap_or(content_type).trim()
}

/// XML is served as either `application/xml` or `text/xml`; both match.
fn content_type_matches(actual: &str, expected_prefix: &str) -> bool {
    let actual: String = media_type(actual).to_ascii_lowercase();
    let expected: String = expected_prefix.to_ascii_lowercase();
    actual.starts_with(&expected) || (is_xml(&actual) && is_xml(&expected))
}

fn is_xml(media_type: &str) -> bool {
    matches!(media_type, "application/xml" | "text/xml")
}
