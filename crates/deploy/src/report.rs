//! End-of-run deployment report.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sitepush_cdn::{InvalidationBatch, InvalidationStatus};
use sitepush_storage::{TransferStatistics, UploadSummary};

use crate::orchestrator::DeployState;
use crate::verify::VerificationEntry;

/// Pipeline stage named in the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StageName {
    Build,
    Upload,
    Invalidate,
    Verify,
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name: &str = match self {
            StageName::Build => "build",
            StageName::Upload => "upload",
            StageName::Invalidate => "invalidate",
            StageName::Verify => "verify",
        };
        f.write_str(name)
    }
}

/// How a stage ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StageStatus {
    Succeeded,
    Failed,
    /// Nothing to do.
    Skipped,
    /// Finished with problems that do not fail the run.
    Advisory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageOutcome {
    pub stage: StageName,
    pub status: StageStatus,
    pub detail: String,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UploadReport {
    pub files_uploaded: u64,
    pub bytes_uploaded: u64,
    pub retries: u64,
    /// Keys that exhausted their retry budget.
    pub failed_keys: Vec<String>,
    pub pruned: Vec<String>,
    pub prune_error: Option<String>,
    /// Set when the deploy manifest could not be stored; the next run then
    /// falls back to a full invalidation.
    pub manifest_error: Option<String>,
}

impl UploadReport {
    pub fn from_statistics(statistics: &TransferStatistics) -> Self {
        Self {
            files_uploaded: statistics.files_transferred,
            bytes_uploaded: statistics.bytes_transferred,
            retries: statistics.retries,
            failed_keys: statistics.failed_keys(),
            ..Default::default()
        }
    }

    pub fn from_summary(summary: &UploadSummary) -> Self {
        Self {
            pruned: summary.pruned.clone(),
            prune_error: summary.prune_error.clone(),
            ..Self::from_statistics(&summary.statistics)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidationReport {
    pub distribution_id: String,
    pub invalidation_id: Option<String>,
    pub caller_reference: String,
    pub paths: Vec<String>,
    pub wildcard: bool,
    pub status: Option<InvalidationStatus>,
}

impl InvalidationReport {
    pub fn planned(distribution_id: &str, batch: &InvalidationBatch) -> Self {
        Self {
            distribution_id: distribution_id.to_string(),
            invalidation_id: None,
            caller_reference: batch.caller_reference.clone(),
            paths: batch.paths.clone(),
            wildcard: batch.wildcard,
            status: None,
        }
    }
}

/// Everything a run did, stage by stage.
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub dry_run: bool,
    pub final_state: DeployState,
    /// Every state entered, in order, starting with `Idle`.
    pub transitions: Vec<DeployState>,
    pub stages: Vec<StageOutcome>,
    pub artifact_count: usize,
    pub artifact_bytes: u64,
    pub upload: Option<UploadReport>,
    pub invalidation: Option<InvalidationReport>,
    pub verification: Vec<VerificationEntry>,
    pub error: Option<String>,
}

impl DeploymentReport {
    pub fn new(dry_run: bool) -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            dry_run,
            final_state: DeployState::Idle,
            transitions: vec![DeployState::Idle],
            stages: Vec::new(),
            artifact_count: 0,
            artifact_bytes: 0,
            upload: None,
            invalidation: None,
            verification: Vec::new(),
            error: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.final_state == DeployState::Succeeded
    }

    pub fn stage(&self, stage: StageName) -> Option<&StageOutcome> {
        self.stages.iter().find(|outcome| outcome.stage == stage)
    }

    /// Pretty JSON for `SITEPUSH_REPORT_PATH`.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for DeploymentReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode: &str = if self.dry_run { " (dry run)" } else { "" };
        writeln!(f, "Deployment {}{}", self.final_state, mode)?;

        for outcome in &self.stages {
            writeln!(
                f,
                "  {:<11} {:<10} {} ({} ms)",
                outcome.stage.to_string(),
                format!("{:?}", outcome.status),
                outcome.detail,
                outcome.elapsed_ms
            )?;
        }

        if let Some(upload) = &self.upload {
            for key in &upload.failed_keys {
                writeln!(f, "  failed upload: {}", key)?;
            }
            for path in &upload.pruned {
                writeln!(f, "  pruned: {}", path)?;
            }
            if let Some(err) = &upload.prune_error {
                writeln!(f, "  prune error: {}", err)?;
            }
            if let Some(err) = &upload.manifest_error {
                writeln!(f, "  manifest error: {}", err)?;
            }
        }

        if let Some(invalidation) = &self.invalidation {
            let status: String = invalidation
                .status
                .map(|s| s.to_string())
                .unwrap_or_else(|| "not submitted".to_string());
            writeln!(
                f,
                "  invalidation {} [{}]: {}",
                invalidation.invalidation_id.as_deref().unwrap_or("-"),
                status,
                invalidation.paths.join(" ")
            )?;
        }

        for entry in self.verification.iter().filter(|e| !e.passed) {
            writeln!(
                f,
                "  failed check: {} ({})",
                entry.target,
                entry.error.as_deref().unwrap_or("failed")
            )?;
        }

        if let Some(err) = &self.error {
            writeln!(f, "  error: {}", err)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_lists_failures() {
        let mut report = DeploymentReport::new(false);
        report.final_state = DeployState::Failed;
        report.stages.push(StageOutcome {
            stage: StageName::Upload,
            status: StageStatus::Failed,
            detail: "1 of 3 files failed to upload".to_string(),
            elapsed_ms: 12,
        });
        report.upload = Some(UploadReport {
            failed_keys: vec!["about/index.html".to_string()],
            ..Default::default()
        });
        report.error = Some("Upload failed".to_string());

        let text = report.to_string();
        assert!(text.starts_with("Deployment Failed"));
        assert!(text.contains("failed upload: about/index.html"));
        assert!(text.contains("error: Upload failed"));
        assert!(!report.succeeded());
    }

    #[test]
    fn test_json_shape() {
        let report = DeploymentReport::new(true);
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["final_state"], "Idle");
        assert_eq!(json["dry_run"], true);
        assert_eq!(json["transitions"][0], "Idle");
    }
}
