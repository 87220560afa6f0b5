//! Deployment state machine.
//!
//! `Idle -> Building -> Uploading -> Invalidating -> Verifying -> {Succeeded, Failed}`
//!
//! Each stage records its own outcome in the [`DeploymentReport`]. A failing
//! stage moves the run straight to `Failed`; later stages never start. Single
//! stage commands enter the machine at their stage and finish after it.

use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use sitepush_cdn::{
    CdnClient, ChangeScope, InvalidationBatch, InvalidationHandle, InvalidationPlanner,
    InvalidationStatus, Invalidator, DEFAULT_POLL_INTERVAL,
};
use sitepush_common::{
    retry_with_backoff, CancellationFlag, RetrySettings, DEFAULT_REQUEST_TIMEOUT,
};
use sitepush_filesystem::{
    diff_manifests, ArtifactScanner, BuildArtifactSet, ChangeSet, DeployManifest, GlobFilter,
    ScanOptions,
};
use sitepush_storage::{
    load_previous_manifest, store_manifest, with_timeout, BucketLocation, StorageClient,
    StorageError, UploadOptions, UploadSummary, Uploader,
};

use crate::build::BuildStep;
use crate::config::{DeployConfig, Stage};
use crate::error::DeployError;
use crate::report::{
    DeploymentReport, InvalidationReport, StageName, StageOutcome, StageStatus, UploadReport,
};
use crate::verify::{HttpProbe, VerificationEntry, Verifier, VerifyTarget};

/// Distribution id used by dry runs without a configured one.
pub const DRY_RUN_DISTRIBUTION_ID: &str = "DRYRUN";

/// Position of a run in the deployment state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeployState {
    Idle,
    Building,
    Uploading,
    Invalidating,
    Verifying,
    Succeeded,
    Failed,
}

impl DeployState {
    pub fn is_terminal(self) -> bool {
        matches!(self, DeployState::Succeeded | DeployState::Failed)
    }

    /// Transitions the machine allows. Single-stage commands may enter at
    /// their stage and succeed right after it.
    pub fn can_transition_to(self, next: DeployState) -> bool {
        use DeployState::*;
        match (self, next) {
            (Succeeded, _) | (Failed, _) => false,
            (_, Failed) => true,
            (Idle, Building) | (Idle, Invalidating) | (Idle, Verifying) => true,
            (Building, Uploading) | (Building, Succeeded) => true,
            (Uploading, Invalidating) | (Uploading, Succeeded) => true,
            (Invalidating, Verifying) | (Invalidating, Succeeded) => true,
            (Verifying, Succeeded) => true,
            _ => false,
        }
    }
}

impl fmt::Display for DeployState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Everything the orchestrator needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct DeployOptions {
    pub location: BucketLocation,
    pub upload: UploadOptions,
    pub scan_filter: GlobFilter,
    pub planner: InvalidationPlanner,
    pub distribution_id: String,
    pub invalidation_retry: RetrySettings,
    /// Bound for each invalidation submission and manifest transfer.
    pub request_timeout: Duration,
    /// Poll the invalidation until it completes or times out.
    pub await_invalidation: bool,
    pub invalidation_timeout: Duration,
    pub poll_interval: Duration,
    pub verify_targets: Vec<VerifyTarget>,
    /// Failing checks fail the run instead of being reported only.
    pub verify_blocking: bool,
    pub verify_timeout: Duration,
    pub dry_run: bool,
}

impl DeployOptions {
    pub fn new(location: BucketLocation, distribution_id: impl Into<String>) -> Self {
        Self {
            location,
            upload: UploadOptions::default(),
            scan_filter: GlobFilter::default(),
            planner: InvalidationPlanner::default(),
            distribution_id: distribution_id.into(),
            invalidation_retry: RetrySettings::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            await_invalidation: false,
            invalidation_timeout: sitepush_cdn::DEFAULT_INVALIDATION_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            verify_targets: Vec::new(),
            verify_blocking: false,
            verify_timeout: Duration::from_secs(10),
            dry_run: false,
        }
    }

    /// Derive options from a validated configuration.
    pub fn from_config(config: &DeployConfig) -> Result<Self, DeployError> {
        let distribution_id: String = config
            .distribution_id()
            .unwrap_or(DRY_RUN_DISTRIBUTION_ID)
            .to_string();

        Ok(Self {
            upload: config.upload_options(),
            scan_filter: config.scan_filter()?,
            planner: config.planner(),
            request_timeout: config.request_timeout(),
            await_invalidation: config.await_invalidation,
            invalidation_timeout: config.invalidation_timeout(),
            verify_targets: config.verify_targets()?,
            verify_blocking: config.verify_blocking,
            verify_timeout: config.verify_timeout(),
            dry_run: config.dry_run,
            ..Self::new(config.bucket_location(), distribution_id)
        })
    }
}

/// What the invalidation stage has to cover.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Changes {
    All,
    Paths(Vec<String>),
}

/// Drives one deployment run.
pub struct DeploymentOrchestrator<'a, S: StorageClient, C: CdnClient> {
    storage: &'a S,
    cdn: &'a C,
    build: &'a dyn BuildStep,
    probe: &'a dyn HttpProbe,
    options: DeployOptions,
    cancel: CancellationFlag,
    state: DeployState,
    report: DeploymentReport,
}

impl<'a, S: StorageClient, C: CdnClient> DeploymentOrchestrator<'a, S, C> {
    /// Create an orchestrator in the `Idle` state.
    ///
    /// # Arguments
    /// * `storage` - Object store the site is published to
    /// * `cdn` - CDN in front of the object store
    /// * `build` - Step producing the build output
    /// * `probe` - HTTP client used by verification
    /// * `options` - Run settings
    pub fn new(
        storage: &'a S,
        cdn: &'a C,
        build: &'a dyn BuildStep,
        probe: &'a dyn HttpProbe,
        options: DeployOptions,
    ) -> Self {
        let report: DeploymentReport = DeploymentReport::new(options.dry_run);
        Self {
            storage,
            cdn,
            build,
            probe,
            options,
            cancel: CancellationFlag::new(),
            state: DeployState::Idle,
            report,
        }
    }

    /// Share a cancellation flag with the caller. Raising it stops new
    /// uploads and polling; the run then ends `Failed` at the next stage
    /// boundary.
    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> DeployState {
        self.state
    }

    /// Run the full pipeline.
    pub async fn run(self) -> DeploymentReport {
        self.run_stage(Stage::Deploy).await
    }

    /// Run one command: a single stage, or the full pipeline for
    /// [`Stage::Deploy`].
    pub async fn run_stage(mut self, stage: Stage) -> DeploymentReport {
        tracing::info!(?stage, dry_run = self.options.dry_run, "Starting run");
        let result: Result<(), DeployError> = match stage {
            Stage::Deploy => self.deploy().await,
            Stage::Build => self.build_only().await,
            Stage::Upload => self.upload_only().await,
            Stage::Invalidate => self.invalidate_all().await,
            Stage::Verify => self.verify_only().await,
        };
        self.finish(result)
    }

    async fn deploy(&mut self) -> Result<(), DeployError> {
        self.check_cancelled("build")?;
        self.transition(DeployState::Building);
        let artifacts: BuildArtifactSet = self.build_stage(true).await?;

        self.check_cancelled("upload")?;
        let previous: Option<DeployManifest> = self.load_previous().await;
        self.transition(DeployState::Uploading);
        let summary: UploadSummary = self.upload_stage(&artifacts).await?;

        self.check_cancelled("invalidate")?;
        self.transition(DeployState::Invalidating);
        let (changes, current) = detect_changes(previous.as_ref(), &artifacts, &summary);
        self.invalidate_stage(changes).await?;
        if let Some(manifest) = current {
            self.record_manifest(&manifest).await;
        }

        self.transition(DeployState::Verifying);
        self.verify_stage().await
    }

    async fn build_only(&mut self) -> Result<(), DeployError> {
        self.transition(DeployState::Building);
        self.build_stage(true).await.map(|_| ())
    }

    /// Publish the output of an earlier build; the build step is not run.
    async fn upload_only(&mut self) -> Result<(), DeployError> {
        self.transition(DeployState::Building);
        let artifacts: BuildArtifactSet = self.build_stage(false).await?;
        self.check_cancelled("upload")?;
        self.transition(DeployState::Uploading);
        self.upload_stage(&artifacts).await.map(|_| ())
    }

    async fn invalidate_all(&mut self) -> Result<(), DeployError> {
        self.transition(DeployState::Invalidating);
        self.invalidate_stage(Changes::All).await
    }

    async fn verify_only(&mut self) -> Result<(), DeployError> {
        self.transition(DeployState::Verifying);
        self.verify_stage().await
    }

    /// Run the build step (when `rebuild` is set) and scan its output.
    ///
    /// # Errors
    /// `Build` or `Scan` on failure, `EmptyBuild` if nothing was produced.
    async fn build_stage(&mut self, rebuild: bool) -> Result<BuildArtifactSet, DeployError> {
        let started: Instant = Instant::now();
        let result: Result<BuildArtifactSet, DeployError> = if rebuild {
            tracing::info!(step = %self.build.describe(), "Building");
            match self.build.run().await {
                Ok(output_dir) => self.scan(output_dir).await,
                Err(e) => Err(e),
            }
        } else {
            tracing::info!(step = %self.build.describe(), "Scanning earlier build output");
            match self.build.existing_output() {
                Ok(output_dir) => self.scan(output_dir).await,
                Err(e) => Err(e),
            }
        };
        match &result {
            Ok(artifacts) => {
                self.report.artifact_count = artifacts.len();
                self.report.artifact_bytes = artifacts.total_bytes();
                self.record(
                    StageName::Build,
                    StageStatus::Succeeded,
                    format!(
                        "{} files, {} bytes in {}",
                        artifacts.len(),
                        artifacts.total_bytes(),
                        artifacts.root().display()
                    ),
                    started,
                );
            }
            Err(err) => self.record(StageName::Build, StageStatus::Failed, err.to_string(), started),
        }
        result
    }

    async fn scan(&self, output_dir: PathBuf) -> Result<BuildArtifactSet, DeployError> {
        let options: ScanOptions = ScanOptions::new(&output_dir)
            .with_filter(self.options.scan_filter.clone())
            .with_hashes(true);

        let artifacts: BuildArtifactSet =
            tokio::task::spawn_blocking(move || ArtifactScanner::new().scan(&options, None))
                .await
                .map_err(|e| DeployError::Build {
                    message: format!("scan task failed: {}", e),
                })??;

        if artifacts.is_empty() {
            return Err(DeployError::EmptyBuild { path: output_dir });
        }
        Ok(artifacts)
    }

    /// Previous deployment's manifest. Unreadable counts as absent.
    async fn load_previous(&self) -> Option<DeployManifest> {
        let load = load_previous_manifest(self.storage, &self.options.location);
        match with_timeout(self.options.request_timeout, "load_manifest", load).await {
            Ok(Some(manifest)) => Some(manifest),
            Ok(None) => {
                tracing::info!("No previous deploy manifest; invalidating everything");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "Previous deploy manifest unreadable; invalidating everything");
                None
            }
        }
    }

    /// Publish every artifact.
    ///
    /// # Errors
    /// `Upload` wrapping `PartialUpload` (failing keys land in the report)
    /// or `Cancelled`.
    async fn upload_stage(
        &mut self,
        artifacts: &BuildArtifactSet,
    ) -> Result<UploadSummary, DeployError> {
        let started: Instant = Instant::now();
        let uploader = Uploader::new(self.storage, self.options.location.clone())
            .with_options(self.options.upload.clone())
            .with_cancellation(self.cancel.clone());

        match uploader.upload(artifacts, None).await {
            Ok(summary) => {
                let upload: UploadReport = UploadReport::from_summary(&summary);
                let mut detail: String = format!(
                    "{} files, {} bytes, {} retries",
                    upload.files_uploaded, upload.bytes_uploaded, upload.retries
                );
                if !upload.pruned.is_empty() {
                    detail.push_str(&format!(", {} pruned", upload.pruned.len()));
                }
                let status: StageStatus = if upload.prune_error.is_some() {
                    StageStatus::Advisory
                } else {
                    StageStatus::Succeeded
                };
                self.report.upload = Some(upload);
                self.record(StageName::Upload, status, detail, started);
                Ok(summary)
            }
            Err(err) => {
                if let StorageError::PartialUpload { statistics } = &err {
                    self.report.upload = Some(UploadReport::from_statistics(statistics));
                }
                self.record(StageName::Upload, StageStatus::Failed, err.to_string(), started);
                Err(err.into())
            }
        }
    }

    /// Plan and submit the invalidation, optionally waiting for it.
    ///
    /// # Errors
    /// `Invalidation` if submission failed. Timeouts and polling errors are
    /// advisory.
    async fn invalidate_stage(&mut self, changes: Changes) -> Result<(), DeployError> {
        let started: Instant = Instant::now();
        let batch: InvalidationBatch = match &changes {
            Changes::All => self.options.planner.plan(ChangeScope::All),
            Changes::Paths(paths) => self.options.planner.plan(ChangeScope::Paths(paths)),
        };

        if batch.is_empty() {
            self.record(
                StageName::Invalidate,
                StageStatus::Skipped,
                "no cached paths changed".to_string(),
                started,
            );
            return Ok(());
        }

        let distribution_id: String = self.options.distribution_id.clone();
        let mut invalidation: InvalidationReport =
            InvalidationReport::planned(&distribution_id, &batch);
        let invalidator = Invalidator::new(self.cdn, distribution_id)
            .with_retry(self.options.invalidation_retry.clone())
            .with_request_timeout(self.options.request_timeout)
            .with_poll_interval(self.options.poll_interval)
            .with_cancellation(self.cancel.clone());

        let handle: InvalidationHandle = match invalidator.submit(&batch).await {
            Ok(handle) => handle,
            Err(err) => {
                self.report.invalidation = Some(invalidation);
                self.record(
                    StageName::Invalidate,
                    StageStatus::Failed,
                    format!("{}; origin is already updated", err),
                    started,
                );
                return Err(err.into());
            }
        };
        invalidation.invalidation_id = Some(handle.id.clone());

        let status: InvalidationStatus = if self.options.await_invalidation {
            invalidator
                .await_completion(&handle, self.options.invalidation_timeout)
                .await
        } else {
            InvalidationStatus::InProgress
        };
        invalidation.status = Some(status);

        let stage_status: StageStatus = match status {
            InvalidationStatus::Completed | InvalidationStatus::InProgress => StageStatus::Succeeded,
            InvalidationStatus::TimedOut | InvalidationStatus::Failed => StageStatus::Advisory,
        };
        let detail: String = format!(
            "{} {} ({} paths{})",
            handle.id,
            status,
            batch.len(),
            if batch.wildcard { ", wildcard" } else { "" }
        );
        self.report.invalidation = Some(invalidation);
        self.record(StageName::Invalidate, stage_status, detail, started);
        Ok(())
    }

    /// Store the manifest of the deployment whose caches were just purged.
    /// Failure only costs the next run a full invalidation.
    async fn record_manifest(&mut self, manifest: &DeployManifest) {
        let storage: &S = self.storage;
        let location: &BucketLocation = &self.options.location;
        let limit: Duration = self.options.request_timeout;
        let result: Result<(), StorageError> =
            retry_with_backoff(&self.options.upload.retry, "store_manifest", || {
                with_timeout(limit, "store_manifest", store_manifest(storage, location, manifest))
            })
            .await;

        if let Err(e) = result {
            tracing::warn!(error = %e, "Could not store deploy manifest");
            if let Some(upload) = self.report.upload.as_mut() {
                upload.manifest_error = Some(e.to_string());
            }
        }
    }

    /// Check the configured targets.
    ///
    /// # Errors
    /// `Verification` only when verification is blocking and a check failed.
    async fn verify_stage(&mut self) -> Result<(), DeployError> {
        let started: Instant = Instant::now();
        if self.options.verify_targets.is_empty() {
            self.record(
                StageName::Verify,
                StageStatus::Skipped,
                "no verification targets".to_string(),
                started,
            );
            return Ok(());
        }

        let verifier: Verifier<'_> = Verifier::new(self.probe, self.options.verify_timeout);
        let entries: Vec<VerificationEntry> = verifier.verify(&self.options.verify_targets).await;
        let total: usize = entries.len();
        let failed: usize = entries.iter().filter(|e| !e.passed).count();
        self.report.verification = entries;

        let detail: String = format!("{} of {} checks passed", total - failed, total);
        if failed == 0 {
            self.record(StageName::Verify, StageStatus::Succeeded, detail, started);
            Ok(())
        } else if self.options.verify_blocking {
            self.record(StageName::Verify, StageStatus::Failed, detail, started);
            Err(DeployError::Verification { failed, total })
        } else {
            self.record(StageName::Verify, StageStatus::Advisory, detail, started);
            Ok(())
        }
    }

    fn check_cancelled(&self, stage: &'static str) -> Result<(), DeployError> {
        if self.cancel.is_cancelled() {
            Err(DeployError::Cancelled { stage })
        } else {
            Ok(())
        }
    }

    fn transition(&mut self, next: DeployState) {
        if !self.state.can_transition_to(next) {
            tracing::error!(from = %self.state, to = %next, "Invalid state transition ignored");
            return;
        }
        tracing::info!(from = %self.state, to = %next, "Deployment state change");
        self.state = next;
        self.report.transitions.push(next);
        self.report.final_state = next;
    }

    fn record(&mut self, stage: StageName, status: StageStatus, detail: String, started: Instant) {
        self.report.stages.push(StageOutcome {
            stage,
            status,
            detail,
            elapsed_ms: started.elapsed().as_millis() as u64,
        });
    }

    fn finish(mut self, result: Result<(), DeployError>) -> DeploymentReport {
        match result {
            Ok(()) => self.transition(DeployState::Succeeded),
            Err(err) => {
                tracing::error!(error = %err, state = %self.state, "Deployment failed");
                self.report.error = Some(err.to_string());
                self.transition(DeployState::Failed);
            }
        }
        self.report.finished_at = Some(Utc::now());
        self.report
    }
}

/// Work out what the CDN has to forget, and the manifest describing the
/// new deployment.
fn detect_changes(
    previous: Option<&DeployManifest>,
    artifacts: &BuildArtifactSet,
    summary: &UploadSummary,
) -> (Changes, Option<DeployManifest>) {
    let current: DeployManifest = match DeployManifest::from_artifacts(artifacts) {
        Ok(manifest) => manifest,
        Err(e) => {
            tracing::warn!(error = %e, "Could not build deploy manifest; invalidating everything");
            return (Changes::All, None);
        }
    };

    let changes: Changes = match previous {
        Some(previous) => {
            let mut diff: ChangeSet = diff_manifests(previous, &current);
            diff.extend_deleted(summary.pruned.iter().cloned());
            tracing::info!(
                added = diff.added.len(),
                modified = diff.modified.len(),
                deleted = diff.deleted.len(),
                unchanged = diff.unchanged,
                "Detected changes since previous deployment"
            );
            Changes::Paths(diff.changed_paths())
        }
        None => Changes::All,
    };
    (changes, Some(current))
}
