//! Static site deployment pipeline.
//!
//! Ties the workspace together: a [`BuildStep`] produces the site, the
//! storage crate's `Uploader` publishes it, the CDN crate plans and submits
//! the invalidation, and the [`Verifier`] samples the live site. The
//! [`DeploymentOrchestrator`] drives these stages as a state machine and
//! returns a [`DeploymentReport`].

pub mod build;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod report;
pub mod verify;

pub use build::{BuildStep, CommandBuild, ExistingOutput};
pub use config::{DeployConfig, Stage, ENV_PREFIX};
pub use error::DeployError;
pub use orchestrator::{DeployOptions, DeployState, DeploymentOrchestrator, DRY_RUN_DISTRIBUTION_ID};
pub use report::{
    DeploymentReport, InvalidationReport, StageName, StageOutcome, StageStatus, UploadReport,
};
pub use verify::{
    HttpProbe, ProbeResponse, ReqwestProbe, VerificationEntry, Verifier, VerifyTarget,
    DEFAULT_VERIFY_CONCURRENCY,
};
