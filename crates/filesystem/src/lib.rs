//! Build output handling for sitepush.
//!
//! This crate turns a build output directory into deployable data:
//! - `GlobFilter` - Include/exclude pattern matching
//! - `ArtifactScanner` - Directory walk producing a `BuildArtifactSet`
//! - `DeployManifest` - Record of a published deployment
//! - `diff_manifests()` - Change detection between deployments

pub mod diff;
pub mod error;
pub mod glob;
pub mod manifest;
pub mod scanner;

pub use diff::{diff_manifests, ChangeSet};
pub use error::FileSystemError;
pub use glob::GlobFilter;
pub use manifest::{DeployManifest, ManifestEntry, MANIFEST_VERSION};
pub use scanner::{
    ArtifactFile, ArtifactScanner, BuildArtifactSet, ScanOptions, ScanPhase, ScanProgress,
};
