//! Deploy manifest: the record of what a deployment published.
//!
//! The manifest is stored next to the site in the object store and read back
//! by the next run to work out which paths changed.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sitepush_common::hash_file;

use crate::error::FileSystemError;
use crate::scanner::{ArtifactFile, BuildArtifactSet};

/// Current manifest format version.
pub const MANIFEST_VERSION: u32 = 1;

/// Hash and size of one published file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub hash: String,
    pub size: u64,
}

/// Snapshot of a published site keyed by relative path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployManifest {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub files: BTreeMap<String, ManifestEntry>,
}

impl DeployManifest {
    /// Build a manifest from a scanned artifact set.
    ///
    /// Files scanned without hashes are hashed here.
    ///
    /// # Errors
    /// Returns error if a file has to be hashed and cannot be read.
    pub fn from_artifacts(artifacts: &BuildArtifactSet) -> Result<Self, FileSystemError> {
        let mut files: BTreeMap<String, ManifestEntry> = BTreeMap::new();
        for file in artifacts.files() {
            files.insert(
                file.relative_path.clone(),
                ManifestEntry {
                    hash: content_hash(file)?,
                    size: file.size,
                },
            );
        }

        Ok(Self {
            version: MANIFEST_VERSION,
            created_at: Utc::now(),
            files,
        })
    }

    /// Encode as JSON bytes for upload.
    pub fn to_json(&self) -> Result<Vec<u8>, FileSystemError> {
        serde_json::to_vec_pretty(self).map_err(|e| FileSystemError::InvalidManifest {
            message: e.to_string(),
        })
    }

    /// Decode from JSON bytes, rejecting unknown format versions.
    pub fn from_json(data: &[u8]) -> Result<Self, FileSystemError> {
        let manifest: DeployManifest =
            serde_json::from_slice(data).map_err(|e| FileSystemError::InvalidManifest {
                message: e.to_string(),
            })?;
        if manifest.version != MANIFEST_VERSION {
            return Err(FileSystemError::InvalidManifest {
                message: format!("unsupported manifest version {}", manifest.version),
            });
        }
        Ok(manifest)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn content_hash(file: &ArtifactFile) -> Result<String, FileSystemError> {
    match &file.hash {
        Some(hash) => Ok(hash.clone()),
        None => hash_file(&file.absolute_path).map_err(|e| FileSystemError::IoError {
            path: file.absolute_path.display().to_string(),
            source: e,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn artifact(path: &str, hash: &str, size: u64) -> ArtifactFile {
        ArtifactFile {
            relative_path: path.to_string(),
            absolute_path: PathBuf::from("/build/out").join(path),
            size,
            mtime_us: 0,
            hash: Some(hash.to_string()),
        }
    }

    #[test]
    fn test_from_artifacts_uses_scanned_hashes() {
        let set: BuildArtifactSet = BuildArtifactSet::new(
            "/build/out",
            vec![artifact("index.html", "aa", 10), artifact("app.css", "bb", 20)],
        );
        let manifest: DeployManifest = DeployManifest::from_artifacts(&set).unwrap();

        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest.files["app.css"].hash, "bb");
        assert_eq!(manifest.files["index.html"].size, 10);
    }

    #[test]
    fn test_from_artifacts_hashes_missing() {
        let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("robots.txt"), "User-agent: *").unwrap();
        let set: BuildArtifactSet = BuildArtifactSet::new(
            dir.path(),
            vec![ArtifactFile {
                relative_path: "robots.txt".to_string(),
                absolute_path: dir.path().join("robots.txt"),
                size: 13,
                mtime_us: 0,
                hash: None,
            }],
        );

        let manifest: DeployManifest = DeployManifest::from_artifacts(&set).unwrap();
        assert_eq!(
            manifest.files["robots.txt"].hash,
            sitepush_common::hash_bytes(b"User-agent: *")
        );
    }

    #[test]
    fn test_json_round_trip_preserves_entries() {
        let set: BuildArtifactSet =
            BuildArtifactSet::new("/build/out", vec![artifact("index.html", "aa", 10)]);
        let manifest: DeployManifest = DeployManifest::from_artifacts(&set).unwrap();

        let decoded: DeployManifest = DeployManifest::from_json(&manifest.to_json().unwrap()).unwrap();
        assert_eq!(decoded, manifest);
    }

    #[test]
    fn test_from_json_rejects_garbage_and_unknown_version() {
        assert!(DeployManifest::from_json(b"not json").is_err());

        let future: &[u8] =
            br#"{"version":99,"created_at":"2026-01-01T00:00:00Z","files":{}}"#;
        let err: FileSystemError = DeployManifest::from_json(future).unwrap_err();
        assert!(err.to_string().contains("unsupported manifest version 99"));
    }
}
