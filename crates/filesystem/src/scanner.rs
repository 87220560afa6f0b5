//! Build output scanner producing an immutable [`BuildArtifactSet`].

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use sitepush_common::{hash_file, normalize_relative, ProgressCallback};
use walkdir::WalkDir;

use crate::error::FileSystemError;
use crate::glob::GlobFilter;

/// Options for scanning a build output directory.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Build output directory.
    pub root: PathBuf,
    /// Include/exclude filter applied to relative paths.
    pub filter: GlobFilter,
    /// Compute content hashes during the scan (needed for change detection).
    pub compute_hashes: bool,
}

impl ScanOptions {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            filter: GlobFilter::default(),
            compute_hashes: true,
        }
    }

    pub fn with_filter(mut self, filter: GlobFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_hashes(mut self, compute_hashes: bool) -> Self {
        self.compute_hashes = compute_hashes;
        self
    }
}

/// Progress updates during a scan.
#[derive(Debug, Clone)]
pub struct ScanProgress {
    pub phase: ScanPhase,
    /// Relative path of the file just processed.
    pub current_path: Option<String>,
    pub files_found: u64,
    pub bytes_found: u64,
}

/// Phase of the scan operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    Walking,
    Hashing,
    Complete,
}

/// A single file in the build output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactFile {
    /// Relative path from the build root (POSIX format).
    pub relative_path: String,
    /// Absolute path on disk.
    pub absolute_path: PathBuf,
    /// File size in bytes.
    pub size: u64,
    /// Modification time in microseconds since the epoch.
    pub mtime_us: i64,
    /// XXH3-128 content hash, if computed.
    pub hash: Option<String>,
}

/// Snapshot of a build output tree, ordered by relative path.
///
/// Created once per deployment run and read-only afterwards.
#[derive(Debug, Clone)]
pub struct BuildArtifactSet {
    root: PathBuf,
    files: Vec<ArtifactFile>,
}

impl BuildArtifactSet {
    /// Assemble a set from already-collected files. Files are sorted by
    /// relative path so iteration order is deterministic.
    pub fn new(root: impl Into<PathBuf>, mut files: Vec<ArtifactFile>) -> Self {
        files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        files.dedup_by(|a, b| a.relative_path == b.relative_path);
        Self {
            root: root.into(),
            files,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn files(&self) -> &[ArtifactFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f: &ArtifactFile| f.size).sum()
    }

    /// Look up a file by its relative path.
    pub fn get(&self, relative_path: &str) -> Option<&ArtifactFile> {
        self.files
            .binary_search_by(|f: &ArtifactFile| f.relative_path.as_str().cmp(relative_path))
            .ok()
            .map(|idx: usize| &self.files[idx])
    }
}

/// Walks a build output directory.
#[derive(Debug, Default)]
pub struct ArtifactScanner;

impl ArtifactScanner {
    pub fn new() -> Self {
        Self
    }

    /// Scan the build output into a [`BuildArtifactSet`].
    ///
    /// Symlinks are never followed; they are skipped with a warning because
    /// the object store has no representation for them.
    ///
    /// # Errors
    /// Returns error if the root is missing, the tree cannot be read, or a
    /// file cannot be hashed.
    pub fn scan(
        &self,
        options: &ScanOptions,
        progress: Option<&dyn ProgressCallback<ScanProgress>>,
    ) -> Result<BuildArtifactSet, FileSystemError> {
        let root: &Path = &options.root;
        if !root.is_dir() {
            return Err(FileSystemError::RootNotFound {
                path: root.to_path_buf(),
            });
        }

        let mut files: Vec<ArtifactFile> = Vec::new();
        let mut bytes_found: u64 = 0;

        report(progress, ScanPhase::Walking, None, 0, 0);

        for entry in WalkDir::new(root).follow_links(false) {
            let entry: walkdir::DirEntry = entry.map_err(|e| FileSystemError::IoError {
                path: e
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
                source: e.into(),
            })?;

            let file_type: std::fs::FileType = entry.file_type();
            if file_type.is_dir() {
                continue;
            }

            let path: &Path = entry.path();
            if file_type.is_symlink() {
                log::warn!("Skipping symlink in build output: {}", path.display());
                continue;
            }

            let relative_path: String = normalize_relative(path, root)?;
            if !options.filter.is_empty() && !options.filter.matches(&relative_path) {
                log::debug!("Excluded by filter: {}", relative_path);
                continue;
            }

            let metadata: std::fs::Metadata =
                entry.metadata().map_err(|e| FileSystemError::IoError {
                    path: path.display().to_string(),
                    source: e.into(),
                })?;

            let mtime_us: i64 = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_micros() as i64)
                .unwrap_or(0);

            bytes_found += metadata.len();
            files.push(ArtifactFile {
                relative_path,
                absolute_path: path.to_path_buf(),
                size: metadata.len(),
                mtime_us,
                hash: None,
            });
        }

        if options.compute_hashes {
            for (idx, file) in files.iter_mut().enumerate() {
                let hash: String =
                    hash_file(&file.absolute_path).map_err(|e| FileSystemError::IoError {
                        path: file.absolute_path.display().to_string(),
                        source: e,
                    })?;
                file.hash = Some(hash);
                report(
                    progress,
                    ScanPhase::Hashing,
                    Some(file.relative_path.clone()),
                    idx as u64 + 1,
                    bytes_found,
                );
            }
        }

        let set: BuildArtifactSet = BuildArtifactSet::new(root, files);
        report(
            progress,
            ScanPhase::Complete,
            None,
            set.len() as u64,
            set.total_bytes(),
        );
        Ok(set)
    }
}

fn report(
    progress: Option<&dyn ProgressCallback<ScanProgress>>,
    phase: ScanPhase,
    current_path: Option<String>,
    files_found: u64,
    bytes_found: u64,
) {
    if let Some(cb) = progress {
        cb.on_progress(&ScanProgress {
            phase,
            current_path,
            files_found,
            bytes_found,
        });
    }
}
