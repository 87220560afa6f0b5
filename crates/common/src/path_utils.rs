//! Path normalization between the local build tree, object keys and URLs.
//!
//! Relative paths inside a build tree are always carried in POSIX form
//! (`about/index.html`), whatever the host OS separator is. Object keys and
//! URL paths are derived from that form only.

use std::path::{Component, Path, PathBuf};

use crate::error::PathError;

/// Convert a path to absolute without resolving symlinks.
///
/// # Errors
/// Returns error if the current directory cannot be determined.
pub fn to_absolute(path: &Path) -> Result<PathBuf, PathError> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        std::env::current_dir()
            .map(|cwd: PathBuf| cwd.join(path))
            .map_err(|e: std::io::Error| PathError::from_io(path.display().to_string(), e))
    }
}

/// Lexical path normalization without filesystem access.
///
/// Removes `.` components and resolves `..` components lexically.
pub fn lexical_normalize(path: &Path) -> PathBuf {
    let mut components: Vec<Component> = Vec::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !components.is_empty()
                    && !matches!(
                        components.last(),
                        Some(Component::ParentDir) | Some(Component::RootDir)
                    )
                {
                    components.pop();
                } else {
                    components.push(component);
                }
            }
            _ => components.push(component),
        }
    }

    components.iter().collect()
}

/// Express `path` relative to `root` in POSIX form.
///
/// Both paths are made absolute and normalized lexically first, so symlinks
/// are never followed.
///
/// # Errors
/// Returns `PathOutsideRoot` if `path` does not live under `root`, and
/// `InvalidPath` if the result would be empty (i.e. `path == root`).
pub fn normalize_relative(path: &Path, root: &Path) -> Result<String, PathError> {
    let normalized: PathBuf = lexical_normalize(&to_absolute(path)?);
    let normalized_root: PathBuf = lexical_normalize(&to_absolute(root)?);

    let relative: &Path = normalized
        .strip_prefix(&normalized_root)
        .map_err(|_| PathError::PathOutsideRoot {
            path: normalized.display().to_string(),
            root: normalized_root.display().to_string(),
        })?;

    let posix: String = to_posix_path(relative);
    if posix.is_empty() {
        return Err(PathError::InvalidPath {
            path: normalized.display().to_string(),
        });
    }
    Ok(posix)
}

/// Convert a path to POSIX-style string (forward slashes).
pub fn to_posix_path(path: &Path) -> String {
    path.components()
        .map(|c: Component| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Join an optional key prefix and a POSIX relative path into an object key.
///
/// Leading/trailing slashes on the prefix are ignored so `"site/"`, `"/site"`
/// and `"site"` all produce `site/<path>`. An empty prefix yields the path.
pub fn join_key(prefix: &str, relative_path: &str) -> String {
    let prefix: &str = prefix.trim_matches('/');
    let relative_path: &str = relative_path.trim_start_matches('/');
    if prefix.is_empty() {
        relative_path.to_string()
    } else {
        format!("{}/{}", prefix, relative_path)
    }
}

/// Check if a path is within a root directory (lexically).
pub fn is_within_root(path: &Path, root: &Path) -> bool {
    lexical_normalize(path).starts_with(lexical_normalize(root))
}
