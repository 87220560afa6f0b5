//! Change detection between two deploy manifests.

use std::collections::BTreeSet;

use crate::manifest::{DeployManifest, ManifestEntry};

/// Paths that differ between the previous and the current deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Present now, absent before.
    pub added: Vec<String>,
    /// Present in both with a different hash or size.
    pub modified: Vec<String>,
    /// Present before, absent now.
    pub deleted: Vec<String>,
    /// Number of files identical in both.
    pub unchanged: usize,
}

impl ChangeSet {
    /// All changed paths (added, modified, deleted), sorted.
    pub fn changed_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .added
            .iter()
            .chain(self.modified.iter())
            .chain(self.deleted.iter())
            .cloned()
            .collect();
        paths.sort();
        paths.dedup();
        paths
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    /// Record paths removed out of band (e.g. pruned remote objects).
    pub fn extend_deleted(&mut self, paths: impl IntoIterator<Item = String>) {
        let mut deleted: BTreeSet<String> = std::mem::take(&mut self.deleted).into_iter().collect();
        deleted.extend(paths);
        self.deleted = deleted.into_iter().collect();
    }
}

/// Compare the current manifest against the previously published one.
///
/// Both manifests are keyed by sorted relative path, so the outputs are
/// sorted too.
pub fn diff_manifests(previous: &DeployManifest, current: &DeployManifest) -> ChangeSet {
    let mut changes: ChangeSet = ChangeSet::default();

    for (path, entry) in &current.files {
        match previous.files.get(path) {
            None => changes.added.push(path.clone()),
            Some(old) if differs(old, entry) => changes.modified.push(path.clone()),
            Some(_) => changes.unchanged += 1,
        }
    }

    changes.deleted = previous
        .files
        .keys()
        .filter(|path| !current.files.contains_key(*path))
        .cloned()
        .collect();

    changes
}

fn differs(old: &ManifestEntry, new: &ManifestEntry) -> bool {
    old.hash != new.hash || old.size != new.size
}
