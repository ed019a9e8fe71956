//! Read-only sets of `(path, bytes)` entries to synchronise.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use crate::error::{Error, Result};
use crate::planner::is_excluded_component;
use crate::repo_path::RepoPath;

/// A readable set of files, keyed by `/`-separated relative path.
pub trait Snapshot: Send + Sync {
    /// Every file path in the snapshot. Order is unspecified.
    ///
    /// # Errors
    /// Returns error if the snapshot cannot be enumerated.
    fn paths(&self) -> Result<Vec<String>>;

    /// Exact bytes of one file.
    ///
    /// # Errors
    /// Returns error if the file is absent or unreadable.
    fn read(&self, path: &RepoPath) -> Result<Vec<u8>>;
}

/// Snapshot backed by a local directory.
#[derive(Debug, Clone)]
pub struct DirectorySnapshot {
    root: PathBuf,
}

impl DirectorySnapshot {
    /// Snapshot rooted at `root`.
    ///
    /// # Errors
    /// Returns [`Error::Storage`] if `root` is not a directory.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(Error::Storage(format!(
                "snapshot root {} is not a directory",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    /// The snapshot root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn keep(entry: &DirEntry) -> bool {
    entry.depth() == 0 || !is_excluded_component(&entry.file_name().to_string_lossy())
}

impl Snapshot for DirectorySnapshot {
    fn paths(&self) -> Result<Vec<String>> {
        let mut paths = Vec::new();
        for entry in WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_entry(keep)
        {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let joined = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            paths.push(joined);
        }
        Ok(paths)
    }

    fn read(&self, path: &RepoPath) -> Result<Vec<u8>> {
        let full = path
            .as_str()
            .split('/')
            .fold(self.root.clone(), |acc, segment| acc.join(segment));
        Ok(fs::read(full)?)
    }
}

/// Snapshot held in memory, used for downloaded object stores and tests.
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshot {
    files: BTreeMap<String, Vec<u8>>,
}

impl MemorySnapshot {
    /// Empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a file.
    pub fn insert(&mut self, path: impl Into<String>, content: impl Into<Vec<u8>>) {
        self.files.insert(path.into(), content.into());
    }

    /// Number of files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the snapshot holds no files.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl<P: Into<String>, C: Into<Vec<u8>>> FromIterator<(P, C)> for MemorySnapshot {
    fn from_iter<I: IntoIterator<Item = (P, C)>>(iter: I) -> Self {
        let mut snapshot = Self::new();
        for (path, content) in iter {
            snapshot.insert(path, content);
        }
        snapshot
    }
}

impl Snapshot for MemorySnapshot {
    fn paths(&self) -> Result<Vec<String>> {
        Ok(self.files.keys().cloned().collect())
    }

    fn read(&self, path: &RepoPath) -> Result<Vec<u8>> {
        self.files
            .get(path.as_str())
            .or_else(|| {
                // Keys may still carry backslashes; RepoPath normalised them.
                self.files
                    .iter()
                    .find(|(k, _)| k.replace('\\', "/") == path.as_str())
                    .map(|(_, v)| v)
            })
            .cloned()
            .ok_or_else(|| Error::Storage(format!("{path} is not in the snapshot")))
    }
}
