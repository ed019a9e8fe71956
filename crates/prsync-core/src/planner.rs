//! File sync planning.
//!
//! Turns a [`Snapshot`] into an ordered [`ChangeSet`]: hidden entries and
//! version-control metadata are filtered out, every remaining path is checked
//! against the [`RepoPath`] allow-list, and each surviving file becomes a
//! create or a compare-and-swap update depending on whether the working
//! branch already holds a blob at that path.

use std::collections::HashMap;
use std::future::Future;

use prsync_github::{RepositoryGateway, RepositoryRef};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::repo_path::RepoPath;
use crate::snapshot::Snapshot;

/// Version-control metadata directories never synchronised.
pub const VCS_DIRS: &[&str] = &[".git", ".hg", ".svn", "CVS"];

/// Whether a single path component excludes its entry from planning.
///
/// Hidden names (leading `.`) and VCS metadata directories are excluded.
/// `.` and `..` are left for path validation to reject.
#[must_use]
pub fn is_excluded_component(name: &str) -> bool {
    if name == "." || name == ".." {
        return false;
    }
    name.starts_with('.') || VCS_DIRS.contains(&name)
}

/// What to do with a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeAction {
    /// No blob exists on the working branch.
    Create,
    /// Replace the blob last observed with `prior_sha`.
    Update {
        /// Blob SHA seen on the working branch at planning time.
        prior_sha: String,
    },
}

/// A single file write.
#[derive(Debug, Clone)]
pub struct FileChange {
    /// Target path.
    pub path: RepoPath,
    /// Exact bytes to write.
    pub content: Vec<u8>,
    /// Create or update.
    pub action: ChangeAction,
}

impl FileChange {
    /// The SHA an update must match, `None` for creates.
    #[must_use]
    pub fn prior_sha(&self) -> Option<&str> {
        match &self.action {
            ChangeAction::Create => None,
            ChangeAction::Update { prior_sha } => Some(prior_sha),
        }
    }
}

/// Outcome of resolving one candidate path.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// The file should be written.
    Change(FileChange),
    /// The path failed validation and is left out.
    Skip {
        /// Candidate path as it appeared in the snapshot.
        path: String,
        /// Why it was skipped.
        reason: String,
    },
}

/// A path left out of the change-set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedPath {
    /// Candidate path as it appeared in the snapshot.
    pub path: String,
    /// Why it was skipped.
    pub reason: String,
}

/// Ordered changes for a run, plus the paths that were skipped.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    /// Changes in application order.
    pub changes: Vec<FileChange>,
    /// Candidates rejected by path validation or shadowed by an earlier
    /// candidate with the same normalised path.
    pub skipped: Vec<SkippedPath>,
}

impl ChangeSet {
    /// Number of creates in this change-set.
    #[must_use]
    pub fn count_creates(&self) -> usize {
        self.changes
            .iter()
            .filter(|c| c.action == ChangeAction::Create)
            .count()
    }

    /// Number of updates in this change-set.
    #[must_use]
    pub fn count_updates(&self) -> usize {
        self.changes
            .iter()
            .filter(|c| matches!(c.action, ChangeAction::Update { .. }))
            .count()
    }

    /// Check if this change-set has nothing to write.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Existing-blob lookup on the working branch.
pub trait BlobLookup: Send + Sync {
    /// Blob SHA at `path`, `None` when no file exists there.
    fn blob_sha(
        &self,
        path: &RepoPath,
    ) -> impl Future<Output = prsync_github::Result<Option<String>>> + Send;
}

/// [`BlobLookup`] backed by a gateway and a branch.
pub struct BranchLookup<'a, G> {
    gateway: &'a G,
    repo: &'a RepositoryRef,
    branch: &'a str,
}

impl<'a, G: RepositoryGateway> BranchLookup<'a, G> {
    /// Look up blobs on `branch` of `repo`.
    pub const fn new(gateway: &'a G, repo: &'a RepositoryRef, branch: &'a str) -> Self {
        Self {
            gateway,
            repo,
            branch,
        }
    }
}

impl<G: RepositoryGateway> BlobLookup for BranchLookup<'_, G> {
    async fn blob_sha(&self, path: &RepoPath) -> prsync_github::Result<Option<String>> {
        self.gateway
            .get_file_sha(self.repo, self.branch, path.as_str())
            .await
    }
}

/// Builds change-sets from a snapshot.
pub struct FileSyncPlanner<'a, S: ?Sized> {
    snapshot: &'a S,
}

impl<'a, S: Snapshot + ?Sized> FileSyncPlanner<'a, S> {
    /// Plan over `snapshot`.
    pub const fn new(snapshot: &'a S) -> Self {
        Self { snapshot }
    }

    /// Candidate paths in lexicographic order, with hidden and VCS entries
    /// removed.
    ///
    /// # Errors
    /// Returns error if the snapshot cannot be enumerated.
    pub fn plan(&self) -> Result<Vec<String>> {
        let mut paths: Vec<String> = self
            .snapshot
            .paths()?
            .into_iter()
            .filter(|p| !p.split(['/', '\\']).any(is_excluded_component))
            .collect();
        paths.sort();
        paths.dedup();
        Ok(paths)
    }

    /// Validate one candidate, read it, and decide between create and update.
    ///
    /// # Errors
    /// Returns error if the snapshot read fails or the lookup fails for any
    /// reason other than the file being absent.
    pub async fn resolve(&self, candidate: &str, lookup: &impl BlobLookup) -> Result<Resolution> {
        let path = match RepoPath::new(candidate) {
            Ok(path) => path,
            Err(Error::InvalidPath { reason, .. }) => {
                return Ok(Resolution::Skip {
                    path: candidate.to_string(),
                    reason,
                });
            }
            Err(e) => return Err(e),
        };

        let content = self.snapshot.read(&path)?;
        let action = match lookup.blob_sha(&path).await? {
            Some(prior_sha) => ChangeAction::Update { prior_sha },
            None => ChangeAction::Create,
        };
        debug!(path = %path, bytes = content.len(), action = ?action, "resolved file");

        Ok(Resolution::Change(FileChange {
            path,
            content,
            action,
        }))
    }

    /// Plan and resolve every candidate.
    ///
    /// A candidate that normalises to a path already planned, such as a
    /// backslash spelling next to its slash spelling, is skipped. The first in
    /// plan order wins.
    ///
    /// # Errors
    /// Propagates the first fatal error from [`Self::plan`] or [`Self::resolve`].
    pub async fn build(&self, lookup: &impl BlobLookup) -> Result<ChangeSet> {
        let mut set = ChangeSet::default();
        let mut planned: HashMap<String, String> = HashMap::new();
        for candidate in self.plan()? {
            let shadowed_by = RepoPath::new(&candidate)
                .ok()
                .and_then(|path| planned.get(path.as_str()).cloned());
            if let Some(first) = shadowed_by {
                let reason = format!("duplicate of {first}");
                warn!(path = %candidate, reason = %reason, "skipping file");
                set.skipped.push(SkippedPath {
                    path: candidate,
                    reason,
                });
                continue;
            }

            match self.resolve(&candidate, lookup).await? {
                Resolution::Change(change) => {
                    planned.insert(change.path.as_str().to_string(), candidate);
                    set.changes.push(change);
                }
                Resolution::Skip { path, reason } => {
                    warn!(path = %path, reason = %reason, "skipping file");
                    set.skipped.push(SkippedPath { path, reason });
                }
            }
        }
        Ok(set)
    }
}
