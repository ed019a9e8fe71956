//! # prsync-core
//!
//! Core library for prsync: synchronising a snapshot of files into a GitHub
//! repository through a fresh branch and a pull request.
//!
//! The pieces, leaf first:
//!
//! - [`Snapshot`]: a read-only set of `(path, bytes)` entries, from a local
//!   directory or an object store ([`storage::materialize`]).
//! - [`FileSyncPlanner`]: filters and validates snapshot paths and turns
//!   them into an ordered [`ChangeSet`] of creates and updates.
//! - [`SyncOrchestrator`]: acquires credentials, creates the working branch,
//!   applies the changes and opens the pull request.

pub mod branch_name;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod planner;
pub mod repo_path;
pub mod snapshot;
pub mod storage;

#[cfg(test)]
mod test_mocks;

pub use branch_name::BranchName;
pub use config::Config;
pub use error::{Error, ErrorKind, Result};
pub use orchestrator::{
    SyncFailure, SyncOptions, SyncOrchestrator, SyncRequest, SyncResult, SyncState, SyncSuccess,
};
pub use planner::{ChangeAction, ChangeSet, FileChange, FileSyncPlanner, Resolution};
pub use repo_path::RepoPath;
pub use snapshot::{DirectorySnapshot, MemorySnapshot, Snapshot};
pub use storage::{ContentStore, LocalSecretStore, SecretStore, StorageUri};
