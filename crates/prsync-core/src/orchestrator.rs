//! Sync orchestration.
//!
//! A run moves strictly forward through [`SyncState`]:
//!
//! ```text
//! Init -> CredentialAcquired -> RepositoryResolved -> BranchCreated
//!      -> FilesPlanned -> FilesApplied -> PullRequestOpened
//! ```
//!
//! Any state may end the run as a [`SyncFailure`], which records the last
//! state reached, the working branch if one was created, and how many files
//! were written. Nothing is rolled back.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use prsync_github::{
    AuthErrorKind, CreatePullRequest, CredentialBroker, GatewayConnector, InstallationToken,
    RepositoryGateway,
};
use serde::Serialize;
use tokio::time::{Instant, sleep, timeout_at};
use tracing::{debug, error, info, warn};

use crate::branch_name::BranchName;
use crate::config::SyncConfig;
use crate::error::{Error, ErrorKind, Result};
use crate::planner::{BranchLookup, FileSyncPlanner};
use crate::repo_path::RepoPath;
use crate::snapshot::Snapshot;

/// Body of every pull request opened by a run.
pub const PULL_REQUEST_BODY: &str = "Automated update from prsync.";

/// Stage of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Init,
    CredentialAcquired,
    RepositoryResolved,
    BranchCreated,
    FilesPlanned,
    FilesApplied,
    PullRequestOpened,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::CredentialAcquired => "credential_acquired",
            Self::RepositoryResolved => "repository_resolved",
            Self::BranchCreated => "branch_created",
            Self::FilesPlanned => "files_planned",
            Self::FilesApplied => "files_applied",
            Self::PullRequestOpened => "pull_request_opened",
        };
        f.write_str(name)
    }
}

/// Target of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequest {
    /// Repository owner.
    pub owner: String,
    /// Repository name.
    pub repo: String,
}

impl SyncRequest {
    /// Build a request, trimming whitespace.
    ///
    /// # Errors
    /// Returns [`Error::Validation`] if either coordinate is blank.
    pub fn new(owner: impl AsRef<str>, repo: impl AsRef<str>) -> Result<Self> {
        let owner = owner.as_ref().trim();
        let repo = repo.as_ref().trim();
        if owner.is_empty() || repo.is_empty() {
            return Err(Error::Validation(
                "repo_owner and repo_name are required in the request payload.".into(),
            ));
        }
        Ok(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
        })
    }
}

/// Knobs for a run.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Overall deadline, measured from the start of the run.
    pub deadline: Duration,
    /// Credential attempts when failures are transient.
    pub max_auth_attempts: u32,
    /// Backoff before the first retry; doubles after each.
    pub retry_backoff: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

impl From<&SyncConfig> for SyncOptions {
    fn from(config: &SyncConfig) -> Self {
        Self {
            deadline: config.deadline(),
            max_auth_attempts: config.max_auth_attempts.max(1),
            retry_backoff: config.retry_backoff(),
        }
    }
}

/// A run that opened a pull request.
#[derive(Debug, Clone, Serialize)]
pub struct SyncSuccess {
    /// Web URL of the new pull request.
    pub pull_request_url: String,
    /// Working branch.
    pub branch: String,
    /// Files written to the branch.
    pub files_applied: usize,
    /// Snapshot paths rejected by validation.
    pub files_skipped: usize,
}

/// A run that stopped early.
#[derive(Debug, Clone, Serialize, thiserror::Error)]
#[error("{message}")]
pub struct SyncFailure {
    /// Classification.
    pub kind: ErrorKind,
    /// Human readable detail.
    pub message: String,
    /// Last state reached before the failure.
    pub stage: SyncState,
    /// Files already written to the working branch.
    pub files_applied: usize,
    /// Working branch, when it was created. It is left in place.
    pub branch: Option<String>,
}

impl SyncFailure {
    /// Failure raised while preparing a run, before any remote state changed.
    #[must_use]
    pub fn before_run(err: &Error) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            stage: SyncState::Init,
            files_applied: 0,
            branch: None,
        }
    }
}

/// Outcome of a run.
pub type SyncResult = std::result::Result<SyncSuccess, SyncFailure>;

struct Progress {
    state: SyncState,
    branch: Option<String>,
    files_applied: usize,
}

impl Progress {
    const fn new() -> Self {
        Self {
            state: SyncState::Init,
            branch: None,
            files_applied: 0,
        }
    }

    fn advance(&mut self, state: SyncState) {
        debug_assert!(state > self.state);
        info!(state = %state, "sync state");
        self.state = state;
    }

    fn fail(self, err: &Error) -> SyncFailure {
        let kind = err.kind();
        error!(
            kind = %kind,
            stage = %self.state,
            files_applied = self.files_applied,
            branch = self.branch.as_deref().unwrap_or(""),
            error = %err,
            "sync failed"
        );
        SyncFailure {
            kind,
            message: err.to_string(),
            stage: self.state,
            files_applied: self.files_applied,
            branch: self.branch,
        }
    }
}

/// Await `fut`, failing with [`Error::Timeout`] once `deadline` passes.
async fn within<T, E>(
    deadline: Instant,
    fut: impl Future<Output = std::result::Result<T, E>>,
) -> Result<T>
where
    E: Into<Error>,
{
    match timeout_at(deadline, fut).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(Error::Timeout),
    }
}

/// Drives a run from credentials to pull request.
pub struct SyncOrchestrator<B, C> {
    broker: B,
    connector: C,
    options: SyncOptions,
}

impl<B, C> SyncOrchestrator<B, C>
where
    B: CredentialBroker,
    C: GatewayConnector,
{
    /// Create an orchestrator over its collaborators.
    pub const fn new(broker: B, connector: C, options: SyncOptions) -> Self {
        Self {
            broker,
            connector,
            options,
        }
    }

    /// Synchronise `snapshot` into a new branch of the requested repository
    /// and open a pull request onto its default branch.
    pub async fn run<S>(&self, request: &SyncRequest, snapshot: &S) -> SyncResult
    where
        S: Snapshot + ?Sized,
    {
        self.run_started_at(request, snapshot, Utc::now()).await
    }

    /// As [`Self::run`], against a deadline the caller started earlier, for
    /// runs whose snapshot had to be fetched first.
    pub async fn run_until<S>(
        &self,
        request: &SyncRequest,
        snapshot: &S,
        deadline: Instant,
    ) -> SyncResult
    where
        S: Snapshot + ?Sized,
    {
        self.drive(request, snapshot, Utc::now(), deadline).await
    }

    /// As [`Self::run`], naming the working branch after `started_at`.
    pub async fn run_started_at<S>(
        &self,
        request: &SyncRequest,
        snapshot: &S,
        started_at: DateTime<Utc>,
    ) -> SyncResult
    where
        S: Snapshot + ?Sized,
    {
        let deadline = Instant::now() + self.options.deadline;
        self.drive(request, snapshot, started_at, deadline).await
    }

    async fn drive<S>(
        &self,
        request: &SyncRequest,
        snapshot: &S,
        started_at: DateTime<Utc>,
        deadline: Instant,
    ) -> SyncResult
    where
        S: Snapshot + ?Sized,
    {
        let mut progress = Progress::new();
        info!(owner = %request.owner, repo = %request.repo, "starting sync");

        match self
            .execute(request, snapshot, started_at, deadline, &mut progress)
            .await
        {
            Ok(success) => {
                info!(
                    url = %success.pull_request_url,
                    branch = %success.branch,
                    files_applied = success.files_applied,
                    "sync complete"
                );
                Ok(success)
            }
            Err(err) => Err(progress.fail(&err)),
        }
    }

    async fn execute<S>(
        &self,
        request: &SyncRequest,
        snapshot: &S,
        started_at: DateTime<Utc>,
        deadline: Instant,
        progress: &mut Progress,
    ) -> Result<SyncSuccess>
    where
        S: Snapshot + ?Sized,
    {
        let planner = FileSyncPlanner::new(snapshot);
        let candidates = planner.plan()?;
        if !candidates.iter().any(|c| RepoPath::new(c).is_ok()) {
            return Err(Error::Validation(format!(
                "snapshot contains no files to synchronise ({} candidates, none valid)",
                candidates.len()
            )));
        }

        let token = self.acquire_token(request, deadline).await?;
        let gateway = self.connector.connect(&token)?;
        drop(token);
        progress.advance(SyncState::CredentialAcquired);

        let repo = within(
            deadline,
            gateway.resolve_repository(&request.owner, &request.repo),
        )
        .await?;
        let base_sha = within(deadline, gateway.branch_head(&repo, &repo.default_branch)).await?;
        debug!(default_branch = %repo.default_branch, base = %base_sha, "resolved repository");
        progress.advance(SyncState::RepositoryResolved);

        let branch = BranchName::for_update(started_at);
        within(deadline, gateway.create_branch(&repo, &branch, &base_sha)).await?;
        progress.branch = Some(branch.to_string());
        progress.advance(SyncState::BranchCreated);

        let lookup = BranchLookup::new(&gateway, &repo, &branch);
        let changes = within(deadline, planner.build(&lookup)).await?;
        info!(
            creates = changes.count_creates(),
            updates = changes.count_updates(),
            skipped = changes.skipped.len(),
            "planned changes"
        );
        progress.advance(SyncState::FilesPlanned);

        for change in &changes.changes {
            let sha = within(
                deadline,
                gateway.put_file(
                    &repo,
                    &branch,
                    change.path.as_str(),
                    &change.content,
                    change.prior_sha(),
                ),
            )
            .await?;
            progress.files_applied += 1;
            debug!(path = %change.path, sha = %sha, "applied file");
        }
        progress.advance(SyncState::FilesApplied);

        let pr = within(
            deadline,
            gateway.open_pull_request(
                &repo,
                CreatePullRequest {
                    title: format!("Update from {branch}"),
                    body: PULL_REQUEST_BODY.to_string(),
                    head: branch.to_string(),
                    base: repo.default_branch.clone(),
                    draft: false,
                },
            ),
        )
        .await?;
        progress.advance(SyncState::PullRequestOpened);

        Ok(SyncSuccess {
            pull_request_url: pr.html_url,
            branch: branch.into_inner(),
            files_applied: progress.files_applied,
            files_skipped: changes.skipped.len(),
        })
    }

    async fn acquire_token(
        &self,
        request: &SyncRequest,
        deadline: Instant,
    ) -> Result<InstallationToken> {
        let mut backoff = self.options.retry_backoff;
        let mut attempt = 1;
        loop {
            let result = within(
                deadline,
                self.broker.acquire_token(&request.owner, &request.repo),
            )
            .await;
            match result {
                Err(Error::Auth(e))
                    if e.kind == AuthErrorKind::Transient
                        && attempt < self.options.max_auth_attempts =>
                {
                    warn!(
                        attempt,
                        backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "credential acquisition failed, retrying"
                    );
                    timeout_at(deadline, sleep(backoff))
                        .await
                        .map_err(|_| Error::Timeout)?;
                    backoff = backoff.saturating_mul(2);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}
