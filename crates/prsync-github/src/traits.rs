//! Trait abstractions for GitHub operations.
//!
//! These traits are the seams the sync orchestrator depends on, enabling
//! dependency injection and in-memory fakes in tests.

use std::future::Future;

use crate::auth::InstallationToken;
use crate::error::AuthError;
use crate::{CreatePullRequest, PullRequest, RepositoryRef, Result};

/// Exchanges App credentials for a repository-scoped installation token.
pub trait CredentialBroker: Send + Sync {
    /// Acquire a fresh installation token for `owner/repo`.
    fn acquire_token(
        &self,
        owner: &str,
        repo: &str,
    ) -> impl Future<Output = std::result::Result<InstallationToken, AuthError>> + Send;
}

/// Capability interface over the remote hosting API.
///
/// Every mutating call is expressed so that a stale view of the remote
/// surfaces as [`Error::Conflict`](crate::Error::Conflict) instead of
/// overwriting a concurrent change.
pub trait RepositoryGateway: Send + Sync {
    // === Repository Operations ===

    /// Resolve a repository and its default branch.
    fn resolve_repository(
        &self,
        owner: &str,
        name: &str,
    ) -> impl Future<Output = Result<RepositoryRef>> + Send;

    // === Ref Operations ===

    /// Commit SHA at the tip of `branch`.
    fn branch_head(
        &self,
        repo: &RepositoryRef,
        branch: &str,
    ) -> impl Future<Output = Result<String>> + Send;

    /// Create `name` pointing at `base_sha`. Fails with a conflict if the
    /// branch already exists.
    fn create_branch(
        &self,
        repo: &RepositoryRef,
        name: &str,
        base_sha: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Delete a branch.
    fn delete_branch(
        &self,
        repo: &RepositoryRef,
        name: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    // === Content Operations ===

    /// Blob SHA of `path` on `branch`, or `None` when the file is absent.
    fn get_file_sha(
        &self,
        repo: &RepositoryRef,
        branch: &str,
        path: &str,
    ) -> impl Future<Output = Result<Option<String>>> + Send;

    /// Raw bytes of `path` on `branch`, or `None` when the file is absent.
    fn get_file_content(
        &self,
        repo: &RepositoryRef,
        branch: &str,
        path: &str,
    ) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send;

    /// Write `content` to `path` on `branch`.
    ///
    /// Without `prior_sha` this is a create; with it, a compare-and-swap
    /// update. Returns the new blob SHA.
    fn put_file(
        &self,
        repo: &RepositoryRef,
        branch: &str,
        path: &str,
        content: &[u8],
        prior_sha: Option<&str>,
    ) -> impl Future<Output = Result<String>> + Send;

    // === PR Operations ===

    /// Open a pull request.
    fn open_pull_request(
        &self,
        repo: &RepositoryRef,
        pr: CreatePullRequest,
    ) -> impl Future<Output = Result<PullRequest>> + Send;
}

/// Builds a gateway bound to an installation token.
pub trait GatewayConnector: Send + Sync {
    /// Gateway type produced.
    type Gateway: RepositoryGateway;

    /// Bind a gateway to `token`.
    ///
    /// # Errors
    /// Returns error if the underlying client cannot be constructed.
    fn connect(&self, token: &InstallationToken) -> Result<Self::Gateway>;
}
