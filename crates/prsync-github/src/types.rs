//! GitHub API types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A repository resolved once per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRef {
    /// Owner login (user or organisation).
    pub owner: String,

    /// Repository name.
    pub name: String,

    /// The repository's mainline branch.
    pub default_branch: String,
}

impl RepositoryRef {
    /// `owner/name`.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// A GitHub Pull Request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    /// PR number.
    pub number: u64,

    /// PR title.
    pub title: String,

    /// Head branch name.
    pub head_branch: String,

    /// Base branch name.
    pub base_branch: String,

    /// PR URL.
    pub html_url: String,
}

/// Request to create a pull request.
#[derive(Debug, Clone, Serialize)]
pub struct CreatePullRequest {
    /// PR title.
    pub title: String,

    /// PR body.
    pub body: String,

    /// Head branch.
    pub head: String,

    /// Base branch.
    pub base: String,

    /// Whether to create as draft.
    pub draft: bool,
}

/// Request to create a git reference.
#[derive(Debug, Serialize)]
pub(crate) struct CreateRef<'a> {
    /// Fully qualified ref, e.g. `refs/heads/update-20240101000000`.
    #[serde(rename = "ref")]
    pub ref_name: String,

    /// Commit the ref points at.
    pub sha: &'a str,
}

/// Body of a create-or-update file call on the contents API.
#[derive(Debug, Serialize)]
pub(crate) struct PutContent<'a> {
    /// Commit message.
    pub message: String,

    /// Base64 encoded file body.
    pub content: String,

    /// Target branch.
    pub branch: &'a str,

    /// Blob SHA being replaced. Absent for creates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha: Option<&'a str>,
}
