//! Error types for prsync-github.

use std::fmt;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during GitHub API operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The bearer token was rejected.
    #[error("GitHub authentication failed - the installation token was rejected")]
    AuthenticationFailed,

    /// API rate limit exceeded.
    #[error("GitHub API rate limit exceeded - wait and try again")]
    RateLimited,

    /// Repository not found or no access.
    #[error("repository not found or no access: {0}")]
    RepoNotFound(String),

    /// A ref or content path does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The remote state changed underneath us (ref exists, stale blob SHA).
    #[error("conflict on {target}: {message}")]
    Conflict { target: String, message: String },

    /// API error with status code.
    #[error("GitHub API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    /// Network error.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("failed to parse GitHub response: {0}")]
    Parse(#[from] serde_json::Error),

    /// A request URL could not be built.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl Error {
    /// Whether a retry of the same request could plausibly succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited | Self::Network(_) => true,
            Self::ApiError { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Classification of a credential exchange failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    /// The signed assertion was refused or could not be produced.
    Unauthorized,
    /// The App has no installation on the requested repository.
    NotInstalled,
    /// Anything else; worth a bounded retry.
    Transient,
}

impl fmt::Display for AuthErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthorized => f.write_str("unauthorized"),
            Self::NotInstalled => f.write_str("not installed"),
            Self::Transient => f.write_str("transient"),
        }
    }
}

/// Error returned by a [`CredentialBroker`](crate::CredentialBroker).
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct AuthError {
    /// What went wrong.
    pub kind: AuthErrorKind,
    /// Human readable detail. Never contains key or token material.
    pub message: String,
}

impl AuthError {
    /// Assertion rejected or unsigned.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            kind: AuthErrorKind::Unauthorized,
            message: message.into(),
        }
    }

    /// No installation for `owner/repo`.
    #[must_use]
    pub fn not_installed(owner: &str, repo: &str) -> Self {
        Self {
            kind: AuthErrorKind::NotInstalled,
            message: format!(
                "GitHub App is not installed on {owner}/{repo} - install the App on the repository and retry"
            ),
        }
    }

    /// Retryable failure.
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: AuthErrorKind::Transient,
            message: message.into(),
        }
    }
}
