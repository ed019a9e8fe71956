//! Error types for prsync-core.

use std::fmt;

use prsync_github::AuthErrorKind;
use serde::Serialize;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in prsync-core operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed or missing request input.
    #[error("{0}")]
    Validation(String),

    /// A snapshot path failed the repository path allow-list.
    #[error("invalid file path '{path}': {reason}")]
    InvalidPath {
        /// The rejected path.
        path: String,
        /// Why the path is invalid.
        reason: String,
    },

    /// Credential exchange failed.
    #[error("GitHub App authentication failed: {0}")]
    Auth(#[from] prsync_github::AuthError),

    /// GitHub API error.
    #[error("github error: {0}")]
    GitHub(#[from] prsync_github::Error),

    /// Content or secret store failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// The run deadline passed.
    #[error("run deadline exceeded")]
    Timeout,

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Directory walk error.
    #[error("failed to walk snapshot: {0}")]
    Walk(#[from] walkdir::Error),

    /// TOML parsing error.
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration is present but unusable.
    #[error("invalid config: {0}")]
    Config(String),
}

impl Error {
    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::Toml(_) | Self::Config(_) => ErrorKind::Validation,
            Self::InvalidPath { .. } => ErrorKind::PathInvalid,
            Self::Auth(e) => match e.kind {
                AuthErrorKind::Unauthorized => ErrorKind::Unauthorized,
                AuthErrorKind::NotInstalled => ErrorKind::NotInstalled,
                AuthErrorKind::Transient => ErrorKind::Transient,
            },
            Self::GitHub(e) => match e {
                prsync_github::Error::AuthenticationFailed => ErrorKind::Unauthorized,
                prsync_github::Error::RepoNotFound(_) | prsync_github::Error::NotFound(_) => {
                    ErrorKind::NotFound
                }
                prsync_github::Error::Conflict { .. } => ErrorKind::Conflict,
                e if e.is_transient() => ErrorKind::Transient,
                _ => ErrorKind::Api,
            },
            Self::Storage(_) | Self::Io(_) | Self::Walk(_) => ErrorKind::Storage,
            Self::Timeout => ErrorKind::Timeout,
        }
    }
}

/// Closed classification of failures, used by callers to decide whether to
/// retry a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed or missing request fields.
    Validation,
    /// App assertion or installation token rejected.
    Unauthorized,
    /// The App is not installed on the target repository.
    NotInstalled,
    /// Repository or ref absent.
    NotFound,
    /// Branch name collision or stale blob SHA.
    Conflict,
    /// Network trouble, rate limiting or a 5xx.
    Transient,
    /// Snapshot path rejected. Per file, never fatal to a run.
    PathInvalid,
    /// The caller's deadline passed.
    Timeout,
    /// Content store, secret store or local snapshot read failed.
    Storage,
    /// Any other remote rejection.
    Api,
}

impl ErrorKind {
    /// HTTP status reported at the service boundary.
    #[must_use]
    pub const fn http_status(self) -> u16 {
        match self {
            Self::Validation => 400,
            _ => 500,
        }
    }

    /// Stable snake_case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Unauthorized => "unauthorized",
            Self::NotInstalled => "not_installed",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Transient => "transient",
            Self::PathInvalid => "path_invalid",
            Self::Timeout => "timeout",
            Self::Storage => "storage",
            Self::Api => "api",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prsync_github::AuthError;

    #[test]
    fn test_auth_error_kinds() {
        let err = Error::from(AuthError::not_installed("o", "r"));
        assert_eq!(err.kind(), ErrorKind::NotInstalled);

        let err = Error::from(AuthError::unauthorized("bad key"));
        assert_eq!(err.kind(), ErrorKind::Unauthorized);

        let err = Error::from(AuthError::transient("reset"));
        assert_eq!(err.kind(), ErrorKind::Transient);
    }

    #[test]
    fn test_github_error_kinds() {
        let conflict = Error::from(prsync_github::Error::Conflict {
            target: "a.c".into(),
            message: "stale".into(),
        });
        assert_eq!(conflict.kind(), ErrorKind::Conflict);

        let missing = Error::from(prsync_github::Error::RepoNotFound("o/r".into()));
        assert_eq!(missing.kind(), ErrorKind::NotFound);

        let limited = Error::from(prsync_github::Error::RateLimited);
        assert_eq!(limited.kind(), ErrorKind::Transient);

        let rejected = Error::from(prsync_github::Error::ApiError {
            status: 422,
            message: "No commits between main and update-1".into(),
        });
        assert_eq!(rejected.kind(), ErrorKind::Api);
    }

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(ErrorKind::Validation.http_status(), 400);
        for kind in [
            ErrorKind::Unauthorized,
            ErrorKind::NotInstalled,
            ErrorKind::NotFound,
            ErrorKind::Conflict,
            ErrorKind::Transient,
            ErrorKind::Timeout,
            ErrorKind::Storage,
            ErrorKind::Api,
        ] {
            assert_eq!(kind.http_status(), 500, "kind: {kind}");
        }
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_kind_serialization() {
        assert_eq!(
            serde_json::to_string(&ErrorKind::NotInstalled).unwrap(),
            "\"not_installed\""
        );
        assert_eq!(ErrorKind::PathInvalid.to_string(), "path_invalid");
    }
}
