//! Validated repository-relative file paths.

use std::fmt;

use crate::error::Error;

/// A path inside the target repository, relative to its root, using `/`
/// separators.
///
/// Only letters, digits, `_`, `-`, `.`, `/` and space are accepted. Paths
/// that are absolute, contain `.` or `..` segments, contain empty segments,
/// or point into `.git/` are rejected.
///
/// ```
/// use prsync_core::RepoPath;
///
/// assert_eq!(RepoPath::new("docs\\guide.md").unwrap().as_str(), "docs/guide.md");
/// assert!(RepoPath::new("../escape.c").is_err());
/// assert!(RepoPath::new(".git/config").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RepoPath(String);

impl RepoPath {
    /// Normalise backslashes to `/` and validate.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPath`] when the path fails the allow-list.
    pub fn new(path: impl AsRef<str>) -> Result<Self, Error> {
        let raw = path.as_ref();
        let normalized = raw.replace('\\', "/");
        match check(&normalized) {
            Some(reason) => Err(Error::InvalidPath {
                path: raw.to_string(),
                reason: reason.to_string(),
            }),
            None => Ok(Self(normalized)),
        }
    }

    /// The path as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for RepoPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RepoPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn check(path: &str) -> Option<&'static str> {
    if path.is_empty() {
        return Some("path is empty");
    }
    if path.starts_with('/') {
        return Some("path must be relative");
    }
    if let Some(c) = path
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | ' ')))
    {
        return Some(if c.is_ascii_control() {
            "path contains a control character"
        } else {
            "path contains a character outside [A-Za-z0-9_-./ ]"
        });
    }
    for segment in path.split('/') {
        match segment {
            "" => return Some("path contains an empty segment"),
            "." | ".." => return Some("path contains a '.' or '..' segment"),
            _ => {}
        }
    }
    if path == ".git" || path.starts_with(".git/") {
        return Some("path targets the .git directory");
    }
    None
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_plain_paths() {
        for path in ["a.c", "sub/b.h", "docs/my notes.md", "src/lib_v2-final.rs", ".github/x.yml"] {
            assert_eq!(RepoPath::new(path).unwrap().as_str(), path);
        }
    }

    #[test]
    fn test_normalizes_backslashes() {
        let path = RepoPath::new("sub\\dir\\b.h").unwrap();
        assert_eq!(path.as_str(), "sub/dir/b.h");
    }

    #[test]
    fn test_rejects_traversal_and_absolute() {
        for path in ["../esc.c", "a/../../b", "a/./b", "/etc/passwd", "..\\esc.c"] {
            let err = RepoPath::new(path).unwrap_err();
            assert!(matches!(err, Error::InvalidPath { .. }), "path: {path}");
        }
    }

    #[test]
    fn test_rejects_shape_errors() {
        for path in ["", "a//b", "dir/", ".git/config", ".git"] {
            assert!(RepoPath::new(path).is_err(), "path: {path:?}");
        }
    }

    #[test]
    fn test_rejects_disallowed_characters() {
        for path in ["a;b.c", "$(id).sh", "naïve.txt", "tab\there", "q?.md", "a:b"] {
            let err = RepoPath::new(path).unwrap_err();
            assert_eq!(err.kind(), crate::ErrorKind::PathInvalid, "path: {path:?}");
        }
    }

    #[test]
    fn test_error_reports_original_path() {
        let err = RepoPath::new("..\\esc.c").unwrap_err();
        assert!(err.to_string().contains("..\\esc.c"));
    }
}
