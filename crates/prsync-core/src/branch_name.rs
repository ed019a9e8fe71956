//! Working branch names.
//!
//! Every run writes to a fresh branch named `update-<UTC timestamp>`. The
//! [`BranchName`] newtype is only built from a run's start time, so every
//! name it holds is a valid ref.

use std::fmt;

use chrono::{DateTime, Utc};

/// Prefix of every working branch.
pub const UPDATE_PREFIX: &str = "update-";

const UPDATE_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// A working branch name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BranchName(String);

impl BranchName {
    /// Working branch name for a run started at `now`.
    ///
    /// Second resolution: two runs for the same repository within one second
    /// get the same name, and the second one fails to create its branch.
    #[must_use]
    pub fn for_update(now: DateTime<Utc>) -> Self {
        Self(format!(
            "{UPDATE_PREFIX}{}",
            now.format(UPDATE_TIMESTAMP_FORMAT)
        ))
    }

    /// Consume the `BranchName` and return the inner `String`.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl AsRef<str> for BranchName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::ops::Deref for BranchName {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<&str> for BranchName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}
