//! # prsync-github
//!
//! GitHub integration for prsync: GitHub App authentication (signed
//! assertion to installation token) and the repository gateway used to
//! create branches, write files and open pull requests.
//!
//! # Security
//!
//! Private keys and tokens are stored using `SecretString` which
//! automatically zeroizes memory when dropped, reducing credential exposure
//! in memory dumps.

mod auth;
mod client;
mod error;
mod traits;
mod types;

pub use auth::{
    ASSERTION_TTL_SECS, AppCredential, GitHubAppBroker, InstallationToken, SignedAssertion,
};
pub use client::{GitHubClient, GitHubConnector};
pub use error::{AuthError, AuthErrorKind, Error, Result};
pub use traits::{CredentialBroker, GatewayConnector, RepositoryGateway};
// Re-export SecretString for constructing credentials
pub use secrecy::SecretString;
pub use types::{CreatePullRequest, PullRequest, RepositoryRef};
