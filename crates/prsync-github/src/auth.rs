//! GitHub App authentication.
//!
//! An [`AppCredential`] signs a short-lived RS256 assertion, which
//! [`GitHubAppBroker`] trades for an installation token scoped to a single
//! repository:
//!
//! ```text
//! AppCredential --sign--> assertion
//!     GET  /repos/{owner}/{repo}/installation          -> installation id
//!     POST /app/installations/{id}/access_tokens       -> InstallationToken
//! ```
//!
//! # Security
//!
//! The private key, the assertion and the installation token are all held
//! in `SecretString`, which zeroizes on drop, and none of them ever reach a
//! `Debug` impl or a log line.

use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;
use crate::traits::CredentialBroker;

/// Validity window of a signed assertion. GitHub rejects anything longer.
pub const ASSERTION_TTL_SECS: i64 = 10 * 60;

/// Long-lived App identity.
pub struct AppCredential {
    app_id: String,
    private_key: SecretString,
}

impl AppCredential {
    /// Create a credential from an App id and its PEM encoded private key.
    ///
    /// # Errors
    /// Returns error if either value is empty.
    pub fn new(app_id: impl Into<String>, private_key: SecretString) -> Result<Self, AuthError> {
        let app_id = app_id.into();
        if app_id.trim().is_empty() {
            return Err(AuthError::unauthorized("GitHub App id must not be empty"));
        }
        if private_key.expose_secret().trim().is_empty() {
            return Err(AuthError::unauthorized(
                "GitHub App private key must not be empty",
            ));
        }
        Ok(Self {
            app_id,
            private_key,
        })
    }

    /// The App id used as assertion issuer.
    #[must_use]
    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    /// Sign an assertion valid from `now` for [`ASSERTION_TTL_SECS`].
    ///
    /// # Errors
    /// Returns an unauthorized error if the key is not a valid RSA PEM.
    pub fn sign(&self, now: DateTime<Utc>) -> Result<SignedAssertion, AuthError> {
        #[derive(Debug, Serialize)]
        struct Claims<'a> {
            iat: i64,
            exp: i64,
            iss: &'a str,
        }

        let issued_at = now.timestamp();
        let expires_at = issued_at + ASSERTION_TTL_SECS;
        let claims = Claims {
            iat: issued_at,
            exp: expires_at,
            iss: &self.app_id,
        };

        let key = EncodingKey::from_rsa_pem(self.private_key.expose_secret().as_bytes())
            .map_err(|e| AuthError::unauthorized(format!("invalid GitHub App private key: {e}")))?;
        let token = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| AuthError::unauthorized(format!("failed to sign App assertion: {e}")))?;

        Ok(SignedAssertion {
            token: SecretString::from(token),
            issued_at,
            expires_at,
        })
    }
}

impl std::fmt::Debug for AppCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppCredential")
            .field("app_id", &self.app_id)
            .field("private_key", &"[redacted]")
            .finish()
    }
}

/// A time-boxed, privately signed claim set proving App identity.
#[derive(Debug)]
pub struct SignedAssertion {
    token: SecretString,
    /// Unix seconds.
    pub issued_at: i64,
    /// Unix seconds.
    pub expires_at: i64,
}

impl SignedAssertion {
    fn bearer(&self) -> String {
        format!("Bearer {}", self.token.expose_secret())
    }
}

/// Short-lived bearer credential scoped to one installation.
pub struct InstallationToken {
    token: SecretString,
    expires_at: DateTime<Utc>,
    installation_id: u64,
}

impl InstallationToken {
    /// Wrap an already issued token.
    #[must_use]
    pub const fn new(token: SecretString, expires_at: DateTime<Utc>, installation_id: u64) -> Self {
        Self {
            token,
            expires_at,
            installation_id,
        }
    }

    /// The bearer token.
    #[must_use]
    pub const fn secret(&self) -> &SecretString {
        &self.token
    }

    /// When GitHub stops accepting the token.
    #[must_use]
    pub const fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Installation the token belongs to.
    #[must_use]
    pub const fn installation_id(&self) -> u64 {
        self.installation_id
    }

    /// Whether the token is no longer usable at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

impl std::fmt::Debug for InstallationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallationToken")
            .field("token", &"[redacted]")
            .field("expires_at", &self.expires_at)
            .field("installation_id", &self.installation_id)
            .finish()
    }
}

/// Production [`CredentialBroker`] talking to the GitHub App endpoints.
pub struct GitHubAppBroker {
    credential: AppCredential,
    client: Client,
    base_url: String,
}

impl GitHubAppBroker {
    /// Create a broker with a custom API URL (for GitHub Enterprise).
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn with_base_url(
        credential: AppCredential,
        base_url: impl Into<String>,
    ) -> Result<Self, AuthError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static("prsync"));
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(15))
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| AuthError::transient(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            credential,
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Look up the installation bound to `owner/repo`.
    async fn installation_id(
        &self,
        assertion: &SignedAssertion,
        owner: &str,
        repo: &str,
    ) -> Result<u64, AuthError> {
        #[derive(Deserialize)]
        struct Installation {
            id: u64,
        }

        let url = format!("{}/repos/{owner}/{repo}/installation", self.base_url);
        let response = self
            .client
            .get(&url)
            .header(AUTHORIZATION, assertion.bearer())
            .send()
            .await
            .map_err(|e| AuthError::transient(format!("installation lookup failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify(status, &text, owner, repo));
        }

        let installation: Installation = response.json().await.map_err(|e| {
            AuthError::transient(format!("failed to parse installation response: {e}"))
        })?;
        Ok(installation.id)
    }

    /// Trade the assertion for an installation access token.
    async fn exchange(
        &self,
        assertion: &SignedAssertion,
        installation_id: u64,
        owner: &str,
        repo: &str,
    ) -> Result<InstallationToken, AuthError> {
        #[derive(Deserialize)]
        struct AccessToken {
            token: String,
            expires_at: DateTime<Utc>,
        }

        let url = format!(
            "{}/app/installations/{installation_id}/access_tokens",
            self.base_url
        );
        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, assertion.bearer())
            .send()
            .await
            .map_err(|e| AuthError::transient(format!("token exchange failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify(status, &text, owner, repo));
        }

        let payload: AccessToken = response
            .json()
            .await
            .map_err(|e| AuthError::transient(format!("failed to parse token response: {e}")))?;

        Ok(InstallationToken::new(
            SecretString::from(payload.token),
            payload.expires_at,
            installation_id,
        ))
    }
}

impl std::fmt::Debug for GitHubAppBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubAppBroker")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl CredentialBroker for GitHubAppBroker {
    async fn acquire_token(&self, owner: &str, repo: &str) -> Result<InstallationToken, AuthError> {
        let assertion = self.credential.sign(Utc::now())?;
        tracing::debug!(
            app_id = %self.credential.app_id(),
            expires_at = assertion.expires_at,
            "signed App assertion"
        );

        let installation_id = self.installation_id(&assertion, owner, repo).await?;
        tracing::debug!(installation_id, %owner, %repo, "resolved App installation");

        let token = self
            .exchange(&assertion, installation_id, owner, repo)
            .await?;
        tracing::info!(
            installation_id,
            expires_at = %token.expires_at(),
            "installation token acquired"
        );
        Ok(token)
    }
}

/// Map a non-success status from the App endpoints to an [`AuthError`].
fn classify(status: StatusCode, body: &str, owner: &str, repo: &str) -> AuthError {
    match status {
        StatusCode::UNAUTHORIZED => {
            AuthError::unauthorized(format!("GitHub rejected the App assertion: {body}"))
        }
        StatusCode::NOT_FOUND => AuthError::not_installed(owner, repo),
        _ => AuthError::transient(format!(
            "unexpected response from GitHub ({}): {body}",
            status.as_u16()
        )),
    }
}
