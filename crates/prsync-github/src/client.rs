//! GitHub API client.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;

use crate::auth::InstallationToken;
use crate::error::{Error, Result};
use crate::traits::{GatewayConnector, RepositoryGateway};
use crate::types::{CreatePullRequest, CreateRef, PullRequest, PutContent, RepositoryRef};

// === Internal API response types ===

/// Internal representation of a repository from the GitHub API.
#[derive(serde::Deserialize)]
struct ApiRepository {
    name: String,
    owner: ApiOwner,
    default_branch: String,
}

#[derive(serde::Deserialize)]
struct ApiOwner {
    login: String,
}

/// Internal representation of a PR from the GitHub API.
#[derive(serde::Deserialize)]
struct ApiPullRequest {
    number: u64,
    title: String,
    html_url: String,
    head: ApiBranch,
    base: ApiBranch,
}

/// Internal representation of a branch ref from the GitHub API.
#[derive(serde::Deserialize)]
struct ApiBranch {
    #[serde(rename = "ref")]
    ref_name: String,
}

impl ApiPullRequest {
    fn into_pull_request(self) -> PullRequest {
        PullRequest {
            number: self.number,
            title: self.title,
            head_branch: self.head.ref_name,
            base_branch: self.base.ref_name,
            html_url: self.html_url,
        }
    }
}

/// A git ref as returned by `/git/ref/...`.
#[derive(serde::Deserialize)]
struct ApiRef {
    object: ApiObject,
}

#[derive(serde::Deserialize)]
struct ApiObject {
    sha: String,
}

/// The contents API returns an object for files and an array for directories.
#[derive(serde::Deserialize)]
#[serde(untagged)]
enum ApiContents {
    File { sha: String },
    Directory(serde::de::IgnoredAny),
}

/// Response body of a create-or-update file call.
#[derive(serde::Deserialize)]
struct ApiPutContent {
    content: ApiObject,
}

/// GitHub API client bound to one bearer token.
pub struct GitHubClient {
    client: Client,
    base_url: String,
    /// Token stored as `SecretString` for automatic zeroization on drop.
    token: SecretString,
}

impl GitHubClient {
    /// Default GitHub API URL.
    pub const DEFAULT_API_URL: &'static str = "https://api.github.com";

    /// Create a GitHub client against `base_url` (the public API or a GitHub
    /// Enterprise server).
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn with_base_url(token: SecretString, base_url: impl Into<String>) -> Result<Self> {
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

        let client = Client::builder().default_headers(headers).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header(
            AUTHORIZATION,
            format!("Bearer {}", self.token.expose_secret()),
        )
    }

    /// Make a GET request.
    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.authorized(self.client.get(&url)).send().await?;

        self.handle_response(response).await
    }

    /// Make a POST request, returning the raw response for custom status handling.
    async fn post_raw<B: serde::Serialize + Sync>(&self, path: &str, body: &B) -> Result<Response> {
        let url = format!("{}{}", self.base_url, path);
        Ok(self
            .authorized(self.client.post(&url))
            .json(body)
            .send()
            .await?)
    }

    /// Make a POST request.
    async fn post<T: DeserializeOwned, B: serde::Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let response = self.post_raw(path, body).await?;
        self.handle_response(response).await
    }

    /// Make a DELETE request.
    async fn delete(&self, path: &str) -> Result<()> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.authorized(self.client.delete(&url)).send().await?;

        if response.status().is_success() {
            return Ok(());
        }
        Err(error_from(response).await)
    }

    /// Handle API response.
    async fn handle_response<T: DeserializeOwned>(&self, response: Response) -> Result<T> {
        if response.status().is_success() {
            let body = response.json().await?;
            return Ok(body);
        }

        Err(error_from(response).await)
    }

    /// URL of `path` under the contents API, with every segment escaped.
    fn contents_url(&self, repo: &RepositoryRef, path: &str) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| Error::InvalidRequest(format!("bad API URL {}: {e}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|()| Error::InvalidRequest(format!("bad API URL {}", self.base_url)))?
            .pop_if_empty()
            .extend(["repos", repo.owner.as_str(), repo.name.as_str(), "contents"])
            .extend(path.split('/'));
        Ok(url)
    }

    // === Repository Operations ===

    /// Resolve a repository and its default branch.
    ///
    /// # Errors
    /// Returns [`Error::RepoNotFound`] if the repository is absent or the
    /// token cannot see it.
    pub async fn resolve_repository(&self, owner: &str, name: &str) -> Result<RepositoryRef> {
        let info: ApiRepository = self
            .get(&format!("/repos/{owner}/{name}"))
            .await
            .map_err(|e| match e {
                Error::ApiError { status: 404, .. } => Error::RepoNotFound(format!("{owner}/{name}")),
                other => other,
            })?;

        Ok(RepositoryRef {
            owner: info.owner.login,
            name: info.name,
            default_branch: info.default_branch,
        })
    }

    // === Ref Operations ===

    /// Commit SHA at the tip of a branch.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] if the branch does not exist.
    pub async fn branch_head(&self, repo: &RepositoryRef, branch: &str) -> Result<String> {
        let git_ref: ApiRef = self
            .get(&format!(
                "/repos/{}/{}/git/ref/heads/{branch}",
                repo.owner, repo.name
            ))
            .await
            .map_err(|e| match e {
                Error::ApiError { status: 404, .. } => Error::NotFound(format!("branch {branch}")),
                other => other,
            })?;

        Ok(git_ref.object.sha)
    }

    /// Create a branch pointing at `base_sha`.
    ///
    /// # Errors
    /// Returns [`Error::Conflict`] if the branch already exists.
    pub async fn create_branch(&self, repo: &RepositoryRef, name: &str, base_sha: &str) -> Result<()> {
        let body = CreateRef {
            ref_name: format!("refs/heads/{name}"),
            sha: base_sha,
        };
        let response = self
            .post_raw(&format!("/repos/{}/{}/git/refs", repo.owner, repo.name), &body)
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        if status == StatusCode::UNPROCESSABLE_ENTITY {
            let text = response.text().await.unwrap_or_default();
            if text.contains("already exists") {
                return Err(Error::Conflict {
                    target: body.ref_name,
                    message: "branch already exists".to_string(),
                });
            }
            return Err(Error::ApiError {
                status: status.as_u16(),
                message: text,
            });
        }
        Err(error_from(response).await)
    }

    /// Delete a branch.
    ///
    /// # Errors
    /// Returns error if deletion fails.
    pub async fn delete_branch(&self, repo: &RepositoryRef, name: &str) -> Result<()> {
        self.delete(&format!(
            "/repos/{}/{}/git/refs/heads/{name}",
            repo.owner, repo.name
        ))
        .await
    }

    // === Content Operations ===

    /// Blob SHA of a file on a branch.
    ///
    /// # Errors
    /// Returns error if the lookup fails for any reason other than absence,
    /// or if `path` names a directory.
    pub async fn get_file_sha(
        &self,
        repo: &RepositoryRef,
        branch: &str,
        path: &str,
    ) -> Result<Option<String>> {
        let url = self.contents_url(repo, path)?;
        let response = self
            .authorized(self.client.get(url).query(&[("ref", branch)]))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        match self.handle_response::<ApiContents>(response).await? {
            ApiContents::File { sha } => Ok(Some(sha)),
            ApiContents::Directory(_) => Err(Error::Conflict {
                target: path.to_string(),
                message: "path is a directory on the branch".to_string(),
            }),
        }
    }

    /// Raw bytes of a file on a branch.
    ///
    /// Uses the raw media type so files above the contents API's inline size
    /// limit come back intact.
    ///
    /// # Errors
    /// Returns error if the lookup fails for any reason other than absence.
    pub async fn get_file_content(
        &self,
        repo: &RepositoryRef,
        branch: &str,
        path: &str,
    ) -> Result<Option<Vec<u8>>> {
        let url = self.contents_url(repo, path)?;
        let response = self
            .authorized(
                self.client
                    .get(url)
                    .query(&[("ref", branch)])
                    .header(ACCEPT, "application/vnd.github.raw+json"),
            )
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(error_from(response).await);
        }

        Ok(Some(response.bytes().await?.to_vec()))
    }

    /// Create or update a file on a branch, returning the new blob SHA.
    ///
    /// # Errors
    /// Returns [`Error::Conflict`] if `prior_sha` no longer matches the
    /// branch, or if a create targets a path that already exists.
    pub async fn put_file(
        &self,
        repo: &RepositoryRef,
        branch: &str,
        path: &str,
        content: &[u8],
        prior_sha: Option<&str>,
    ) -> Result<String> {
        let message = match prior_sha {
            Some(_) => format!("Update {path}"),
            None => format!("Add {path}"),
        };
        let body = PutContent {
            message,
            content: STANDARD.encode(content),
            branch,
            sha: prior_sha,
        };

        let url = self.contents_url(repo, path)?;
        let response = self
            .authorized(self.client.put(url))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let written: ApiPutContent = response.json().await?;
            return Ok(written.content.sha);
        }

        match status {
            StatusCode::CONFLICT => {
                let text = response.text().await.unwrap_or_default();
                Err(Error::Conflict {
                    target: path.to_string(),
                    message: text,
                })
            }
            // GitHub answers a create onto an existing file with 422 and a
            // complaint about the missing `sha`.
            StatusCode::UNPROCESSABLE_ENTITY => {
                let text = response.text().await.unwrap_or_default();
                if text.contains("sha") {
                    Err(Error::Conflict {
                        target: path.to_string(),
                        message: text,
                    })
                } else {
                    Err(Error::ApiError {
                        status: status.as_u16(),
                        message: text,
                    })
                }
            }
            _ => Err(error_from(response).await),
        }
    }

    // === PR Operations ===

    /// Create a pull request.
    ///
    /// # Errors
    /// Returns error if PR creation fails.
    pub async fn open_pull_request(
        &self,
        repo: &RepositoryRef,
        pr: CreatePullRequest,
    ) -> Result<PullRequest> {
        let api_pr: ApiPullRequest = self
            .post(&format!("/repos/{}/{}/pulls", repo.owner, repo.name), &pr)
            .await?;

        Ok(api_pr.into_pull_request())
    }
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("base_url", &self.base_url)
            .field("token", &"[redacted]")
            .finish_non_exhaustive()
    }
}

/// Turn a non-success response into an [`Error`].
async fn error_from(response: Response) -> Error {
    let status_code = response.status().as_u16();

    match status_code {
        401 => Error::AuthenticationFailed,
        403 if response
            .headers()
            .get("x-ratelimit-remaining")
            .is_some_and(|v| v == "0") =>
        {
            Error::RateLimited
        }
        _ => {
            let text = response.text().await.unwrap_or_default();
            Error::ApiError {
                status: status_code,
                message: text,
            }
        }
    }
}

// === Trait Implementation ===

impl RepositoryGateway for GitHubClient {
    async fn resolve_repository(&self, owner: &str, name: &str) -> Result<RepositoryRef> {
        self.resolve_repository(owner, name).await
    }

    async fn branch_head(&self, repo: &RepositoryRef, branch: &str) -> Result<String> {
        self.branch_head(repo, branch).await
    }

    async fn create_branch(&self, repo: &RepositoryRef, name: &str, base_sha: &str) -> Result<()> {
        self.create_branch(repo, name, base_sha).await
    }

    async fn delete_branch(&self, repo: &RepositoryRef, name: &str) -> Result<()> {
        self.delete_branch(repo, name).await
    }

    async fn get_file_sha(
        &self,
        repo: &RepositoryRef,
        branch: &str,
        path: &str,
    ) -> Result<Option<String>> {
        self.get_file_sha(repo, branch, path).await
    }

    async fn get_file_content(
        &self,
        repo: &RepositoryRef,
        branch: &str,
        path: &str,
    ) -> Result<Option<Vec<u8>>> {
        self.get_file_content(repo, branch, path).await
    }

    async fn put_file(
        &self,
        repo: &RepositoryRef,
        branch: &str,
        path: &str,
        content: &[u8],
        prior_sha: Option<&str>,
    ) -> Result<String> {
        self.put_file(repo, branch, path, content, prior_sha).await
    }

    async fn open_pull_request(
        &self,
        repo: &RepositoryRef,
        pr: CreatePullRequest,
    ) -> Result<PullRequest> {
        self.open_pull_request(repo, pr).await
    }
}

/// Connects [`GitHubClient`]s for freshly minted installation tokens.
#[derive(Debug, Clone)]
pub struct GitHubConnector {
    base_url: String,
}

impl GitHubConnector {
    /// Connector for the given API base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

impl GatewayConnector for GitHubConnector {
    type Gateway = GitHubClient;

    fn connect(&self, token: &InstallationToken) -> Result<GitHubClient> {
        let token = SecretString::from(token.secret().expose_secret().to_owned());
        GitHubClient::with_base_url(token, self.base_url.clone())
    }
}
