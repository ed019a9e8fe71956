//! In-memory fakes for orchestrator tests.
//!
//! These implement the traits from prsync-github against a shared
//! [`RemoteState`] so tests can inspect what the orchestrator did.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use prsync_github::{
    AuthError, CreatePullRequest, CredentialBroker, Error as GitHubError, GatewayConnector,
    InstallationToken, PullRequest, RepositoryGateway, RepositoryRef, Result as GitHubResult,
    SecretString,
};

/// A remote call observed by the fake gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ResolveRepository,
    BranchHead(String),
    CreateBranch(String),
    DeleteBranch(String),
    GetFileSha { branch: String, path: String },
    PutFile {
        branch: String,
        path: String,
        prior_sha: Option<String>,
    },
    OpenPullRequest { head: String, base: String, title: String },
}

/// A blob on a branch.
#[derive(Debug, Clone)]
pub struct Blob {
    pub sha: String,
    pub content: Vec<u8>,
}

/// Everything the fake remote knows.
#[derive(Debug)]
pub struct RemoteState {
    pub owner: String,
    pub name: String,
    pub default_branch: String,
    pub repo_exists: bool,
    pub heads: HashMap<String, String>,
    pub files: HashMap<String, BTreeMap<String, Blob>>,
    pub calls: Vec<Call>,
    pub fail_put_at: Option<usize>,
    pub put_delay: Option<Duration>,
    puts: usize,
    next_sha: u64,
}

impl RemoteState {
    fn sha(&mut self, kind: &str) -> String {
        self.next_sha += 1;
        format!("{kind}-{}", self.next_sha)
    }
}

/// Handle onto a shared fake remote.
#[derive(Debug, Clone)]
pub struct FakeRemote {
    state: Arc<Mutex<RemoteState>>,
}

impl Default for FakeRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeRemote {
    /// Repository `octo/docs` with an empty `main`.
    pub fn new() -> Self {
        let state = RemoteState {
            owner: "octo".into(),
            name: "docs".into(),
            default_branch: "main".into(),
            repo_exists: true,
            heads: HashMap::from([("main".to_string(), "commit-0".to_string())]),
            files: HashMap::from([("main".to_string(), BTreeMap::new())]),
            calls: Vec::new(),
            fail_put_at: None,
            put_delay: None,
            puts: 0,
            next_sha: 0,
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    #[allow(clippy::unwrap_used)]
    pub fn lock(&self) -> MutexGuard<'_, RemoteState> {
        self.state.lock().unwrap()
    }

    pub fn with_file(self, branch: &str, path: &str, content: &[u8]) -> Self {
        {
            let mut state = self.lock();
            let sha = state.sha("blob");
            state.files.entry(branch.to_string()).or_default().insert(
                path.to_string(),
                Blob {
                    sha,
                    content: content.to_vec(),
                },
            );
        }
        self
    }

    pub fn with_branch(self, name: &str) -> Self {
        {
            let mut state = self.lock();
            let head = state.heads.get("main").cloned().unwrap_or_default();
            state.heads.insert(name.to_string(), head);
            state.files.entry(name.to_string()).or_default();
        }
        self
    }

    pub fn without_repository(self) -> Self {
        self.lock().repo_exists = false;
        self
    }

    pub fn failing_put_at(self, index: usize) -> Self {
        self.lock().fail_put_at = Some(index);
        self
    }

    pub fn with_put_delay(self, delay: Duration) -> Self {
        self.lock().put_delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn put_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::PutFile { .. }))
            .collect()
    }

    pub fn has_branch(&self, name: &str) -> bool {
        self.lock().heads.contains_key(name)
    }

    pub fn blob(&self, branch: &str, path: &str) -> Option<Blob> {
        self.lock().files.get(branch)?.get(path).cloned()
    }

    /// Fast-forward `main` to `branch`, as if its pull request was merged.
    pub fn merge_into_default(&self, branch: &str) {
        let mut state = self.lock();
        let files = state.files.get(branch).cloned().unwrap_or_default();
        let head = state.heads.get(branch).cloned().unwrap_or_default();
        state.files.insert("main".into(), files);
        state.heads.insert("main".into(), head);
    }

    fn repo(state: &RemoteState) -> RepositoryRef {
        RepositoryRef {
            owner: state.owner.clone(),
            name: state.name.clone(),
            default_branch: state.default_branch.clone(),
        }
    }
}

impl RepositoryGateway for FakeRemote {
    async fn resolve_repository(&self, owner: &str, name: &str) -> GitHubResult<RepositoryRef> {
        let mut state = self.lock();
        state.calls.push(Call::ResolveRepository);
        if !state.repo_exists || owner != state.owner || name != state.name {
            return Err(GitHubError::RepoNotFound(format!("{owner}/{name}")));
        }
        Ok(Self::repo(&state))
    }

    async fn branch_head(&self, _repo: &RepositoryRef, branch: &str) -> GitHubResult<String> {
        let mut state = self.lock();
        state.calls.push(Call::BranchHead(branch.to_string()));
        state
            .heads
            .get(branch)
            .cloned()
            .ok_or_else(|| GitHubError::NotFound(format!("branch {branch}")))
    }

    async fn create_branch(
        &self,
        _repo: &RepositoryRef,
        name: &str,
        base_sha: &str,
    ) -> GitHubResult<()> {
        let mut state = self.lock();
        state.calls.push(Call::CreateBranch(name.to_string()));
        if state.heads.contains_key(name) {
            return Err(GitHubError::Conflict {
                target: name.to_string(),
                message: "Reference already exists".into(),
            });
        }
        let source = state
            .heads
            .iter()
            .find(|(_, head)| head.as_str() == base_sha)
            .map(|(branch, _)| branch.clone())
            .ok_or_else(|| GitHubError::NotFound(format!("commit {base_sha}")))?;
        let files = state.files.get(&source).cloned().unwrap_or_default();
        state.files.insert(name.to_string(), files);
        state.heads.insert(name.to_string(), base_sha.to_string());
        Ok(())
    }

    async fn delete_branch(&self, _repo: &RepositoryRef, name: &str) -> GitHubResult<()> {
        let mut state = self.lock();
        state.calls.push(Call::DeleteBranch(name.to_string()));
        state.heads.remove(name);
        state.files.remove(name);
        Ok(())
    }

    async fn get_file_sha(
        &self,
        _repo: &RepositoryRef,
        branch: &str,
        path: &str,
    ) -> GitHubResult<Option<String>> {
        let mut state = self.lock();
        state.calls.push(Call::GetFileSha {
            branch: branch.to_string(),
            path: path.to_string(),
        });
        Ok(state
            .files
            .get(branch)
            .and_then(|files| files.get(path))
            .map(|blob| blob.sha.clone()))
    }

    async fn get_file_content(
        &self,
        _repo: &RepositoryRef,
        branch: &str,
        path: &str,
    ) -> GitHubResult<Option<Vec<u8>>> {
        Ok(self.blob(branch, path).map(|blob| blob.content))
    }

    async fn put_file(
        &self,
        _repo: &RepositoryRef,
        branch: &str,
        path: &str,
        content: &[u8],
        prior_sha: Option<&str>,
    ) -> GitHubResult<String> {
        let delay = self.lock().put_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.lock();
        state.calls.push(Call::PutFile {
            branch: branch.to_string(),
            path: path.to_string(),
            prior_sha: prior_sha.map(ToString::to_string),
        });
        let index = state.puts;
        state.puts += 1;
        if state.fail_put_at == Some(index) {
            return Err(GitHubError::Conflict {
                target: path.to_string(),
                message: "does not match".into(),
            });
        }

        let current = state
            .files
            .get(branch)
            .and_then(|files| files.get(path))
            .map(|blob| blob.sha.clone());
        if current.as_deref() != prior_sha {
            return Err(GitHubError::Conflict {
                target: path.to_string(),
                message: format!("expected {prior_sha:?}, found {current:?}"),
            });
        }

        let sha = state.sha("blob");
        let commit = state.sha("commit");
        state.files.entry(branch.to_string()).or_default().insert(
            path.to_string(),
            Blob {
                sha: sha.clone(),
                content: content.to_vec(),
            },
        );
        state.heads.insert(branch.to_string(), commit);
        Ok(sha)
    }

    async fn open_pull_request(
        &self,
        _repo: &RepositoryRef,
        pr: CreatePullRequest,
    ) -> GitHubResult<PullRequest> {
        let mut state = self.lock();
        state.calls.push(Call::OpenPullRequest {
            head: pr.head.clone(),
            base: pr.base.clone(),
            title: pr.title.clone(),
        });
        let number = state.calls.len() as u64;
        Ok(PullRequest {
            number,
            html_url: format!(
                "https://github.com/{}/{}/pull/{number}",
                state.owner, state.name
            ),
            title: pr.title,
            head_branch: pr.head,
            base_branch: pr.base,
        })
    }
}

/// Connector handing out clones of one [`FakeRemote`].
pub struct FakeConnector {
    pub remote: FakeRemote,
    pub connects: AtomicUsize,
}

impl FakeConnector {
    pub fn new(remote: FakeRemote) -> Self {
        Self {
            remote,
            connects: AtomicUsize::new(0),
        }
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl GatewayConnector for FakeConnector {
    type Gateway = FakeRemote;

    fn connect(&self, _token: &InstallationToken) -> GitHubResult<FakeRemote> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(self.remote.clone())
    }
}

/// Broker replaying scripted results, then succeeding.
#[derive(Default)]
pub struct FakeBroker {
    script: Mutex<VecDeque<AuthError>>,
    pub calls: AtomicUsize,
}

impl FakeBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next attempts with `errors`, in order.
    #[allow(clippy::unwrap_used)]
    pub fn failing_with(errors: impl IntoIterator<Item = AuthError>) -> Self {
        let broker = Self::new();
        broker.script.lock().unwrap().extend(errors);
        broker
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CredentialBroker for FakeBroker {
    #[allow(clippy::unwrap_used)]
    async fn acquire_token(&self, _owner: &str, _repo: &str) -> Result<InstallationToken, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.script.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(InstallationToken::new(
            SecretString::from("ghs_fake_installation_token"),
            Utc::now() + chrono::Duration::hours(1),
            7,
        ))
    }
}
