//! HTTP entry point.
//!
//! `POST /` and `GET /` accept `storage_uri`, `repo_owner` and `repo_name`
//! from a JSON body, falling back to query parameters for any field the body
//! does not carry.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use prsync_core::{ErrorKind, StorageUri, SyncFailure, SyncRequest, SyncSuccess};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::pipeline::SyncRunner;

/// Request fields, from the body or the query string.
#[derive(Debug, Default, Deserialize)]
pub struct SyncParams {
    storage_uri: Option<String>,
    repo_owner: Option<String>,
    repo_name: Option<String>,
}

impl SyncParams {
    fn or(self, fallback: Self) -> Self {
        Self {
            storage_uri: self.storage_uri.or(fallback.storage_uri),
            repo_owner: self.repo_owner.or(fallback.repo_owner),
            repo_name: self.repo_name.or(fallback.repo_name),
        }
    }
}

/// Response body.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum SyncResponse {
    Success {
        pull_request_url: String,
        branch: String,
        files_applied: usize,
    },
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        kind: Option<ErrorKind>,
        #[serde(skip_serializing_if = "Option::is_none")]
        files_applied: Option<usize>,
    },
}

impl From<SyncSuccess> for SyncResponse {
    fn from(success: SyncSuccess) -> Self {
        Self::Success {
            pull_request_url: success.pull_request_url,
            branch: success.branch,
            files_applied: success.files_applied,
        }
    }
}

/// Errors returned to HTTP callers.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The request is missing or has malformed fields.
    #[error("{0}")]
    BadRequest(String),

    /// The run failed.
    #[error("{0}")]
    Sync(SyncFailure),
}

impl ServerError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Sync(failure) => StatusCode::from_u16(failure.kind.http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match self {
            Self::BadRequest(message) => SyncResponse::Error {
                message,
                kind: None,
                files_applied: None,
            },
            Self::Sync(failure) => SyncResponse::Error {
                message: failure.message,
                kind: Some(failure.kind),
                files_applied: Some(failure.files_applied),
            },
        };
        (status, Json(body)).into_response()
    }
}

/// Build the router over `runner`.
pub fn router<R: SyncRunner>(runner: Arc<R>) -> Router {
    Router::new()
        .route("/", get(handle::<R>).post(handle::<R>))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(runner)
}

/// Validate the request and run a sync.
///
/// An absent or unparseable body counts as empty.
pub async fn handle<R: SyncRunner>(
    State(runner): State<Arc<R>>,
    Query(query): Query<SyncParams>,
    body: Bytes,
) -> Response {
    match dispatch(runner.as_ref(), query, &body).await {
        Ok(success) => (StatusCode::OK, Json(SyncResponse::from(success))).into_response(),
        Err(err) => {
            warn!(status = %err.status_code(), error = %err, "request failed");
            err.into_response()
        }
    }
}

async fn dispatch<R: SyncRunner>(
    runner: &R,
    query: SyncParams,
    body: &[u8],
) -> Result<SyncSuccess, ServerError> {
    let from_body: SyncParams = serde_json::from_slice(body).unwrap_or_default();
    let params = from_body.or(query);

    let storage_uri = params
        .storage_uri
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ServerError::BadRequest("storage_uri parameter is required.".into()))?;
    let source =
        StorageUri::parse(&storage_uri).map_err(|e| ServerError::BadRequest(e.to_string()))?;
    let request = SyncRequest::new(
        params.repo_owner.unwrap_or_default(),
        params.repo_name.unwrap_or_default(),
    )
    .map_err(|e| ServerError::BadRequest(e.to_string()))?;

    info!(source = %source, owner = %request.owner, repo = %request.repo, "accepted sync request");
    runner.sync(source, request).await.map_err(ServerError::Sync)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use prsync_core::SyncState;
    use serde_json::Value;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeRunner {
        seen: Mutex<Vec<(StorageUri, SyncRequest)>>,
        failure: Option<SyncFailure>,
    }

    impl SyncRunner for FakeRunner {
        async fn sync(&self, source: StorageUri, request: SyncRequest) -> prsync_core::SyncResult {
            self.seen.lock().unwrap().push((source, request));
            match &self.failure {
                Some(failure) => Err(failure.clone()),
                None => Ok(SyncSuccess {
                    pull_request_url: "https://github.com/octo/docs/pull/1".into(),
                    branch: "update-20240506070809".into(),
                    files_applied: 2,
                    files_skipped: 0,
                }),
            }
        }
    }

    async fn call(runner: Arc<FakeRunner>, query: SyncParams, body: &str) -> (StatusCode, Value) {
        let response = handle(State(runner), Query(query), Bytes::from(body.to_string())).await;
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_success_response() {
        let runner = Arc::new(FakeRunner::default());
        let (status, body) = call(
            runner.clone(),
            SyncParams::default(),
            r#"{"storage_uri":"gs://b/snap","repo_owner":"octo","repo_name":"docs"}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(body["pull_request_url"], "https://github.com/octo/docs/pull/1");
        assert_eq!(body["files_applied"], 2);

        let seen = runner.seen.lock().unwrap();
        assert_eq!(
            seen[0].0,
            StorageUri::Gcs {
                bucket: "b".into(),
                prefix: "snap".into()
            }
        );
        assert_eq!(seen[0].1.owner, "octo");
    }

    #[tokio::test]
    async fn test_missing_owner_is_bad_request() {
        let runner = Arc::new(FakeRunner::default());
        let (status, body) = call(
            runner.clone(),
            SyncParams::default(),
            r#"{"storage_uri":"gs://b/snap","repo_name":"docs"}"#,
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "error");
        assert!(
            body["message"]
                .as_str()
                .unwrap()
                .contains("repo_owner and repo_name are required")
        );
        assert!(runner.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_storage_uri_is_bad_request() {
        let (status, body) = call(Arc::new(FakeRunner::default()), SyncParams::default(), "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "storage_uri parameter is required.");
    }

    #[tokio::test]
    async fn test_malformed_storage_uri_is_bad_request() {
        let (status, body) = call(
            Arc::new(FakeRunner::default()),
            SyncParams::default(),
            r#"{"storage_uri":"s3://b/snap","repo_owner":"o","repo_name":"r"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(
            body["message"]
                .as_str()
                .unwrap()
                .starts_with("Invalid storage_uri format")
        );
    }

    #[tokio::test]
    async fn test_query_parameters_fill_missing_body_fields() {
        let runner = Arc::new(FakeRunner::default());
        let query = SyncParams {
            storage_uri: Some("file:///srv/snap".into()),
            repo_owner: Some("ignored".into()),
            repo_name: Some("docs".into()),
        };
        let (status, _) = call(runner.clone(), query, r#"{"repo_owner":"octo"}"#).await;

        assert_eq!(status, StatusCode::OK);
        let seen = runner.seen.lock().unwrap();
        assert_eq!(seen[0].1.owner, "octo");
        assert_eq!(seen[0].1.repo, "docs");
    }

    #[tokio::test]
    async fn test_sync_failure_is_server_error() {
        let runner = Arc::new(FakeRunner {
            failure: Some(SyncFailure {
                kind: ErrorKind::NotInstalled,
                message: "GitHub App is not installed on octo/docs".into(),
                stage: SyncState::Init,
                files_applied: 0,
                branch: None,
            }),
            ..FakeRunner::default()
        });
        let (status, body) = call(
            runner,
            SyncParams::default(),
            r#"{"storage_uri":"gs://b/snap","repo_owner":"octo","repo_name":"docs"}"#,
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["status"], "error");
        assert_eq!(body["kind"], "not_installed");
        assert_eq!(body["files_applied"], 0);
    }

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            ServerError::BadRequest("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        let failure = SyncFailure::before_run(&prsync_core::Error::Validation("empty".into()));
        assert_eq!(
            ServerError::Sync(failure).status_code(),
            StatusCode::BAD_REQUEST
        );
        let failure = SyncFailure::before_run(&prsync_core::Error::Timeout);
        assert_eq!(
            ServerError::Sync(failure).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
