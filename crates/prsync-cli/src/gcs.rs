//! Google Cloud Storage over its JSON API.
//!
//! [`GcsStore`] is the [`SecretStore`] holding the App private key. A
//! [`GcsSession`] opened from it holds one access token and is the
//! [`ContentStore`] snapshots are materialised from.

use std::time::Duration;

use prsync_core::config::StorageConfig;
use prsync_core::storage::{ContentStore, LocalSecretStore, SecretStore, StorageUri};
use prsync_core::{Error, Result};
use reqwest::{Client, Response, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

/// Token endpoint of the GCE metadata server.
pub const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectList {
    #[serde(default)]
    items: Vec<ObjectItem>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectItem {
    name: String,
}

#[derive(Deserialize)]
struct MetadataToken {
    access_token: String,
}

/// GCS client.
pub struct GcsStore {
    client: Client,
    base_url: String,
    static_token: Option<SecretString>,
    metadata_url: String,
}

/// A [`GcsStore`] bound to one access token.
pub struct GcsSession<'a> {
    store: &'a GcsStore,
    token: SecretString,
}

fn storage_err(context: &str, e: impl std::fmt::Display) -> Error {
    Error::Storage(format!("{context}: {e}"))
}

impl GcsStore {
    /// Create a store from `[storage]` settings.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(config: &StorageConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent("prsync")
            .connect_timeout(Duration::from_secs(15))
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| storage_err("failed to build storage client", e))?;

        Ok(Self {
            client,
            base_url: config.gcs_api_url.trim_end_matches('/').to_string(),
            static_token: config
                .access_token
                .as_ref()
                .map(|t| SecretString::from(t.expose_secret().to_owned())),
            metadata_url: METADATA_TOKEN_URL.to_string(),
        })
    }

    /// Use a different metadata token endpoint.
    #[cfg(test)]
    #[must_use]
    pub fn with_metadata_url(mut self, url: impl Into<String>) -> Self {
        self.metadata_url = url.into();
        self
    }

    /// Open a session, fetching an access token from the metadata server
    /// unless one was configured.
    ///
    /// # Errors
    /// Returns a storage error if the metadata server cannot supply a token.
    pub async fn session(&self) -> Result<GcsSession<'_>> {
        Ok(GcsSession {
            store: self,
            token: self.access_token().await?,
        })
    }

    async fn access_token(&self) -> Result<SecretString> {
        if let Some(token) = &self.static_token {
            return Ok(SecretString::from(token.expose_secret().to_owned()));
        }

        let response = self
            .client
            .get(&self.metadata_url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| storage_err("metadata server unreachable", e))?;
        let response = check(response, "metadata token").await?;
        let token: MetadataToken = response
            .json()
            .await
            .map_err(|e| storage_err("unreadable metadata token", e))?;
        Ok(SecretString::from(token.access_token))
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| storage_err(&format!("invalid storage URL {}", self.base_url), e))?;
        url.path_segments_mut()
            .map_err(|()| Error::Storage(format!("invalid storage URL {}", self.base_url)))?
            .pop_if_empty()
            .extend(["storage", "v1", "b"])
            .extend(segments);
        Ok(url)
    }
}

impl GcsSession<'_> {
    async fn get(&self, url: Url, query: &[(&str, &str)], what: &str) -> Result<Response> {
        let response = self
            .store
            .client
            .get(url)
            .query(query)
            .bearer_auth(self.token.expose_secret())
            .send()
            .await
            .map_err(|e| storage_err(&format!("{what} failed"), e))?;
        check(response, what).await
    }
}

async fn check(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::Storage(format!(
        "{what} returned {}: {}",
        status.as_u16(),
        body.trim()
    )))
}

impl ContentStore for GcsSession<'_> {
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        let url = self.store.url(&[bucket, "o"])?;
        let mut keys = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![("prefix", prefix)];
            if let Some(token) = page_token.as_deref() {
                query.push(("pageToken", token));
            }
            let page: ObjectList = self
                .get(url.clone(), &query, &format!("listing gs://{bucket}/{prefix}"))
                .await?
                .json()
                .await
                .map_err(|e| storage_err("unreadable object listing", e))?;

            keys.extend(page.items.into_iter().map(|item| item.name));
            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }

        debug!(bucket = %bucket, prefix = %prefix, objects = keys.len(), "listed objects");
        Ok(keys)
    }

    async fn download(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let url = self.store.url(&[bucket, "o", key])?;
        let bytes = self
            .get(url, &[("alt", "media")], &format!("downloading gs://{bucket}/{key}"))
            .await?
            .bytes()
            .await
            .map_err(|e| storage_err("object download interrupted", e))?;
        Ok(bytes.to_vec())
    }
}

impl SecretStore for GcsStore {
    async fn fetch(&self, uri: &StorageUri) -> Result<SecretString> {
        match uri {
            StorageUri::Local(path) => LocalSecretStore::read(path),
            StorageUri::Gcs { bucket, prefix } => {
                let bytes = self.session().await?.download(bucket, prefix).await?;
                let text = String::from_utf8(bytes)
                    .map_err(|_| Error::Storage(format!("secret {uri} is not UTF-8")))?;
                if text.trim().is_empty() {
                    return Err(Error::Storage(format!("secret {uri} is empty")));
                }
                Ok(SecretString::from(text))
            }
        }
    }
}
