//! Object storage for uploaded videos.
//!
//! Everything is keyed under the configured per-user namespace. The HTTP
//! implementation talks to `{endpoint}/storage/{namespace}/...`.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::api::models::{DownloadUrlResponse, StorageListResponse};
use crate::api::{authorize, build_http_client, check_response};
use crate::session::SessionProvider;
use crate::{ArtifactKey, ClientConfig, Result};

/// Upload chunk size.
const UPLOAD_CHUNK_SIZE: usize = 256 * 1024;

/// Progress of an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadProgress {
    pub loaded: u64,
    pub total: u64,
}

impl UploadProgress {
    /// Whole percentage sent.
    pub fn percent(&self) -> u32 {
        if self.total == 0 {
            return 100;
        }
        ((self.loaded.min(self.total) as f64 / self.total as f64) * 100.0).round() as u32
    }
}

/// Called after each uploaded chunk.
pub type ProgressCallback = Arc<dyn Fn(UploadProgress) + Send + Sync>;

/// An object in storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    pub key: ArtifactKey,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Storage for uploaded artifacts.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List objects whose key starts with `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<StoredObject>>;

    /// Store `body` under `key`.
    async fn put(
        &self,
        key: &ArtifactKey,
        body: Bytes,
        content_type: &str,
        progress: Option<ProgressCallback>,
    ) -> Result<()>;

    /// A URL the object can be downloaded or played from.
    async fn download_url(&self, key: &ArtifactKey) -> Result<String>;
}

/// [`ObjectStore`] over the service's storage endpoints.
#[derive(Clone)]
pub struct HttpObjectStore {
    client: Client,
    config: ClientConfig,
    session: Arc<dyn SessionProvider>,
}

impl HttpObjectStore {
    pub fn new(config: ClientConfig, session: Arc<dyn SessionProvider>) -> Result<Self> {
        config.validate()?;
        let client = build_http_client(&config)?;
        Ok(Self {
            client,
            config,
            session,
        })
    }

    fn object_path(&self, key: &ArtifactKey) -> String {
        format!(
            "storage/{}/{}",
            self.config.artifact_namespace,
            key.url_encoded()
        )
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn list(&self, prefix: &str) -> Result<Vec<StoredObject>> {
        let mut url = self
            .config
            .url(&format!("storage/{}", self.config.artifact_namespace))?;
        if !prefix.is_empty() {
            url.query_pairs_mut().append_pair("prefix", prefix);
        }

        let request = authorize(self.client.get(url), self.session.as_ref()).await?;
        let response: StorageListResponse =
            check_response(request.send().await?).await?.json().await?;

        let objects = response
            .items
            .into_iter()
            .filter_map(|item| match ArtifactKey::new(item.key.as_str()) {
                Ok(key) => Some(StoredObject {
                    key,
                    size: item.size,
                    last_modified: item.last_modified,
                }),
                Err(e) => {
                    warn!("Skipping stored object {:?}: {}", item.key, e);
                    None
                }
            })
            .collect();
        Ok(objects)
    }

    async fn put(
        &self,
        key: &ArtifactKey,
        body: Bytes,
        content_type: &str,
        progress: Option<ProgressCallback>,
    ) -> Result<()> {
        let url = self.config.url(&self.object_path(key))?;
        let total = body.len() as u64;
        debug!(artifact = %key, total, "Uploading object");

        let mut loaded = 0u64;
        let chunks = stream::iter(chunked(body)).map(move |chunk| {
            loaded += chunk.len() as u64;
            if let Some(progress) = &progress {
                progress(UploadProgress { loaded, total });
            }
            Ok::<_, std::io::Error>(chunk)
        });

        let request = self
            .client
            .put(url)
            .header(CONTENT_TYPE, content_type)
            .body(reqwest::Body::wrap_stream(chunks));
        let request = authorize(request, self.session.as_ref()).await?;
        check_response(request.send().await?).await?;

        debug!(artifact = %key, "Upload finished");
        Ok(())
    }

    async fn download_url(&self, key: &ArtifactKey) -> Result<String> {
        let url = self.config.url(&format!("{}/url", self.object_path(key)))?;
        let request = authorize(self.client.get(url), self.session.as_ref()).await?;
        let response: DownloadUrlResponse =
            check_response(request.send().await?).await?.json().await?;
        Ok(response.url)
    }
}

fn chunked(body: Bytes) -> Vec<Bytes> {
    (0..body.len())
        .step_by(UPLOAD_CHUNK_SIZE)
        .map(|start| body.slice(start..(start + UPLOAD_CHUNK_SIZE).min(body.len())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_percent() {
        assert_eq!(UploadProgress { loaded: 0, total: 200 }.percent(), 0);
        assert_eq!(UploadProgress { loaded: 1, total: 200 }.percent(), 1);
        assert_eq!(UploadProgress { loaded: 133, total: 400 }.percent(), 33);
        assert_eq!(UploadProgress { loaded: 200, total: 200 }.percent(), 100);
        assert_eq!(UploadProgress { loaded: 0, total: 0 }.percent(), 100);
    }

    #[test]
    fn test_chunked() {
        let body = Bytes::from(vec![7u8; UPLOAD_CHUNK_SIZE * 2 + 10]);
        let chunks = chunked(body);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].len(), 10);
        assert!(chunked(Bytes::new()).is_empty());
    }
}
