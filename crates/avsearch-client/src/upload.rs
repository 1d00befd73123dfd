//! Uploading videos and submitting them for processing.

use bytes::Bytes;
use chrono::Utc;
use tracing::info;

use crate::api::{ApiClient, ProcessingTicket};
use crate::format::format_megabytes;
use crate::storage::{ObjectStore, ProgressCallback};
use crate::{ArtifactKey, Error, Result};

/// A file about to be uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadCandidate {
    pub file_name: String,
    pub content_type: String,
    pub size: u64,
}

impl UploadCandidate {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, size: u64) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            size,
        }
    }

    /// Guess the content type from the file extension.
    pub fn from_file_name(file_name: impl Into<String>, size: u64) -> Self {
        let file_name = file_name.into();
        let content_type = content_type_for(&file_name).to_string();
        Self::new(file_name, content_type, size)
    }

    /// Reject non-video content, empty files and files over `max_bytes`.
    pub fn validate(&self, max_bytes: u64) -> Result<()> {
        if self.file_name.trim().is_empty() {
            return Err(Error::validation("file name must not be empty"));
        }
        if !self.content_type.starts_with("video/") {
            return Err(Error::validation(format!(
                "please select a video file (got {})",
                self.content_type
            )));
        }
        if self.size == 0 {
            return Err(Error::validation("file is empty"));
        }
        if self.size > max_bytes {
            return Err(Error::validation(format!(
                "file size exceeds {} limit ({})",
                format_megabytes(max_bytes),
                format_megabytes(self.size)
            )));
        }
        Ok(())
    }

    /// Storage key for this file uploaded at `unix_millis`.
    pub fn key_at(&self, unix_millis: i64) -> Result<ArtifactKey> {
        ArtifactKey::for_upload(&self.file_name, unix_millis)
    }
}

/// Content type for a video file name, `application/octet-stream` when unknown.
pub fn content_type_for(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase());
    match ext.as_deref() {
        Some("mp4") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("avi") => "video/x-msvideo",
        Some("wmv") => "video/x-ms-wmv",
        Some("webm") => "video/webm",
        Some("mkv") => "video/x-matroska",
        _ => "application/octet-stream",
    }
}

/// Validate, store and submit a video. Nothing is sent if validation fails.
pub async fn upload_and_process(
    store: &dyn ObjectStore,
    api: &ApiClient,
    candidate: &UploadCandidate,
    body: Bytes,
    progress: Option<ProgressCallback>,
) -> Result<ProcessingTicket> {
    candidate.validate(api.config().max_upload_bytes)?;
    if body.len() as u64 != candidate.size {
        return Err(Error::validation(format!(
            "file size changed: expected {} bytes, read {}",
            candidate.size,
            body.len()
        )));
    }

    let key = candidate.key_at(Utc::now().timestamp_millis())?;
    store
        .put(&key, body, &candidate.content_type, progress)
        .await?;
    info!(artifact = %key, "Uploaded {}", candidate.file_name);

    api.start_processing(&key).await
}
