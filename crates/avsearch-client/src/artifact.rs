//! Artifact keys.
//!
//! An artifact is a user-submitted video file, identified by its storage key
//! (for example `video_in/1700000000000-meeting.mp4`). Keys are validated
//! before they are ever sent to the backend.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Maximum key length in bytes.
pub const MAX_KEY_LEN: usize = 1024;

/// Prefix under which uploaded videos are stored.
pub const UPLOAD_PREFIX: &str = "video_in";

/// File extensions recognised as videos.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "wmv"];

/// A validated storage key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ArtifactKey(String);

impl ArtifactKey {
    /// Validate and wrap a storage key.
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        let trimmed = key.trim();

        if trimmed.is_empty() {
            return Err(Error::validation("artifact key must not be empty"));
        }
        if trimmed.len() > MAX_KEY_LEN {
            return Err(Error::validation(format!(
                "artifact key is {} bytes, limit is {}",
                trimmed.len(),
                MAX_KEY_LEN
            )));
        }
        if trimmed.chars().any(char::is_control) {
            return Err(Error::validation(
                "artifact key must not contain control characters",
            ));
        }
        if trimmed.starts_with('/') {
            return Err(Error::validation("artifact key must be relative"));
        }
        if trimmed
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..")
        {
            return Err(Error::validation(format!(
                "artifact key has an invalid path segment: {}",
                trimmed
            )));
        }

        Ok(Self(trimmed.to_string()))
    }

    /// Build the key for a freshly uploaded file: `video_in/{millis}-{name}`.
    pub fn for_upload(file_name: &str, unix_millis: i64) -> Result<Self> {
        let name = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
        Self::new(format!("{}/{}-{}", UPLOAD_PREFIX, unix_millis, name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last path segment of the key.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Lower-cased extension of the file name, if any.
    pub fn extension(&self) -> Option<String> {
        let name = self.file_name();
        name.rsplit_once('.')
            .filter(|(stem, _)| !stem.is_empty())
            .map(|(_, ext)| ext.to_ascii_lowercase())
    }

    /// Whether the key names a video file.
    pub fn is_video(&self) -> bool {
        self.extension()
            .is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
    }

    /// The key percent-encoded as a single URL path segment.
    pub fn url_encoded(&self) -> String {
        urlencoding::encode(&self.0).into_owned()
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ArtifactKey {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl TryFrom<&str> for ArtifactKey {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl From<ArtifactKey> for String {
    fn from(key: ArtifactKey) -> Self {
        key.0
    }
}

impl AsRef<str> for ArtifactKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
